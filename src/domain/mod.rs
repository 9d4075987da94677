//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - observations and the parameter vector (`Observation`, `Theta`, `Param`)
//! - calibration configuration (`CalibrationConfig`, `CalibrationMethod`)
//! - calibration outputs (`CalibrationResult`, `ParameterDistribution`, etc.)

pub mod types;

pub use types::*;
