//! Falling-ball forward model.
//!
//! The model is implemented as small, pure functions so that calibration code can
//! stay generic over how residuals are assembled.

pub mod model;

pub use model::*;
