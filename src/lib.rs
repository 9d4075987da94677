//! `balldrop-calib` library crate.
//!
//! Calibrates the falling-ball model `h(t) = max(0, h0 − g·t²/2)` against
//! observed heights. The binary (`balldrop`) is a thin wrapper around this
//! library so that:
//!
//! - core logic is testable without spawning processes
//! - the CLI and the TUI share one calibration pipeline

pub mod app;
pub mod calib;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod tui;
