//! Terminal plots.
//!
//! - model curves vs observations, model families, saved calibrations (`ascii`)
//! - residual and posterior diagnostics (`diagnostics`)

pub mod ascii;
pub mod diagnostics;

pub use ascii::*;
pub use diagnostics::*;
