//! Calibration of θ = (g, h0) against observations.
//!
//! Responsibilities:
//!
//! - validate the configuration and the data
//! - dispatch to one of the four methods
//! - optionally replace the NLLS covariance by a bootstrap estimate

pub mod bootstrap;
pub mod gaussian;
pub mod least_squares;
pub mod posterior;
pub mod solver;

pub use bootstrap::*;
pub use gaussian::*;
pub use least_squares::*;
pub use posterior::*;
pub use solver::*;

use crate::domain::{CalibrationConfig, CalibrationMethod, CalibrationResult, Observation, ParameterDistribution};
use crate::error::AppError;
use crate::math::covariance_from_sigmas;

/// Fewest observations that leave a residual degree of freedom.
pub const MIN_OBSERVATIONS: usize = 3;

/// Calibrate with the method selected in `config`.
pub fn calibrate(observations: &[Observation], config: &CalibrationConfig) -> Result<CalibrationResult, AppError> {
    calibrate_with(observations, config, config.method)
}

/// Calibrate with an explicit method (the rest of `config` still applies).
pub fn calibrate_with(
    observations: &[Observation],
    config: &CalibrationConfig,
    method: CalibrationMethod,
) -> Result<CalibrationResult, AppError> {
    validate(observations, config)?;
    let opts = solver_options(config);

    tracing::info!(
        method = method.display_name(),
        n = observations.len(),
        g = config.initial.g,
        h0 = config.initial.h0,
        "calibrating"
    );

    let mut result = match method {
        CalibrationMethod::NonLinearLeastSquares => non_linear_least_squares(observations, config.initial, &opts)?,
        CalibrationMethod::LinearLeastSquares => linear_least_squares(observations, config.initial)?,
        CalibrationMethod::GaussianLinear => gaussian_linear(observations, &prior_from_config(config), config.obs_sigma)?,
        CalibrationMethod::GaussianNonLinear => {
            gaussian_non_linear(observations, &prior_from_config(config), config.obs_sigma, &opts)?
        }
    };

    if method == CalibrationMethod::NonLinearLeastSquares && config.bootstrap > 0 {
        let (covariance, summary) =
            bootstrap_covariance(observations, result.map, config.bootstrap, config.seed, &opts)?;
        result.posterior = ParameterDistribution::new(result.map, covariance);
        result.bootstrap = Some(summary);
    }

    if !result.map.is_finite() {
        return Err(AppError::numeric("Calibration produced non-finite parameters."));
    }

    tracing::info!(
        method = method.display_name(),
        g = result.map.g,
        h0 = result.map.h0,
        sse = result.quality.sse,
        iterations = result.iterations,
        converged = result.converged,
        "calibration finished"
    );

    Ok(result)
}

/// Outcome of one method in [`calibrate_all`].
pub type MethodOutcome = (CalibrationMethod, Result<CalibrationResult, AppError>);

/// Run every method on the same data.
///
/// A failing method does not stop the others; each outcome is reported in
/// [`CalibrationMethod::ALL`] order.
pub fn calibrate_all(observations: &[Observation], config: &CalibrationConfig) -> Vec<MethodOutcome> {
    CalibrationMethod::ALL
        .iter()
        .map(|&m| (m, calibrate_with(observations, config, m)))
        .collect()
}

/// Gaussian prior `N(initial, B)` from the configured sds and correlation.
pub fn prior_from_config(config: &CalibrationConfig) -> ParameterDistribution {
    ParameterDistribution::new(
        config.initial,
        covariance_from_sigmas(config.prior_sigma.g, config.prior_sigma.h0, config.prior_correlation),
    )
}

pub fn solver_options(config: &CalibrationConfig) -> SolverOptions {
    SolverOptions {
        max_iter: config.max_iter,
        tolerance: config.tolerance,
        multistart: config.multistart,
    }
}

/// Reject configurations and datasets no method can work with.
pub fn validate(observations: &[Observation], config: &CalibrationConfig) -> Result<(), AppError> {
    if observations.len() < MIN_OBSERVATIONS {
        return Err(AppError::data(format!(
            "Need at least {MIN_OBSERVATIONS} observations to calibrate g and h0 (got {}).",
            observations.len()
        )));
    }
    if !config.initial.is_finite() {
        return Err(AppError::input("Initial guess must be finite."));
    }
    if !(config.obs_sigma.is_finite() && config.obs_sigma > 0.0) {
        return Err(AppError::input("Observation error sigma must be > 0."));
    }
    if !(config.prior_sigma.is_finite() && config.prior_sigma.g > 0.0 && config.prior_sigma.h0 > 0.0) {
        return Err(AppError::input("Prior standard deviations must be > 0."));
    }
    if !(config.prior_correlation > -1.0 && config.prior_correlation < 1.0) {
        return Err(AppError::input("Prior correlation must lie strictly between -1 and 1."));
    }
    if !(config.level > 0.0 && config.level < 1.0) {
        return Err(AppError::input("Interval level must lie strictly between 0 and 1."));
    }
    if config.max_iter == 0 {
        return Err(AppError::input("max-iter must be > 0."));
    }
    if !(config.tolerance.is_finite() && config.tolerance > 0.0) {
        return Err(AppError::input("Tolerance must be > 0."));
    }
    if config.bootstrap == 1 {
        return Err(AppError::input("Bootstrap needs at least 2 replicates (or 0 to disable)."));
    }
    Ok(())
}
