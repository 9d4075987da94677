//! Least-squares calibration (no prior).
//!
//! - non-linear: Levenberg–Marquardt on `Σ (y_i − h(θ, t_i))²`
//! - linear: a single least-squares step on the model linearized at the
//!   initial guess
//!
//! Both report a Gaussian posterior from the linearization at the estimate:
//! `σ̂² (JᵀJ)⁻¹` with `σ̂² = SSE / (n − 2)`.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::calib::solver::{ResidualSystem, SolverOptions, minimize_multistart};
use crate::domain::{
    CalibrationMethod, CalibrationResult, FitQuality, Observation, PARAM_COUNT, ParameterDistribution, Theta,
};
use crate::error::AppError;
use crate::math::{gram, inverse_spd, solve_least_squares};
use crate::models::{jacobian, predict_all};

/// Raw misfit `y − h(θ, t)`.
pub struct DataMisfit<'a> {
    observations: &'a [Observation],
}

impl<'a> DataMisfit<'a> {
    pub fn new(observations: &'a [Observation]) -> Self {
        Self { observations }
    }
}

impl ResidualSystem for DataMisfit<'_> {
    fn residuals(&self, theta: &Theta) -> DVector<f64> {
        misfit(self.observations, theta)
    }

    fn jacobian(&self, theta: &Theta) -> DMatrix<f64> {
        jacobian(theta, self.observations)
    }
}

/// Non-linear least squares from `initial`.
pub fn non_linear_least_squares(
    observations: &[Observation],
    initial: Theta,
    opts: &SolverOptions,
) -> Result<CalibrationResult, AppError> {
    let system = DataMisfit::new(observations);
    let outcome = minimize_multistart(&system, initial, opts)?;

    let quality = fit_quality(observations, &outcome.theta);
    let covariance = linearized_covariance(observations, &outcome.theta, quality.sigma_hat)?;

    Ok(CalibrationResult {
        method: CalibrationMethod::NonLinearLeastSquares,
        initial,
        map: outcome.theta,
        posterior: ParameterDistribution::new(outcome.theta, covariance),
        prior: None,
        quality,
        iterations: outcome.iterations,
        converged: outcome.converged,
        bootstrap: None,
    })
}

/// Linear least squares around `initial`.
pub fn linear_least_squares(observations: &[Observation], initial: Theta) -> Result<CalibrationResult, AppError> {
    let j = jacobian(&initial, observations);
    let r = misfit(observations, &initial);

    let delta = solve_least_squares(&j, &r)
        .ok_or_else(|| AppError::numeric("Linearized least-squares system could not be solved."))?;
    let map = Theta::from_vector(&(initial.to_vector() + Vector2::new(delta[0], delta[1])));

    // The spread of the linearized model's residuals drives the covariance.
    let linear_residuals = &r - &j * &delta;
    let dof = observations.len().saturating_sub(PARAM_COUNT) as f64;
    let sigma2 = linear_residuals.norm_squared() / dof;
    let covariance = covariance_from_jacobian(&j, sigma2)?;

    Ok(CalibrationResult {
        method: CalibrationMethod::LinearLeastSquares,
        initial,
        map,
        posterior: ParameterDistribution::new(map, covariance),
        prior: None,
        quality: fit_quality(observations, &map),
        iterations: 1,
        converged: true,
        bootstrap: None,
    })
}

/// `y − h(θ, t)` for every observation.
pub fn misfit(observations: &[Observation], theta: &Theta) -> DVector<f64> {
    let predicted = predict_all(theta, observations);
    DVector::from_iterator(
        observations.len(),
        observations.iter().zip(predicted).map(|(o, h)| o.height - h),
    )
}

/// SSE/RMSE/σ̂ of the actual (clamped) model at `theta`.
pub fn fit_quality(observations: &[Observation], theta: &Theta) -> FitQuality {
    let n = observations.len();
    let sse = misfit(observations, theta).norm_squared();
    let rmse = if n > 0 { (sse / n as f64).sqrt() } else { f64::NAN };
    let sigma_hat = if n > PARAM_COUNT {
        (sse / (n - PARAM_COUNT) as f64).sqrt()
    } else {
        f64::NAN
    };
    FitQuality {
        sse,
        rmse,
        sigma_hat,
        n,
    }
}

/// `σ̂² (JᵀJ)⁻¹` with the Jacobian evaluated at `theta`.
pub fn linearized_covariance(
    observations: &[Observation],
    theta: &Theta,
    sigma_hat: f64,
) -> Result<Matrix2<f64>, AppError> {
    covariance_from_jacobian(&jacobian(theta, observations), sigma_hat * sigma_hat)
}

fn covariance_from_jacobian(j: &DMatrix<f64>, sigma2: f64) -> Result<Matrix2<f64>, AppError> {
    if !sigma2.is_finite() {
        return Err(AppError::numeric("Non-finite residual variance."));
    }
    let inv = inverse_spd(&gram(j)).ok_or_else(|| {
        AppError::numeric(
            "Normal matrix is singular: g and h0 are not identifiable from these observations \
             (need at least two distinct times before ground impact).",
        )
    })?;
    Ok(inv * sigma2)
}
