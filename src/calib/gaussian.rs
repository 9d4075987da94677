//! Bayesian calibration with a Gaussian prior and Gaussian observation error.
//!
//! Notation: prior `θ ~ N(θ_b, B)`, observation error `N(0, σ² I)`.
//!
//! - linear: linearize the model at `θ_b` (Jacobian `J`), then
//!   `A = (JᵀJ/σ² + B⁻¹)⁻¹` and `θ_MAP = θ_b + A Jᵀ (y − h(θ_b)) / σ²`.
//!   We obtain `θ_MAP` by solving the equivalent whitened, prior-augmented
//!   least-squares system rather than forming `A` explicitly.
//! - non-linear: minimize `‖y − h(θ)‖²/σ² + (θ − θ_b)ᵀ B⁻¹ (θ − θ_b)` with the
//!   Levenberg–Marquardt solver, then linearize at the MAP for the posterior.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::calib::least_squares::{fit_quality, misfit};
use crate::calib::solver::{ResidualSystem, SolverOptions, minimize_multistart};
use crate::domain::{CalibrationMethod, CalibrationResult, Observation, ParameterDistribution, Theta};
use crate::error::AppError;
use crate::math::{gram, inverse_spd, solve_least_squares, stack_rows, to_dynamic, whitening_factor};
use crate::models::jacobian;

/// Prior-penalized, noise-whitened misfit.
///
/// Residuals are `[(y − h(θ)) / σ ; W (θ_b − θ)]` with `WᵀW = B⁻¹`.
pub struct PenalizedMisfit<'a> {
    observations: &'a [Observation],
    obs_sigma: f64,
    prior_mean: Vector2<f64>,
    whitening: Matrix2<f64>,
}

impl<'a> PenalizedMisfit<'a> {
    pub fn new(
        observations: &'a [Observation],
        prior: &ParameterDistribution,
        obs_sigma: f64,
    ) -> Result<Self, AppError> {
        Ok(Self {
            observations,
            obs_sigma,
            prior_mean: prior.mean.to_vector(),
            whitening: prior_whitening(prior)?,
        })
    }
}

impl ResidualSystem for PenalizedMisfit<'_> {
    fn residuals(&self, theta: &Theta) -> DVector<f64> {
        let data = misfit(self.observations, theta) / self.obs_sigma;
        let prior = self.whitening * (self.prior_mean - theta.to_vector());

        let n = data.len();
        let mut r = DVector::<f64>::zeros(n + 2);
        r.rows_mut(0, n).copy_from(&data);
        r[n] = prior[0];
        r[n + 1] = prior[1];
        r
    }

    fn jacobian(&self, theta: &Theta) -> DMatrix<f64> {
        let j = jacobian(theta, self.observations) / self.obs_sigma;
        let (a, _) = stack_rows(
            &j,
            &DVector::zeros(j.nrows()),
            &to_dynamic(&self.whitening),
            &DVector::zeros(2),
        );
        a
    }
}

/// Closed-form Gaussian update of the model linearized at the prior mean.
pub fn gaussian_linear(
    observations: &[Observation],
    prior: &ParameterDistribution,
    obs_sigma: f64,
) -> Result<CalibrationResult, AppError> {
    let theta_b = prior.mean;
    let j = jacobian(&theta_b, observations);
    let r = misfit(observations, &theta_b);
    let w = prior_whitening(prior)?;

    let (a, b) = stack_rows(
        &(&j / obs_sigma),
        &(&r / obs_sigma),
        &to_dynamic(&w),
        &DVector::zeros(2),
    );
    let delta = solve_least_squares(&a, &b)
        .ok_or_else(|| AppError::numeric("Gaussian linear update could not be solved."))?;
    let map = Theta::from_vector(&(theta_b.to_vector() + Vector2::new(delta[0], delta[1])));

    let covariance = posterior_covariance(&j, prior, obs_sigma)?;

    Ok(CalibrationResult {
        method: CalibrationMethod::GaussianLinear,
        initial: theta_b,
        map,
        posterior: ParameterDistribution::new(map, covariance),
        prior: Some(*prior),
        quality: fit_quality(observations, &map),
        iterations: 1,
        converged: true,
        bootstrap: None,
    })
}

/// MAP of the non-linear model under the Gaussian prior.
pub fn gaussian_non_linear(
    observations: &[Observation],
    prior: &ParameterDistribution,
    obs_sigma: f64,
    opts: &SolverOptions,
) -> Result<CalibrationResult, AppError> {
    let system = PenalizedMisfit::new(observations, prior, obs_sigma)?;
    let outcome = minimize_multistart(&system, prior.mean, opts)?;
    let map = outcome.theta;

    let covariance = posterior_covariance(&jacobian(&map, observations), prior, obs_sigma)?;

    Ok(CalibrationResult {
        method: CalibrationMethod::GaussianNonLinear,
        initial: prior.mean,
        map,
        posterior: ParameterDistribution::new(map, covariance),
        prior: Some(*prior),
        quality: fit_quality(observations, &map),
        iterations: outcome.iterations,
        converged: outcome.converged,
        bootstrap: None,
    })
}

/// `(JᵀJ/σ² + B⁻¹)⁻¹`.
fn posterior_covariance(
    j: &DMatrix<f64>,
    prior: &ParameterDistribution,
    obs_sigma: f64,
) -> Result<Matrix2<f64>, AppError> {
    let prior_precision = inverse_spd(&prior.covariance_matrix())
        .ok_or_else(|| AppError::input("Prior covariance must be positive definite."))?;
    let precision = gram(j) / (obs_sigma * obs_sigma) + prior_precision;
    inverse_spd(&precision).ok_or_else(|| AppError::numeric("Posterior precision matrix is singular."))
}

fn prior_whitening(prior: &ParameterDistribution) -> Result<Matrix2<f64>, AppError> {
    whitening_factor(&prior.covariance_matrix())
        .ok_or_else(|| AppError::input("Prior covariance must be positive definite."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calib::least_squares::linear_least_squares;
    use crate::math::covariance_from_sigmas;
    use crate::models::drop_height;

    fn noisy(theta: Theta, n: usize, dt: f64) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                let t = i as f64 * dt;
                let h = drop_height(&theta, t);
                let noise = if i % 3 == 0 { 0.2 } else if i % 3 == 1 { -0.15 } else { -0.05 };
                Observation { index: i, time: t, height: (h + noise).max(0.0) }
            })
            .collect()
    }

    fn prior(mean: Theta, sg: f64, sh: f64) -> ParameterDistribution {
        ParameterDistribution::new(mean, covariance_from_sigmas(sg, sh, 0.0))
    }

    #[test]
    fn flat_prior_matches_linear_least_squares() {
        let obs = noisy(Theta::new(9.81, 45.0), 25, 0.1);
        let start = Theta::new(9.5, 44.0);
        let bayes = gaussian_linear(&obs, &prior(start, 1e4, 1e4), 0.2).unwrap();
        let lls = linear_least_squares(&obs, start).unwrap();
        assert!((bayes.map.g - lls.map.g).abs() < 1e-4);
        assert!((bayes.map.h0 - lls.map.h0).abs() < 1e-4);
    }

    #[test]
    fn tight_prior_returns_prior_mean() {
        let obs = noisy(Theta::new(9.81, 45.0), 25, 0.1);
        let mean = Theta::new(9.0, 48.0);
        let out = gaussian_linear(&obs, &prior(mean, 1e-6, 1e-6), 0.5).unwrap();
        assert!((out.map.g - mean.g).abs() < 1e-6);
        assert!((out.map.h0 - mean.h0).abs() < 1e-6);
    }

    #[test]
    fn posterior_is_narrower_than_prior() {
        let obs = noisy(Theta::new(9.81, 45.0), 25, 0.1);
        let p = prior(Theta::new(9.8, 46.0), 1.0, 5.0);
        for out in [
            gaussian_linear(&obs, &p, 0.5).unwrap(),
            gaussian_non_linear(&obs, &p, 0.5, &SolverOptions::default()).unwrap(),
        ] {
            let post = out.posterior.covariance_matrix();
            let pri = p.covariance_matrix();
            assert!(post[(0, 0)] < pri[(0, 0)]);
            assert!(post[(1, 1)] < pri[(1, 1)]);
            assert!(out.prior.is_some());
        }
    }

    #[test]
    fn non_linear_agrees_with_linear_when_model_is_linear() {
        // No clamped points: the model is linear in θ, so both MAPs coincide.
        let obs = noisy(Theta::new(9.81, 45.0), 20, 0.1);
        let p = prior(Theta::new(9.8, 46.0), 1.0, 5.0);
        let lin = gaussian_linear(&obs, &p, 0.5).unwrap();
        let nonlin = gaussian_non_linear(&obs, &p, 0.5, &SolverOptions::default()).unwrap();
        assert!((lin.map.g - nonlin.map.g).abs() < 1e-6);
        assert!((lin.map.h0 - nonlin.map.h0).abs() < 1e-6);
    }

    #[test]
    fn rejects_degenerate_prior() {
        let obs = noisy(Theta::new(9.81, 45.0), 10, 0.1);
        let bad = prior(Theta::new(9.8, 46.0), 0.0, 5.0);
        assert_eq!(gaussian_linear(&obs, &bad, 0.5).unwrap_err().exit_code(), 2);
    }
}
