//! Reporting utilities: residuals, residual statistics and rankings.
//!
//! Formatting of terminal output lives in `format`.

pub mod format;

pub use format::*;

use crate::domain::{Observation, ObservationResidual, Theta};
use crate::error::AppError;
use crate::models::drop_height;

/// Observations furthest from the calibrated curve (top-N each side).
#[derive(Debug, Clone)]
pub struct Rankings {
    /// Largest positive residuals (measured above the curve).
    pub above: Vec<ObservationResidual>,
    /// Largest negative residuals (measured below the curve).
    pub below: Vec<ObservationResidual>,
}

/// Summary statistics of a residual vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation (divisor `n - 1`).
    pub std: f64,
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
}

/// Compute fitted values and residuals for each observation.
pub fn compute_residuals(observations: &[Observation], theta: &Theta) -> Result<Vec<ObservationResidual>, AppError> {
    let mut out = Vec::with_capacity(observations.len());
    for o in observations {
        let h_fit = drop_height(theta, o.time);
        if !h_fit.is_finite() {
            return Err(AppError::numeric("Non-finite model prediction during residual computation."));
        }
        out.push(ObservationResidual {
            observation: *o,
            h_fit,
            residual: o.height - h_fit,
        });
    }
    Ok(out)
}

/// Statistics of the residuals; `None` when there are none.
pub fn residual_stats(residuals: &[ObservationResidual]) -> Option<ResidualStats> {
    if residuals.is_empty() {
        return None;
    }
    let n = residuals.len();
    let nf = n as f64;
    let mean = residuals.iter().map(|r| r.residual).sum::<f64>() / nf;
    let ss = residuals.iter().map(|r| (r.residual - mean).powi(2)).sum::<f64>();
    let std = if n > 1 { (ss / (nf - 1.0)).sqrt() } else { 0.0 };
    let rmse = (residuals.iter().map(|r| r.residual * r.residual).sum::<f64>() / nf).sqrt();
    let min = residuals.iter().map(|r| r.residual).fold(f64::INFINITY, f64::min);
    let max = residuals.iter().map(|r| r.residual).fold(f64::NEG_INFINITY, f64::max);

    Some(ResidualStats {
        n,
        mean,
        std,
        rmse,
        min,
        max,
    })
}

/// Rank the top observations above and below the curve.
///
/// Only strictly positive (negative) residuals qualify for `above` (`below`).
pub fn rank_largest_residuals(residuals: &[ObservationResidual], top_n: usize) -> Rankings {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.residual.total_cmp(&a.residual));

    let above = sorted
        .iter()
        .filter(|r| r.residual > 0.0)
        .take(top_n)
        .copied()
        .collect();
    let below = sorted
        .iter()
        .rev()
        .filter(|r| r.residual < 0.0)
        .take(top_n)
        .copied()
        .collect();

    Rankings { above, below }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(index: usize, time: f64, height: f64) -> Observation {
        Observation { index, time, height }
    }

    #[test]
    fn compute_residuals_basic() {
        let theta = Theta::new(10.0, 20.0);
        let residuals = compute_residuals(&[obs(0, 0.0, 20.5), obs(1, 1.0, 14.0), obs(2, 3.0, 0.2)], &theta).unwrap();
        assert_eq!(residuals.len(), 3);
        assert!((residuals[0].residual - 0.5).abs() < 1e-12);
        assert!((residuals[1].h_fit - 15.0).abs() < 1e-12);
        assert!((residuals[1].residual + 1.0).abs() < 1e-12);
        // Past impact the prediction is the ground.
        assert_eq!(residuals[2].h_fit, 0.0);
    }

    #[test]
    fn non_finite_prediction_is_an_error() {
        let err = compute_residuals(&[obs(0, 1.0, 1.0)], &Theta::new(f64::NAN, 1.0));
        // NaN compares false against 0, so the clamp yields 0 and stays finite.
        assert!(err.is_ok());
        let err = compute_residuals(&[obs(0, 0.0, 1.0)], &Theta::new(0.0, f64::INFINITY)).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn stats_of_known_residuals() {
        let residuals = compute_residuals(
            &[obs(0, 0.0, 11.0), obs(1, 0.0, 9.0), obs(2, 0.0, 13.0)],
            &Theta::new(9.8, 10.0),
        )
        .unwrap();
        let s = residual_stats(&residuals).unwrap();
        assert_eq!(s.n, 3);
        assert!((s.mean - 1.0).abs() < 1e-12);
        assert!((s.std - 2.0).abs() < 1e-12);
        assert!((s.rmse - (11.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(s.min, -1.0);
        assert_eq!(s.max, 3.0);
        assert!(residual_stats(&[]).is_none());
    }

    #[test]
    fn rank_largest_residuals_basic() {
        let residuals = compute_residuals(
            &[obs(0, 0.0, 10.0), obs(1, 0.0, 15.0), obs(2, 0.0, 5.0), obs(3, 0.0, 12.0)],
            &Theta::new(9.8, 10.0),
        )
        .unwrap();
        let rankings = rank_largest_residuals(&residuals, 1);
        assert_eq!(rankings.above.len(), 1);
        assert_eq!(rankings.above[0].observation.index, 1);
        assert_eq!(rankings.below.len(), 1);
        assert_eq!(rankings.below[0].observation.index, 2);

        let all = rank_largest_residuals(&residuals, 10);
        assert_eq!(all.above.len(), 2);
        assert_eq!(all.below.len(), 1);
    }
}
