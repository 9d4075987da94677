//! Model evaluation for the falling ball.
//!
//! ```text
//! h(g, h0, t) = max(0, -g t² / 2 + h0)
//! ```
//!
//! The calibration code relies on two primitive operations:
//! - predict `h(t)` given θ (for residuals/plots)
//! - build a Jacobian row `∂h/∂θ` at a given time (for the least-squares steps)

use nalgebra::DMatrix;

use crate::domain::{Observation, Theta};

/// Predicted height at time `t`, clamped at ground level.
pub fn drop_height(theta: &Theta, t: f64) -> f64 {
    let h = free_fall(theta, t);
    if h > 0.0 { h } else { 0.0 }
}

/// Unclamped parabola `-g t² / 2 + h0`.
fn free_fall(theta: &Theta, t: f64) -> f64 {
    -0.5 * theta.g * t * t + theta.h0
}

/// Fill `out` with `(∂h/∂g, ∂h/∂h0)` at time `t`.
///
/// Once the ball has reached the ground the prediction no longer depends on θ,
/// so the row is zero.
pub fn fill_jacobian_row(theta: &Theta, t: f64, out: &mut [f64; 2]) {
    if free_fall(theta, t) > 0.0 {
        out[0] = -0.5 * t * t;
        out[1] = 1.0;
    } else {
        out[0] = 0.0;
        out[1] = 0.0;
    }
}

/// Predictions for every observation time.
pub fn predict_all(theta: &Theta, observations: &[Observation]) -> Vec<f64> {
    observations
        .iter()
        .map(|o| drop_height(theta, o.time))
        .collect()
}

/// `n × 2` Jacobian of the predictions with respect to `(g, h0)`.
pub fn jacobian(theta: &Theta, observations: &[Observation]) -> DMatrix<f64> {
    let mut j = DMatrix::<f64>::zeros(observations.len(), 2);
    let mut row = [0.0; 2];
    for (i, o) in observations.iter().enumerate() {
        fill_jacobian_row(theta, o.time, &mut row);
        j[(i, 0)] = row[0];
        j[(i, 1)] = row[1];
    }
    j
}

/// Time at which the ball reaches the ground, `sqrt(2 h0 / g)`.
pub fn impact_time(theta: &Theta) -> Option<f64> {
    if !(theta.is_finite() && theta.g > 0.0 && theta.h0 >= 0.0) {
        return None;
    }
    Some((2.0 * theta.h0 / theta.g).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_never_negative() {
        for &g in &[0.1, 1.0, 9.81, 25.0] {
            for &h0 in &[0.0, 1.0, 46.0, 500.0] {
                for i in 0..100 {
                    let t = i as f64 * 0.25;
                    let h = drop_height(&Theta::new(g, h0), t);
                    assert!(h >= 0.0, "g={g} h0={h0} t={t} gave {h}");
                }
            }
        }
    }

    #[test]
    fn height_at_release_is_h0() {
        for &h0 in &[0.0, 0.5, 46.0, 1234.5] {
            assert_eq!(drop_height(&Theta::new(9.8, h0), 0.0), h0);
        }
    }

    #[test]
    fn height_near_impact() {
        let h = drop_height(&Theta::new(9.8, 46.0), 3.06);
        assert!((h - 0.118_36).abs() < 1e-6, "got {h}");
        assert_eq!(drop_height(&Theta::new(9.8, 46.0), 3.07), 0.0);
    }

    #[test]
    fn jacobian_zero_after_impact() {
        let theta = Theta::new(9.8, 46.0);
        let mut row = [1.0; 2];
        fill_jacobian_row(&theta, 1.0, &mut row);
        assert_eq!(row, [-0.5, 1.0]);
        fill_jacobian_row(&theta, 4.0, &mut row);
        assert_eq!(row, [0.0, 0.0]);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let theta = Theta::new(9.5, 40.0);
        let obs: Vec<Observation> = (0..10)
            .map(|i| Observation { index: i, time: i as f64 * 0.2, height: 0.0 })
            .collect();
        let j = jacobian(&theta, &obs);
        let eps = 1e-6;
        for (i, o) in obs.iter().enumerate() {
            let dg = (drop_height(&Theta::new(theta.g + eps, theta.h0), o.time)
                - drop_height(&Theta::new(theta.g - eps, theta.h0), o.time))
                / (2.0 * eps);
            let dh = (drop_height(&Theta::new(theta.g, theta.h0 + eps), o.time)
                - drop_height(&Theta::new(theta.g, theta.h0 - eps), o.time))
                / (2.0 * eps);
            assert!((j[(i, 0)] - dg).abs() < 1e-6);
            assert!((j[(i, 1)] - dh).abs() < 1e-6);
        }
    }

    #[test]
    fn impact_time_basic() {
        let t = impact_time(&Theta::new(9.8, 46.0)).unwrap();
        assert!((t - (2.0_f64 * 46.0 / 9.8).sqrt()).abs() < 1e-12);
        assert!(impact_time(&Theta::new(0.0, 46.0)).is_none());
    }
}
