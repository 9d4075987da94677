//! Statistics of the bivariate normal over θ.

use nalgebra::Vector2;
use rayon::prelude::*;

use crate::domain::{ConfidenceInterval, Param, ParameterDistribution, Theta};
use crate::math::{chi2_2dof_quantile, gaussian_pdf, inverse_spd, two_sided_z};

/// Joint density sampled on a regular grid.
///
/// `density[row][col]` is evaluated at `(g_values[col], h0_values[row])`.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub g_values: Vec<f64>,
    pub h0_values: Vec<f64>,
    pub density: Vec<Vec<f64>>,
}

impl DensityGrid {
    pub fn max_density(&self) -> f64 {
        self.density
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }
}

impl ParameterDistribution {
    pub fn variance(&self, param: Param) -> f64 {
        let i = param.index();
        self.covariance[i][i]
    }

    pub fn std_dev(&self, param: Param) -> f64 {
        self.variance(param).max(0.0).sqrt()
    }

    /// Correlation between `g` and `h0` (0 when either variance vanishes).
    pub fn correlation(&self) -> f64 {
        let denom = self.std_dev(Param::G) * self.std_dev(Param::H0);
        if denom > 0.0 {
            (self.covariance[0][1] / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn marginal_pdf(&self, param: Param, x: f64) -> f64 {
        gaussian_pdf(x, self.mean.get(param), self.std_dev(param))
    }

    /// Squared Mahalanobis distance of `theta` from the mean.
    ///
    /// `None` for a degenerate covariance.
    pub fn mahalanobis_sq(&self, theta: &Theta) -> Option<f64> {
        let precision = inverse_spd(&self.covariance_matrix())?;
        let d: Vector2<f64> = theta.to_vector() - self.mean.to_vector();
        Some((d.transpose() * precision * d)[(0, 0)])
    }

    /// Joint density at `theta` (0 for a degenerate covariance).
    pub fn joint_pdf(&self, theta: &Theta) -> f64 {
        let det = self.covariance_matrix().determinant();
        match self.mahalanobis_sq(theta) {
            Some(m2) if det > 0.0 => (-0.5 * m2).exp() / (2.0 * std::f64::consts::PI * det.sqrt()),
            _ => 0.0,
        }
    }

    /// Bilateral interval `mean ± z·sd` with `P(lower ≤ X ≤ upper) = level`.
    pub fn marginal_interval(&self, param: Param, level: f64) -> ConfidenceInterval {
        let estimate = self.mean.get(param);
        let half = two_sided_z(level) * self.std_dev(param);
        ConfidenceInterval {
            param,
            level,
            estimate,
            lower: estimate - half,
            upper: estimate + half,
        }
    }

    pub fn intervals(&self, level: f64) -> Vec<ConfidenceInterval> {
        Param::ALL
            .iter()
            .map(|&p| self.marginal_interval(p, level))
            .collect()
    }

    /// Whether `theta` lies inside the joint `level` ellipse.
    pub fn joint_region_contains(&self, theta: &Theta, level: f64) -> bool {
        self.mahalanobis_sq(theta)
            .is_some_and(|m2| m2 <= chi2_2dof_quantile(level))
    }

    /// Joint density on a `steps × steps` grid spanning `mean ± n_sigma·sd`.
    pub fn density_grid(&self, steps: usize, n_sigma: f64) -> DensityGrid {
        let g_values = axis(self.mean.g, self.std_dev(Param::G), steps, n_sigma);
        let h0_values = axis(self.mean.h0, self.std_dev(Param::H0), steps, n_sigma);

        let density = h0_values
            .par_iter()
            .map(|&h0| {
                g_values
                    .iter()
                    .map(|&g| self.joint_pdf(&Theta::new(g, h0)))
                    .collect()
            })
            .collect();

        DensityGrid {
            g_values,
            h0_values,
            density,
        }
    }
}

/// Evenly spaced values over `center ± n_sigma·sd`.
///
/// A zero spread still yields a usable axis around `center`.
pub fn axis(center: f64, sd: f64, steps: usize, n_sigma: f64) -> Vec<f64> {
    let steps = steps.max(2);
    let half = if sd > 0.0 {
        n_sigma * sd
    } else {
        (center.abs() * 1e-3).max(1e-6)
    };
    let lo = center - half;
    let step = 2.0 * half / (steps - 1) as f64;
    (0..steps).map(|i| lo + i as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::covariance_from_sigmas;

    fn dist() -> ParameterDistribution {
        ParameterDistribution::new(Theta::new(9.8, 46.0), covariance_from_sigmas(0.2, 1.5, -0.6))
    }

    #[test]
    fn interval_brackets_mean() {
        let d = dist();
        for level in [0.5, 0.9, 0.95, 0.99] {
            for ci in d.intervals(level) {
                assert!(ci.lower <= ci.estimate && ci.estimate <= ci.upper);
                assert!(ci.contains(d.mean.get(ci.param)));
            }
        }
        let g95 = d.marginal_interval(Param::G, 0.95);
        assert!((g95.width() - 2.0 * 1.959_964 * 0.2).abs() < 1e-4);
    }

    #[test]
    fn wider_level_gives_wider_interval() {
        let d = dist();
        let narrow = d.marginal_interval(Param::H0, 0.68);
        let wide = d.marginal_interval(Param::H0, 0.99);
        assert!(wide.width() > narrow.width());
    }

    #[test]
    fn correlation_and_sd() {
        let d = dist();
        assert!((d.std_dev(Param::G) - 0.2).abs() < 1e-12);
        assert!((d.std_dev(Param::H0) - 1.5).abs() < 1e-12);
        assert!((d.correlation() + 0.6).abs() < 1e-12);
    }

    #[test]
    fn joint_region_and_mahalanobis() {
        let d = dist();
        assert_eq!(d.mahalanobis_sq(&d.mean), Some(0.0));
        assert!(d.joint_region_contains(&d.mean, 0.95));
        assert!(!d.joint_region_contains(&Theta::new(11.0, 46.0), 0.95));
    }

    #[test]
    fn joint_pdf_peaks_at_mean() {
        let d = dist();
        let peak = d.joint_pdf(&d.mean);
        assert!(peak > d.joint_pdf(&Theta::new(9.9, 46.0)));
        let grid = d.density_grid(21, 3.0);
        assert_eq!(grid.g_values.len(), 21);
        assert_eq!(grid.density.len(), 21);
        assert!((grid.max_density() - peak).abs() < 1e-12);
    }

    #[test]
    fn marginal_pdf_integrates_to_one() {
        let d = dist();
        let xs = axis(d.mean.g, d.std_dev(Param::G), 2001, 8.0);
        let dx = xs[1] - xs[0];
        let total: f64 = xs.iter().map(|&x| d.marginal_pdf(Param::G, x) * dx).sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn degenerate_covariance_has_no_density() {
        let d = ParameterDistribution::new(Theta::new(9.8, 46.0), nalgebra::Matrix2::zeros());
        assert_eq!(d.joint_pdf(&d.mean), 0.0);
        let ci = d.marginal_interval(Param::G, 0.95);
        assert_eq!(ci.lower, ci.upper);
    }
}
