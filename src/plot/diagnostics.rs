//! Residual and posterior diagnostics rendered on the ASCII canvas.

use crate::calib::{DensityGrid, axis};
use crate::domain::{ObservationResidual, Param, ParameterDistribution};
use crate::math::normal_quantile;
use crate::plot::ascii::{AsciiCanvas, data_range, pad_range};

/// Density shades from empty to peak.
const SHADES: [char; 10] = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Observed heights against predictions, with the `y = x` diagonal.
pub fn render_observed_vs_predicted(residuals: &[ObservationResidual], width: usize, height: usize) -> String {
    let values = residuals
        .iter()
        .flat_map(|r| [r.h_fit, r.observation.height]);
    let (lo, hi) = data_range(values).unwrap_or((0.0, 1.0));
    let (lo, hi) = pad_range(lo, hi, 0.05);

    let mut canvas = AsciiCanvas::new(width, height, (lo, hi), (lo, hi));
    canvas.polyline(&[(lo, lo), (hi, hi)], '.');
    for r in residuals {
        canvas.point(r.h_fit, r.observation.height, 'o');
    }
    canvas.render(&format!("Observed vs predicted: h=[{lo:.2}, {hi:.2}] m"))
}

/// Residuals against time around a zero line.
pub fn render_residuals_vs_time(residuals: &[ObservationResidual], width: usize, height: usize) -> String {
    let (t_min, t_max) = data_range(residuals.iter().map(|r| r.observation.time)).unwrap_or((0.0, 1.0));
    let (r_min, r_max) =
        data_range(residuals.iter().map(|r| r.residual).chain([0.0])).unwrap_or((-1.0, 1.0));
    let (r_min, r_max) = pad_range(r_min, r_max, 0.1);

    let mut canvas = AsciiCanvas::new(width, height, (t_min, t_max), (r_min, r_max));
    canvas.polyline(&[(t_min, 0.0), (t_max, 0.0)], '-');
    for r in residuals {
        canvas.point(r.observation.time, r.residual, 'o');
    }
    canvas.render(&format!(
        "Residuals vs time: t=[{t_min:.3}, {t_max:.3}] s | r=[{r_min:.3}, {r_max:.3}] m"
    ))
}

/// `(theoretical quantile, sorted residual)` pairs at Hazen plotting
/// positions `(i − 0.5) / n`.
pub fn normal_probability_points(residuals: &[ObservationResidual]) -> Vec<(f64, f64)> {
    let mut sorted: Vec<f64> = residuals.iter().map(|r| r.residual).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, r)| (normal_quantile((i as f64 + 0.5) / n), r))
        .collect()
}

/// Normal-probability plot of the residuals with the `mean + sd·z` line.
pub fn render_normal_probability(residuals: &[ObservationResidual], width: usize, height: usize) -> String {
    let points = normal_probability_points(residuals);
    let (z_min, z_max) = data_range(points.iter().map(|p| p.0)).unwrap_or((-2.0, 2.0));

    let n = points.len().max(1) as f64;
    let mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let var = points.iter().map(|p| (p.1 - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let sd = var.sqrt();
    let line = [(z_min, mean + sd * z_min), (z_max, mean + sd * z_max)];

    let values = points.iter().map(|p| p.1).chain(line.iter().map(|p| p.1));
    let (r_min, r_max) = data_range(values).unwrap_or((-1.0, 1.0));
    let (r_min, r_max) = pad_range(r_min, r_max, 0.05);

    let mut canvas = AsciiCanvas::new(width, height, (z_min, z_max), (r_min, r_max));
    canvas.polyline(&line, '.');
    for &(z, r) in &points {
        canvas.point(z, r, 'o');
    }
    canvas.render(&format!(
        "Normal probability: z=[{z_min:.2}, {z_max:.2}] | r=[{r_min:.3}, {r_max:.3}] m | mean={mean:.3} sd={sd:.3}"
    ))
}

/// Marginal density of one parameter: prior `.` (when given), posterior `*`.
pub fn render_marginal(
    param: Param,
    prior: Option<&ParameterDistribution>,
    posterior: &ParameterDistribution,
    width: usize,
    height: usize,
) -> String {
    let steps = width.max(10);
    let mut bounds = axis(posterior.mean.get(param), posterior.std_dev(param), 2, 4.0);
    if let Some(p) = prior {
        bounds.extend(axis(p.mean.get(param), p.std_dev(param), 2, 3.0));
    }
    let (x_min, x_max) = data_range(bounds).unwrap_or((0.0, 1.0));
    let xs = axis(0.5 * (x_min + x_max), 0.5 * (x_max - x_min), steps, 1.0);

    let post: Vec<(f64, f64)> = xs.iter().map(|&x| (x, posterior.marginal_pdf(param, x))).collect();
    let prior_curve: Option<Vec<(f64, f64)>> =
        prior.map(|p| xs.iter().map(|&x| (x, p.marginal_pdf(param, x))).collect());

    let peak = post
        .iter()
        .chain(prior_curve.iter().flatten())
        .map(|p| p.1)
        .fold(0.0, f64::max);
    let y_max = if peak > 0.0 { peak * 1.05 } else { 1.0 };

    let mut canvas = AsciiCanvas::new(width, height, (x_min, x_max), (0.0, y_max));
    canvas.polyline(&post, '*');
    if let Some(curve) = &prior_curve {
        canvas.polyline(curve, '.');
    }

    let legend = if prior.is_some() { "prior '.' posterior '*'" } else { "posterior '*'" };
    canvas.render(&format!(
        "Marginal {} [{}]: {legend} | x=[{x_min:.4}, {x_max:.4}]",
        param.label(),
        param.unit()
    ))
}

/// Joint density as character shading, `g` across and `h0` up.
pub fn render_joint_density(grid: &DensityGrid, width: usize, height: usize) -> String {
    let (g_min, g_max) = data_range(grid.g_values.iter().copied()).unwrap_or((0.0, 1.0));
    let (h_min, h_max) = data_range(grid.h0_values.iter().copied()).unwrap_or((0.0, 1.0));
    let mut canvas = AsciiCanvas::new(width, height, (g_min, g_max), (h_min, h_max));

    let peak = grid.max_density();
    let cols = grid.g_values.len();
    let rows = grid.h0_values.len();
    if peak > 0.0 && cols > 0 && rows > 0 {
        let (w, h) = (canvas.width(), canvas.height());
        for row in 0..h {
            // Row 0 is the top, i.e. the largest h0.
            let gi_row = nearest(h - 1 - row, h, rows);
            for col in 0..w {
                let gi_col = nearest(col, w, cols);
                let level = grid.density[gi_row][gi_col] / peak;
                canvas.set(col, row, shade(level));
            }
        }
    }

    canvas.render(&format!(
        "Joint posterior: g=[{g_min:.4}, {g_max:.4}] m/s² | h0=[{h_min:.3}, {h_max:.3}] m"
    ))
}

fn nearest(cell: usize, cells: usize, samples: usize) -> usize {
    if cells < 2 || samples < 2 {
        return 0;
    }
    let u = cell as f64 / (cells - 1) as f64;
    ((u * (samples - 1) as f64).round() as usize).min(samples - 1)
}

fn shade(level: f64) -> char {
    let idx = (level.clamp(0.0, 1.0) * (SHADES.len() - 1) as f64).round() as usize;
    SHADES[idx.min(SHADES.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, Theta};
    use crate::math::covariance_from_sigmas;

    fn residuals(values: &[f64]) -> Vec<ObservationResidual> {
        values
            .iter()
            .enumerate()
            .map(|(i, &r)| ObservationResidual {
                observation: Observation { index: i, time: i as f64 * 0.1, height: 40.0 - i as f64 + r },
                h_fit: 40.0 - i as f64,
                residual: r,
            })
            .collect()
    }

    #[test]
    fn normal_probability_uses_hazen_positions() {
        let pts = normal_probability_points(&residuals(&[0.3, -0.1, 0.0, 0.2]));
        assert_eq!(pts.len(), 4);
        assert!((pts[0].0 - normal_quantile(0.125)).abs() < 1e-12);
        assert!((pts[3].0 - normal_quantile(0.875)).abs() < 1e-12);
        assert_eq!(pts[0].1, -0.1);
        assert_eq!(pts[3].1, 0.3);
        assert!(pts.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 <= w[1].1));
    }

    #[test]
    fn residual_plot_has_zero_line_and_points() {
        let txt = render_residuals_vs_time(&residuals(&[0.3, -0.2, 0.1, -0.4, 0.2]), 30, 9);
        assert_eq!(txt.lines().count(), 10);
        assert!(txt.matches('o').count() >= 4);
        assert!(txt.contains("---"));
    }

    #[test]
    fn observed_vs_predicted_draws_diagonal() {
        let txt = render_observed_vs_predicted(&residuals(&[0.0, 0.0, 0.0]), 20, 10);
        assert!(txt.starts_with("Observed vs predicted"));
        assert!(txt.contains('o'));
    }

    #[test]
    fn marginal_shows_prior_and_posterior() {
        let prior = ParameterDistribution::new(Theta::new(9.8, 46.0), covariance_from_sigmas(1.0, 5.0, 0.0));
        let post = ParameterDistribution::new(Theta::new(9.81, 45.1), covariance_from_sigmas(0.05, 0.3, -0.5));
        let txt = render_marginal(Param::G, Some(&prior), &post, 50, 12);
        assert!(txt.contains('*'));
        assert!(txt.contains("prior '.'"));
        let alone = render_marginal(Param::H0, None, &post, 50, 12);
        assert!(!alone.contains("prior"));
    }

    #[test]
    fn joint_density_peaks_in_the_middle() {
        let post = ParameterDistribution::new(Theta::new(9.81, 45.1), covariance_from_sigmas(0.05, 0.3, 0.0));
        let grid = post.density_grid(21, 3.0);
        let txt = render_joint_density(&grid, 21, 11);
        let rows: Vec<&str> = txt.lines().skip(1).collect();
        assert_eq!(rows[5].chars().nth(10), Some('@'));
        assert_eq!(rows[0].chars().next(), Some(' '));
    }
}
