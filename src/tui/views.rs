//! Chart series for each TUI view.
//!
//! Pure data preparation; rendering happens in `plotters_chart`.

use crate::app::pipeline::RunOutput;
use crate::domain::{Param, ParameterDistribution};
use crate::math::chi2_2dof_quantile;
use crate::plot::{data_range, normal_probability_points, pad_range, sample_model};

use super::plotters_chart::{CYAN, ChartLine, ChartPoints, GRAY, GREEN, MAGENTA, RED, YELLOW};
use plotters::prelude::{RGBColor, WHITE};

const CURVE_SAMPLES: usize = 200;
const DENSITY_STEPS: usize = 41;

/// Views cycled with `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    ModelFit,
    Residuals,
    NormalProbability,
    Marginal(Param),
    JointDensity,
}

impl View {
    pub fn next(self) -> Self {
        match self {
            View::ModelFit => View::Residuals,
            View::Residuals => View::NormalProbability,
            View::NormalProbability => View::Marginal(Param::G),
            View::Marginal(Param::G) => View::Marginal(Param::H0),
            View::Marginal(Param::H0) => View::JointDensity,
            View::JointDensity => View::ModelFit,
        }
    }

    pub fn title(self) -> String {
        match self {
            View::ModelFit => "Model fit (gray: initial, cyan: calibrated, green/red: largest residuals)".to_string(),
            View::Residuals => "Residuals vs time".to_string(),
            View::NormalProbability => "Residual normal probability".to_string(),
            View::Marginal(p) => format!("Marginal density of {} (yellow: prior, cyan: posterior)", p.label()),
            View::JointDensity => "Joint posterior density (magenta: MAP, yellow: joint region)".to_string(),
        }
    }
}

/// Everything the chart widget needs for one view.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub lines: Vec<ChartLine>,
    pub scatter: Vec<ChartPoints>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'static str,
    pub y_label: &'static str,
}

pub fn chart_data(view: View, run: &RunOutput, level: f64) -> ChartData {
    match view {
        View::ModelFit => model_fit(run),
        View::Residuals => residuals(run),
        View::NormalProbability => normal_probability(run),
        View::Marginal(param) => marginal(param, run.result.prior.as_ref(), &run.result.posterior),
        View::JointDensity => joint_density(&run.result.posterior, level),
    }
}

fn model_fit(run: &RunOutput) -> ChartData {
    let t_max = run.ingest.stats.time_max;
    let initial = sample_model(&run.result.initial, 0.0, t_max, CURVE_SAMPLES);
    let calibrated = sample_model(&run.result.map, 0.0, t_max, CURVE_SAMPLES);
    let observed: Vec<(f64, f64)> = run.ingest.observations.iter().map(|o| (o.time, o.height)).collect();

    let heights = observed
        .iter()
        .chain(&initial)
        .chain(&calibrated)
        .map(|p| p.1);

    ChartData {
        x_bounds: bounds([0.0, t_max], 0.0),
        y_bounds: bounds(heights, 0.05),
        lines: vec![line(initial, GRAY), line(calibrated, CYAN)],
        scatter: vec![
            points(observed, WHITE),
            points(run.rankings.above.iter().map(|r| (r.observation.time, r.observation.height)).collect(), GREEN),
            points(run.rankings.below.iter().map(|r| (r.observation.time, r.observation.height)).collect(), RED),
        ],
        x_label: "t (s)",
        y_label: "h (m)",
    }
}

fn residuals(run: &RunOutput) -> ChartData {
    let pts: Vec<(f64, f64)> = run.residuals.iter().map(|r| (r.observation.time, r.residual)).collect();
    let x_bounds = bounds(pts.iter().map(|p| p.0), 0.0);
    let y_bounds = bounds(pts.iter().map(|p| p.1).chain([0.0]), 0.1);

    ChartData {
        lines: vec![line(vec![(x_bounds[0], 0.0), (x_bounds[1], 0.0)], GRAY)],
        scatter: vec![points(pts, WHITE)],
        x_bounds,
        y_bounds,
        x_label: "t (s)",
        y_label: "r (m)",
    }
}

fn normal_probability(run: &RunOutput) -> ChartData {
    let pts = normal_probability_points(&run.residuals);
    let x_bounds = bounds(pts.iter().map(|p| p.0), 0.05);
    let line_pts = [x_bounds[0], x_bounds[1]]
        .map(|z| (z, run.stats.mean + run.stats.std * z))
        .to_vec();
    let y_bounds = bounds(pts.iter().chain(&line_pts).map(|p| p.1), 0.05);

    ChartData {
        lines: vec![line(line_pts, GRAY)],
        scatter: vec![points(pts, WHITE)],
        x_bounds,
        y_bounds,
        x_label: "normal quantile",
        y_label: "r (m)",
    }
}

fn marginal(param: Param, prior: Option<&ParameterDistribution>, posterior: &ParameterDistribution) -> ChartData {
    let mut ends = crate::calib::axis(posterior.mean.get(param), posterior.std_dev(param), 2, 4.0);
    if let Some(p) = prior {
        ends.extend(crate::calib::axis(p.mean.get(param), p.std_dev(param), 2, 3.0));
    }
    let x_bounds = bounds(ends, 0.0);
    let xs = crate::calib::axis(
        0.5 * (x_bounds[0] + x_bounds[1]),
        0.5 * (x_bounds[1] - x_bounds[0]),
        CURVE_SAMPLES,
        1.0,
    );

    let mut lines = Vec::new();
    if let Some(p) = prior {
        lines.push(line(xs.iter().map(|&x| (x, p.marginal_pdf(param, x))).collect(), YELLOW));
    }
    lines.push(line(xs.iter().map(|&x| (x, posterior.marginal_pdf(param, x))).collect(), CYAN));

    let peak = lines
        .iter()
        .flat_map(|l| l.points.iter().map(|p| p.1))
        .fold(0.0, f64::max);
    let y_max = if peak > 0.0 && peak.is_finite() { peak * 1.05 } else { 1.0 };

    ChartData {
        lines,
        scatter: Vec::new(),
        x_bounds,
        y_bounds: [0.0, y_max],
        x_label: if param == Param::G { "g (m/s²)" } else { "h0 (m)" },
        y_label: "density",
    }
}

fn joint_density(posterior: &ParameterDistribution, level: f64) -> ChartData {
    let grid = posterior.density_grid(DENSITY_STEPS, 3.0);
    let peak = grid.max_density();

    // Four shading bands, densest last so it draws on top.
    let bands: [(f64, RGBColor); 4] = [(0.05, GRAY), (0.25, GREEN), (0.5, CYAN), (0.75, RED)];
    let mut scatter: Vec<ChartPoints> = bands.iter().map(|&(_, c)| points(Vec::new(), c)).collect();
    if peak > 0.0 {
        for (row, &h0) in grid.h0_values.iter().enumerate() {
            for (col, &g) in grid.g_values.iter().enumerate() {
                let u = grid.density[row][col] / peak;
                if let Some(band) = bands.iter().rposition(|&(lo, _)| u >= lo) {
                    scatter[band].points.push((g, h0));
                }
            }
        }
    }
    scatter.push(points(vec![(posterior.mean.g, posterior.mean.h0)], MAGENTA));

    ChartData {
        lines: vec![line(confidence_ellipse(posterior, level, CURVE_SAMPLES), YELLOW)],
        scatter,
        x_bounds: bounds(grid.g_values.iter().copied(), 0.0),
        y_bounds: bounds(grid.h0_values.iter().copied(), 0.0),
        x_label: "g (m/s²)",
        y_label: "h0 (m)",
    }
}

/// Boundary of the joint `level` region `{θ : (θ−μ)ᵀ Σ⁻¹ (θ−μ) ≤ χ²₂(level)}`.
pub fn confidence_ellipse(dist: &ParameterDistribution, level: f64, n: usize) -> Vec<(f64, f64)> {
    let c = dist.covariance;
    let l11 = c[0][0].max(0.0).sqrt();
    if l11 == 0.0 {
        return Vec::new();
    }
    let l21 = c[1][0] / l11;
    let l22 = (c[1][1] - l21 * l21).max(0.0).sqrt();
    let radius = chi2_2dof_quantile(level).sqrt();

    let n = n.max(3);
    (0..=n)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / n as f64;
            let (u, v) = (radius * a.cos(), radius * a.sin());
            (dist.mean.g + l11 * u, dist.mean.h0 + l21 * u + l22 * v)
        })
        .collect()
}

fn bounds(values: impl IntoIterator<Item = f64>, pad: f64) -> [f64; 2] {
    let (lo, hi) = data_range(values).unwrap_or((0.0, 1.0));
    let (lo, hi) = if pad > 0.0 { pad_range(lo, hi, pad) } else { (lo, hi) };
    [lo, hi]
}

fn line(points: Vec<(f64, f64)>, color: RGBColor) -> ChartLine {
    ChartLine { points, color }
}

fn points(points: Vec<(f64, f64)>, color: RGBColor) -> ChartPoints {
    ChartPoints { points, color }
}
