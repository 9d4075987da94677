//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed points: `o`
//! - calibrated curve: `-` line
//! - initial-guess curve: `.` line

use crate::domain::{CalibrationFile, Observation, Param, Theta};
use crate::models::drop_height;

/// A model curve to overlay on the observations.
#[derive(Debug, Clone, Copy)]
pub struct CurveOverlay {
    pub theta: Theta,
    pub symbol: char,
}

/// Fixed-size character canvas with linear axes.
#[derive(Debug, Clone)]
pub struct AsciiCanvas {
    grid: Vec<Vec<char>>,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl AsciiCanvas {
    pub fn new(width: usize, height: usize, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        let width = width.max(10);
        let height = height.max(5);
        Self {
            grid: vec![vec![' '; width]; height],
            x_range,
            y_range,
        }
    }

    pub fn width(&self) -> usize {
        self.grid[0].len()
    }

    pub fn height(&self) -> usize {
        self.grid.len()
    }

    /// Cell of a data point (column, row), row 0 at the top.
    pub fn cell(&self, x: f64, y: f64) -> (usize, usize) {
        (
            map_x(x, self.x_range.0, self.x_range.1, self.width()),
            map_y(y, self.y_range.0, self.y_range.1, self.height()),
        )
    }

    /// Mark a point, overwriting whatever is there.
    pub fn point(&mut self, x: f64, y: f64, ch: char) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        let (col, row) = self.cell(x, y);
        self.grid[row][col] = ch;
    }

    /// Connect consecutive points; only empty cells are drawn on.
    pub fn polyline(&mut self, points: &[(f64, f64)], ch: char) {
        let mut prev = None;
        for &(x, y) in points {
            if !(x.is_finite() && y.is_finite()) {
                prev = None;
                continue;
            }
            let (col, row) = self.cell(x, y);
            match prev {
                Some((c0, r0)) => draw_line(&mut self.grid, c0, r0, col, row, ch),
                None => {
                    if self.grid[row][col] == ' ' {
                        self.grid[row][col] = ch;
                    }
                }
            }
            prev = Some((col, row));
        }
    }

    /// Fill one cell directly (used by the density shading).
    pub fn set(&mut self, col: usize, row: usize, ch: char) {
        if row < self.height() && col < self.width() {
            self.grid[row][col] = ch;
        }
    }

    pub fn render(self, header: &str) -> String {
        let mut out = String::new();
        out.push_str(header);
        out.push('\n');
        for row in self.grid {
            out.push_str(&row.into_iter().collect::<String>());
            out.push('\n');
        }
        out
    }
}

/// Observations with one or more model curves on top.
pub fn render_model_vs_data(
    observations: &[Observation],
    curves: &[CurveOverlay],
    width: usize,
    height: usize,
) -> String {
    let (t_min, t_max) = data_range(observations.iter().map(|o| o.time)).unwrap_or((0.0, 1.0));
    let sampled: Vec<(char, Vec<(f64, f64)>)> = curves
        .iter()
        .map(|c| (c.symbol, sample_model(&c.theta, t_min, t_max, width.max(2))))
        .collect();

    let heights = observations
        .iter()
        .map(|o| o.height)
        .chain(sampled.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.1)));
    let (h_min, h_max) = data_range(heights).unwrap_or((0.0, 1.0));
    let (h_min, h_max) = pad_range(h_min, h_max, 0.05);

    let mut canvas = AsciiCanvas::new(width, height, (t_min, t_max), (h_min, h_max));
    // Curves first so points can overlay.
    for (symbol, pts) in &sampled {
        canvas.polyline(pts, *symbol);
    }
    for o in observations {
        canvas.point(o.time, o.height, 'o');
    }

    canvas.render(&format!(
        "Plot: t=[{t_min:.3}, {t_max:.3}] s | h=[{h_min:.2}, {h_max:.2}] m"
    ))
}

/// The model for several values of `param`, the other parameter held at
/// `base`. Curves are labelled `0`, `1`, ... in sweep order.
pub fn render_model_family(
    observations: &[Observation],
    base: Theta,
    param: Param,
    values: &[f64],
    width: usize,
    height: usize,
) -> String {
    let curves: Vec<CurveOverlay> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| CurveOverlay {
            theta: base.with(param, v),
            symbol: sweep_symbol(i),
        })
        .collect();

    let mut out = render_model_vs_data(observations, &curves, width, height);
    for (i, &v) in values.iter().enumerate() {
        out.push_str(&format!("  {} : {} = {v:.3} {}\n", sweep_symbol(i), param.label(), param.unit()));
    }
    out
}

/// Plot a saved calibration (fitted grid), optionally with observations.
pub fn render_calibration_file(
    calibration: &CalibrationFile,
    observations: &[Observation],
    width: usize,
    height: usize,
) -> String {
    let curve: Vec<(f64, f64)> = calibration
        .grid
        .time
        .iter()
        .zip(&calibration.grid.height)
        .map(|(&t, &h)| (t, h))
        .collect();

    let times = curve.iter().map(|p| p.0).chain(observations.iter().map(|o| o.time));
    let (t_min, t_max) = data_range(times).unwrap_or((0.0, 1.0));
    let heights = curve.iter().map(|p| p.1).chain(observations.iter().map(|o| o.height));
    let (h_min, h_max) = data_range(heights).unwrap_or((0.0, 1.0));
    let (h_min, h_max) = pad_range(h_min, h_max, 0.05);

    let mut canvas = AsciiCanvas::new(width, height, (t_min, t_max), (h_min, h_max));
    canvas.polyline(&curve, '-');
    for o in observations {
        canvas.point(o.time, o.height, 'o');
    }

    let map = calibration.result.map;
    canvas.render(&format!(
        "Plot: {} | g={:.4} h0={:.4} | t=[{t_min:.3}, {t_max:.3}] s | h=[{h_min:.2}, {h_max:.2}] m",
        calibration.result.method.display_name(),
        map.g,
        map.h0,
    ))
}

fn sweep_symbol(i: usize) -> char {
    char::from_digit((i % 10) as u32, 10).unwrap_or('*')
}

/// Model evaluated at `n` evenly spaced times.
pub fn sample_model(theta: &Theta, t_min: f64, t_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let t = t_min + u * (t_max - t_min);
            (t, drop_height(theta, t))
        })
        .collect()
}

/// `(min, max)` of the finite values, `None` when empty or flat.
pub fn data_range(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

pub fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_points() -> Vec<Observation> {
        vec![
            Observation { index: 0, time: 0.0, height: 0.0 },
            Observation { index: 1, time: 2.0, height: 10.0 },
        ]
    }

    #[test]
    fn plot_golden_snapshot_small() {
        // g = 0 keeps the model flat at h0.
        let curve = CurveOverlay { theta: Theta::new(0.0, 5.0), symbol: '-' };
        let txt = render_model_vs_data(&two_points(), &[curve], 10, 5);
        let expected = concat!(
            "Plot: t=[0.000, 2.000] s | h=[-0.50, 10.50] m\n",
            "         o\n",
            "          \n",
            "----------\n",
            "          \n",
            "o         \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn rendering_is_deterministic() {
        let obs: Vec<Observation> = (0..20)
            .map(|i| {
                let t = i as f64 * 0.15;
                Observation { index: i, time: t, height: drop_height(&Theta::new(9.81, 45.0), t) }
            })
            .collect();
        let curves = [
            CurveOverlay { theta: Theta::new(9.8, 46.0), symbol: '.' },
            CurveOverlay { theta: Theta::new(9.81, 45.0), symbol: '-' },
        ];
        let a = render_model_vs_data(&obs, &curves, 60, 15);
        let b = render_model_vs_data(&obs, &curves, 60, 15);
        assert_eq!(a, b);
        assert_eq!(a.lines().count(), 16);
        // The header is text; only the plot rows carry markers.
        let markers: usize = a.lines().skip(1).map(|l| l.matches('o').count()).sum();
        assert_eq!(markers, 20);
    }

    #[test]
    fn model_family_lists_every_value() {
        let txt = render_model_family(&two_points(), Theta::new(9.8, 10.0), Param::G, &[5.0, 10.0, 20.0], 20, 8);
        assert!(txt.contains("0 : g = 5.000 m/s²"));
        assert!(txt.contains("2 : g = 20.000 m/s²"));
        assert!(txt.contains('1'));
    }

    #[test]
    fn canvas_ignores_non_finite_points() {
        let mut canvas = AsciiCanvas::new(10, 5, (0.0, 1.0), (0.0, 1.0));
        canvas.point(f64::NAN, 0.5, 'x');
        canvas.polyline(&[(0.0, 0.0), (f64::INFINITY, 1.0)], '-');
        let txt = canvas.render("");
        assert!(!txt.contains('x'));
        assert_eq!(txt.matches('-').count(), 1);
    }
}
