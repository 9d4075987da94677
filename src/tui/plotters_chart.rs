//! Plotters-powered chart widget for Ratatui.
//!
//! Plotters output is rendered into the Ratatui buffer with
//! `plotters-ratatui-backend`, which gives proper axes and tick labels on top
//! of the terminal canvas.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// Palette shared by the views.
pub const CYAN: RGBColor = RGBColor(0, 255, 255);
pub const YELLOW: RGBColor = RGBColor(255, 255, 0);
pub const GREEN: RGBColor = RGBColor(0, 255, 0);
pub const RED: RGBColor = RGBColor(255, 0, 0);
pub const MAGENTA: RGBColor = RGBColor(255, 0, 255);
pub const GRAY: RGBColor = RGBColor(128, 128, 128);

/// A polyline drawn in one color.
#[derive(Debug, Clone)]
pub struct ChartLine {
    pub points: Vec<(f64, f64)>,
    pub color: RGBColor,
}

/// Scatter points drawn as single pixels.
#[derive(Debug, Clone)]
pub struct ChartPoints {
    pub points: Vec<(f64, f64)>,
    pub color: RGBColor,
}

/// Render-only chart description.
///
/// All series and bounds are computed before rendering so `render()` only
/// draws.
pub struct PlottersChart<'a> {
    pub lines: &'a [ChartLine],
    pub scatter: &'a [ChartPoints],
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl Widget for PlottersChart<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to lay out a tiny area.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            // Mesh lines clutter low-resolution terminal output.
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            for line in self.lines {
                chart.draw_series(plotters::series::LineSeries::new(line.points.iter().copied(), &line.color))?;
            }

            // `Circle` radii are mis-scaled by the ratatui backend, so points
            // are drawn as pixels.
            for series in self.scatter {
                chart.draw_series(series.points.iter().map(|&(x, y)| Pixel::new((x, y), series.color)))?;
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}
