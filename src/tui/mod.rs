//! Ratatui-based terminal UI.
//!
//! A settings panel for the calibration method, interval level and
//! observation sigma, plus switchable diagnostic charts for the current run.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use crate::app::pipeline::{RunOutput, run_with_data};
use crate::domain::{CalibrationConfig, Param};
use crate::error::AppError;
use crate::io::ingest::{IngestedData, load_observations};

mod plotters_chart;
mod views;

use plotters_chart::PlottersChart;
use views::{View, chart_data};

/// Interval levels offered by the settings panel.
const LEVELS: [f64; 5] = [0.68, 0.8, 0.9, 0.95, 0.99];
const SIGMA_STEP: f64 = 0.05;
const SETTINGS: usize = 3;

/// Start the TUI.
pub fn run(config: CalibrationConfig) -> Result<(), AppError> {
    // Load before touching the terminal so errors print normally.
    let ingest = load_observations(&config.data_path)?;
    let mut app = App::new(config, ingest);

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::input(format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Restores the terminal (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::input(format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::input(format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    config: CalibrationConfig,
    ingest: IngestedData,
    view: View,
    selected_field: usize,
    status: String,
    run: Option<RunOutput>,
}

impl App {
    fn new(config: CalibrationConfig, ingest: IngestedData) -> Self {
        let mut app = Self {
            config,
            ingest,
            view: View::ModelFit,
            selected_field: 0,
            status: String::new(),
            run: None,
        };
        app.recalibrate();
        app
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::input(format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::input(format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::input(format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => needs_redraw = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => self.selected_field = self.selected_field.saturating_sub(1),
            KeyCode::Down => self.selected_field = (self.selected_field + 1).min(SETTINGS - 1),
            KeyCode::Left => self.adjust_field(-1),
            KeyCode::Right => self.adjust_field(1),
            KeyCode::Char('v') => {
                self.view = self.view.next();
                self.status = format!("view: {}", self.view.title());
            }
            KeyCode::Char('m') => {
                self.config.method = self.config.method.next();
                self.recalibrate();
            }
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('d') => {
                self.status = match crate::debug::write_debug_bundle(&self.ingest, &self.config) {
                    Ok(path) => format!("Wrote debug bundle: {}", path.display()),
                    Err(err) => format!("Debug write failed: {err}"),
                };
            }
            _ => {}
        }
        false
    }

    fn adjust_field(&mut self, delta: i32) {
        match self.selected_field {
            0 => {
                self.config.method = if delta >= 0 {
                    self.config.method.next()
                } else {
                    self.config.method.prev()
                };
            }
            1 => self.config.level = step_level(self.config.level, delta),
            2 => {
                let next = self.config.obs_sigma + SIGMA_STEP * f64::from(delta);
                self.config.obs_sigma = next.max(SIGMA_STEP);
            }
            _ => return,
        }
        self.recalibrate();
    }

    fn reload(&mut self) {
        match load_observations(&self.config.data_path) {
            Ok(ingest) => {
                self.ingest = ingest;
                self.recalibrate();
            }
            Err(err) => self.status = format!("Reload failed: {err}"),
        }
    }

    /// Rerun the pipeline; a failure keeps the previous run on screen.
    fn recalibrate(&mut self) {
        match run_with_data(self.ingest.clone(), &self.config) {
            Ok(run) => {
                self.status = format!(
                    "{}: {} iterations{}",
                    run.result.method.display_name(),
                    run.result.iterations,
                    if run.result.converged { "" } else { " (did not converge)" }
                );
                self.run = Some(run);
            }
            Err(err) => {
                tracing::warn!(code = err.exit_code(), "{}", err.message());
                self.status = format!("Calibration failed: {err}");
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(frame.area());

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("balldrop", Style::default().fg(Color::Cyan)),
            Span::raw(format!(
                " | {} | n={} | t=[{:.2}, {:.2}] s",
                self.ingest.source,
                self.ingest.stats.n_points,
                self.ingest.stats.time_min,
                self.ingest.stats.time_max
            )),
        ]));

        if let Some(run) = &self.run {
            let r = &run.result;
            lines.push(Line::from(Span::styled(
                format!(
                    "{} | g={:.4} m/s² | h0={:.4} m | corr={:.3} | rmse={:.4} m",
                    r.method.display_name(),
                    r.map.g,
                    r.map.h0,
                    r.posterior.correlation(),
                    r.quality.rmse,
                ),
                Style::default().fg(Color::Gray),
            )));
            let cis: Vec<String> = run
                .intervals
                .iter()
                .map(|ci| format!("{} [{:.4}, {:.4}]", ci.param.label(), ci.lower, ci.upper))
                .collect();
            lines.push(Line::from(Span::styled(
                format!("{}% CI: {}", (self.config.level * 100.0).round(), cis.join(" | ")),
                Style::default().fg(Color::Gray),
            )));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(32)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_settings(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title(self.view.title()).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(run) = &self.run else {
            let msg = Paragraph::new("No calibration available.").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let data = chart_data(self.view, run, self.config.level);
        let (chart_rect, insets) = chart_layout(inner);
        let widget = PlottersChart {
            lines: &data.lines,
            scatter: &data.scatter,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            x_label: data.x_label,
            y_label: data.y_label,
            fmt_x: fmt_axis,
            fmt_y: fmt_axis,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, &data);
        }
    }

    fn draw_settings(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut items = vec![
            ListItem::new(format!("Method: {}", self.config.method.key())),
            ListItem::new(format!("Level: {}", self.config.level)),
            ListItem::new(format!("Sigma: {:.2} m", self.config.obs_sigma)),
        ];

        if let Some(run) = &self.run {
            items.push(ListItem::new(""));
            for param in Param::ALL {
                items.push(ListItem::new(format!(
                    "sd({}): {:.5}",
                    param.label(),
                    run.result.posterior.std_dev(param)
                )));
            }
            items.push(ListItem::new(format!("resid mean: {:.4}", run.stats.mean)));
            items.push(ListItem::new(format!("resid std:  {:.4}", run.stats.std)));
            if let Some(b) = &run.result.bootstrap {
                items.push(ListItem::new(format!("bootstrap: {}/{}", b.samples.len(), b.requested)));
            }
        }

        let list = List::new(items)
            .block(Block::default().title("Settings").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White).add_modifier(Modifier::BOLD))
            .highlight_symbol("» ");

        let mut state = ratatui::widgets::ListState::default();
        state.select(Some(self.selected_field));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  ←/→ adjust  v view  m method  r reload  d debug  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Move to the neighbouring preset level; off-preset values snap to the
/// nearest preset in the direction of travel.
fn step_level(current: f64, delta: i32) -> f64 {
    if delta >= 0 {
        LEVELS.iter().copied().find(|&l| l > current + 1e-9).unwrap_or(LEVELS[LEVELS.len() - 1])
    } else {
        LEVELS.iter().rev().copied().find(|&l| l < current - 1e-9).unwrap_or(LEVELS[0])
    }
}

fn fmt_axis(v: f64) -> String {
    if v.abs() >= 100.0 {
        format!("{v:.0}")
    } else if v.abs() >= 1.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.3}")
    }
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    data: &views::ChartData,
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);
    let [x0, x1] = data.x_bounds;
    let [y0, y1] = data.y_bounds;

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let label = fmt_axis(x0 + u * (x1 - x0));
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        let width = label.len() as u16;
        frame.render_widget(Paragraph::new(label).style(style), Rect { x: start, y, width, height: 1 });
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let label = fmt_axis(y0 + u * (y1 - y0));
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        let width = label.len() as u16;
        frame.render_widget(Paragraph::new(label).style(style), Rect { x: start, y, width, height: 1 });
    }

    let x_label = Paragraph::new(data.x_label).alignment(Alignment::Center).style(style);
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new(data.y_label).style(style.add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}
