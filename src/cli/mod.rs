//! Command-line parsing for the falling-ball calibration tool.
//!
//! Argument parsing and command dispatch stay separate from the
//! modeling/calibration code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{CalibrationMethod, Param};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "balldrop", version, about = "Falling-ball model calibration (g, h0)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calibrate (g, h0) with one method, print diagnostics, optionally plot/export.
    Calibrate(CalibrateArgs),
    /// Run all four methods on the same data and print a comparison table.
    Compare(CalibrateArgs),
    /// Write a synthetic observation CSV from known parameters.
    Simulate(SimulateArgs),
    /// Plot the model for a sweep of one parameter against the data.
    Explore(ExploreArgs),
    /// Plot a previously exported calibration JSON.
    Plot(PlotArgs),
    /// Launch the interactive TUI.
    ///
    /// Uses the same calibration pipeline as `balldrop calibrate` and renders
    /// the diagnostics with Ratatui.
    Tui(CalibrateArgs),
}

/// Common options for calibration.
#[derive(Debug, Parser, Clone)]
pub struct CalibrateArgs {
    /// Observation CSV (defaults to $BALLDROP_DATA, then data/ball_drops.csv).
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Calibration method.
    #[arg(short = 'm', long, value_enum, default_value_t = CalibrationMethod::NonLinearLeastSquares)]
    pub method: CalibrationMethod,

    /// Initial guess (and prior mean) for g (m/s²).
    #[arg(long, default_value_t = 9.8)]
    pub g: f64,

    /// Initial guess (and prior mean) for h0 (m).
    #[arg(long, default_value_t = 46.0)]
    pub h0: f64,

    /// Prior standard deviation of g.
    #[arg(long, default_value_t = 1.0)]
    pub prior_sd_g: f64,

    /// Prior standard deviation of h0.
    #[arg(long, default_value_t = 5.0)]
    pub prior_sd_h0: f64,

    /// Prior correlation between g and h0.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub prior_corr: f64,

    /// Observation noise standard deviation (m) for the Gaussian methods.
    #[arg(long, default_value_t = 0.5)]
    pub sigma: f64,

    /// Confidence level for intervals.
    #[arg(long, default_value_t = 0.95)]
    pub level: f64,

    /// Maximum solver iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,

    /// Solver convergence tolerance.
    #[arg(long, default_value_t = 1e-10)]
    pub tol: f64,

    /// Extra perturbed starting points for the non-linear solvers.
    #[arg(long, default_value_t = 0)]
    pub multistart: usize,

    /// Bootstrap replicates for the NLLS covariance (0 disables).
    #[arg(long, default_value_t = 0)]
    pub bootstrap: usize,

    /// Random seed for bootstrap resampling.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Show the top-N residuals above and below the curve.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Grid steps per axis for the joint density plot.
    #[arg(long, default_value_t = 41)]
    pub grid_steps: usize,

    /// Render ASCII plots in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export per-observation residuals to CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,

    /// Export the calibration (method, MAP, posterior, intervals, grid) to JSON.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Write a Markdown debug bundle under debug/.
    #[arg(long)]
    pub debug_bundle: bool,
}

/// Options for writing a synthetic data set.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output CSV path.
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    /// True g (m/s²).
    #[arg(long, default_value_t = 9.81)]
    pub g: f64,

    /// True h0 (m).
    #[arg(long, default_value_t = 45.0)]
    pub h0: f64,

    /// Number of observations.
    #[arg(short = 'n', long, default_value_t = 40)]
    pub count: usize,

    /// Last observation time (s).
    #[arg(long, default_value_t = 3.12)]
    pub t_max: f64,

    /// Gaussian noise standard deviation (m).
    #[arg(long, default_value_t = 0.4)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for the parameter sweep plot.
#[derive(Debug, Parser, Clone)]
pub struct ExploreArgs {
    /// Observation CSV (defaults to $BALLDROP_DATA, then data/ball_drops.csv).
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Parameter to sweep.
    #[arg(short = 'p', long, value_enum, default_value_t = Param::G)]
    pub param: Param,

    /// Explicit sweep values, comma separated. Overrides --from/--to/--steps.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub values: Vec<f64>,

    /// First sweep value (defaults to 80% of the base value).
    #[arg(long)]
    pub from: Option<f64>,

    /// Last sweep value (defaults to 120% of the base value).
    #[arg(long)]
    pub to: Option<f64>,

    /// Number of sweep values.
    #[arg(long, default_value_t = 5)]
    pub steps: usize,

    /// Base g held fixed while sweeping h0.
    #[arg(long, default_value_t = 9.8)]
    pub g: f64,

    /// Base h0 held fixed while sweeping g.
    #[arg(long, default_value_t = 46.0)]
    pub h0: f64,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for plotting a saved calibration.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Calibration JSON produced by `balldrop calibrate --export-json`.
    #[arg(long, value_name = "JSON")]
    pub calibration: PathBuf,

    /// Overlay these observations on the saved curve.
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}
