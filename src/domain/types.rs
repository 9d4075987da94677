//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during calibration
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::path::PathBuf;

use clap::ValueEnum;
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Number of calibrated parameters (`g`, `h0`).
pub const PARAM_COUNT: usize = 2;

/// A single measured height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row index as given in the input file (or the row position when absent).
    pub index: usize,
    /// Seconds since release.
    pub time: f64,
    /// Measured height in metres.
    pub height: f64,
}

/// The calibration unknowns θ = (g, h0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Theta {
    /// Gravitational acceleration (m/s²).
    pub g: f64,
    /// Initial drop height (m).
    pub h0: f64,
}

impl Theta {
    pub fn new(g: f64, h0: f64) -> Self {
        Self { g, h0 }
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.g, self.h0)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self { g: v[0], h0: v[1] }
    }

    pub fn get(self, param: Param) -> f64 {
        match param {
            Param::G => self.g,
            Param::H0 => self.h0,
        }
    }

    pub fn with(mut self, param: Param, value: f64) -> Self {
        match param {
            Param::G => self.g = value,
            Param::H0 => self.h0 = value,
        }
        self
    }

    pub fn is_finite(self) -> bool {
        self.g.is_finite() && self.h0.is_finite()
    }
}

/// Parameter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    G,
    H0,
}

impl Param {
    pub const ALL: [Param; PARAM_COUNT] = [Param::G, Param::H0];

    /// Position in the parameter vector.
    pub fn index(self) -> usize {
        match self {
            Param::G => 0,
            Param::H0 => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Param::G => "g",
            Param::H0 => "h0",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Param::G => "m/s²",
            Param::H0 => "m",
        }
    }
}

/// Calibration algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum CalibrationMethod {
    /// Levenberg–Marquardt on the raw sum of squared residuals.
    #[value(name = "nlls")]
    #[serde(rename = "nlls")]
    NonLinearLeastSquares,
    /// One least-squares step on the model linearized at the initial guess.
    #[value(name = "lls")]
    #[serde(rename = "lls")]
    LinearLeastSquares,
    /// Closed-form Gaussian update of the model linearized at the prior mean.
    #[value(name = "gaussian-linear")]
    #[serde(rename = "gaussian-linear")]
    GaussianLinear,
    /// Prior-penalized Levenberg–Marquardt (MAP of the non-linear model).
    #[value(name = "gaussian-nonlinear")]
    #[serde(rename = "gaussian-nonlinear")]
    GaussianNonLinear,
}

impl CalibrationMethod {
    pub const ALL: [CalibrationMethod; 4] = [
        CalibrationMethod::NonLinearLeastSquares,
        CalibrationMethod::LinearLeastSquares,
        CalibrationMethod::GaussianLinear,
        CalibrationMethod::GaussianNonLinear,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            CalibrationMethod::NonLinearLeastSquares => "Non-linear least squares",
            CalibrationMethod::LinearLeastSquares => "Linear least squares",
            CalibrationMethod::GaussianLinear => "Gaussian linear",
            CalibrationMethod::GaussianNonLinear => "Gaussian non-linear",
        }
    }

    /// Short name used on the command line and in exported files.
    pub fn key(self) -> &'static str {
        match self {
            CalibrationMethod::NonLinearLeastSquares => "nlls",
            CalibrationMethod::LinearLeastSquares => "lls",
            CalibrationMethod::GaussianLinear => "gaussian-linear",
            CalibrationMethod::GaussianNonLinear => "gaussian-nonlinear",
        }
    }

    /// Whether the method combines the data with a Gaussian prior.
    pub fn uses_prior(self) -> bool {
        matches!(
            self,
            CalibrationMethod::GaussianLinear | CalibrationMethod::GaussianNonLinear
        )
    }

    pub fn next(self) -> Self {
        match self {
            CalibrationMethod::NonLinearLeastSquares => CalibrationMethod::LinearLeastSquares,
            CalibrationMethod::LinearLeastSquares => CalibrationMethod::GaussianLinear,
            CalibrationMethod::GaussianLinear => CalibrationMethod::GaussianNonLinear,
            CalibrationMethod::GaussianNonLinear => CalibrationMethod::NonLinearLeastSquares,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            CalibrationMethod::NonLinearLeastSquares => CalibrationMethod::GaussianNonLinear,
            CalibrationMethod::LinearLeastSquares => CalibrationMethod::NonLinearLeastSquares,
            CalibrationMethod::GaussianLinear => CalibrationMethod::LinearLeastSquares,
            CalibrationMethod::GaussianNonLinear => CalibrationMethod::GaussianLinear,
        }
    }
}

/// Bivariate normal distribution over θ.
///
/// Used both for the Gaussian prior and for every posterior produced by the
/// calibration methods. Statistics (intervals, densities) live in
/// `calib::posterior`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterDistribution {
    pub mean: Theta,
    /// Row-major 2×2 covariance, ordered `(g, h0)`.
    pub covariance: [[f64; 2]; 2],
}

impl ParameterDistribution {
    pub fn new(mean: Theta, covariance: Matrix2<f64>) -> Self {
        Self {
            mean,
            covariance: [
                [covariance[(0, 0)], covariance[(0, 1)]],
                [covariance[(1, 0)], covariance[(1, 1)]],
            ],
        }
    }

    pub fn covariance_matrix(&self) -> Matrix2<f64> {
        Matrix2::new(
            self.covariance[0][0],
            self.covariance[0][1],
            self.covariance[1][0],
            self.covariance[1][1],
        )
    }
}

/// Bilateral interval for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub param: Param,
    /// Probability content, e.g. `0.95`.
    pub level: f64,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Fit quality diagnostics at the calibrated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// Sum of squared residuals.
    pub sse: f64,
    pub rmse: f64,
    /// Residual standard deviation `sqrt(SSE / (n - 2))`.
    pub sigma_hat: f64,
    pub n: usize,
}

/// Bootstrap replicates used to estimate the posterior covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub requested: usize,
    /// Parameter estimates of the replicates that converged to finite values.
    pub samples: Vec<Theta>,
}

/// Everything a single calibration produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub method: CalibrationMethod,
    /// Starting point (NLLS/LLS) or prior mean (Gaussian methods).
    pub initial: Theta,
    /// Point estimate (MAP).
    pub map: Theta,
    pub posterior: ParameterDistribution,
    /// Present for the Gaussian methods.
    pub prior: Option<ParameterDistribution>,
    pub quality: FitQuality,
    pub iterations: usize,
    pub converged: bool,
    pub bootstrap: Option<BootstrapSummary>,
}

/// A per-observation fitted value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationResidual {
    pub observation: Observation,
    pub h_fit: f64,
    /// Observed minus predicted.
    pub residual: f64,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub data_path: PathBuf,
    pub method: CalibrationMethod,

    /// Initial guess; also the prior mean for the Gaussian methods.
    pub initial: Theta,
    /// Prior standard deviations for `g` and `h0`.
    pub prior_sigma: Theta,
    /// Prior correlation between `g` and `h0`.
    pub prior_correlation: f64,
    /// Observation error standard deviation (m).
    pub obs_sigma: f64,

    /// Probability level of the reported intervals.
    pub level: f64,

    pub max_iter: usize,
    pub tolerance: f64,
    /// Extra starting points for the least-squares solver (0 disables).
    pub multistart: usize,
    /// Bootstrap replicates for the NLLS posterior (0 uses the linearization).
    pub bootstrap: usize,
    pub seed: u64,

    /// Resolution of the density grids.
    pub grid_steps: usize,
    pub top_n: usize,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_residuals: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
    pub debug_bundle: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            method: CalibrationMethod::NonLinearLeastSquares,
            initial: Theta::new(9.8, 46.0),
            prior_sigma: Theta::new(1.0, 5.0),
            prior_correlation: 0.0,
            obs_sigma: 0.5,
            level: 0.95,
            max_iter: 200,
            tolerance: 1e-10,
            multistart: 0,
            bootstrap: 0,
            seed: 42,
            grid_steps: 41,
            top_n: 5,
            plot: true,
            plot_width: 72,
            plot_height: 20,
            export_residuals: None,
            export_json: None,
            debug_bundle: false,
        }
    }
}

/// Fallback data file when neither `--data` nor `BALLDROP_DATA` is given.
pub const DEFAULT_DATA_PATH: &str = "data/ball_drops.csv";

/// A saved calibration (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub tool: String,
    pub generated_at: String,
    pub data_path: String,
    pub level: f64,
    pub result: CalibrationResult,
    pub intervals: Vec<ConfidenceInterval>,
    pub grid: CurveGrid,
}

/// Calibrated model sampled on a time grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveGrid {
    pub time: Vec<f64>,
    pub height: Vec<f64>,
}
