//! Shared calibration pipeline used by both CLI and TUI front-ends.
//!
//! load CSV -> calibrate -> intervals -> residuals -> stats -> rankings
//!
//! The CLI and the TUI then only deal with presentation.

use crate::calib::calibrate;
use crate::domain::{CalibrationConfig, CalibrationResult, ConfidenceInterval, ObservationResidual};
use crate::error::AppError;
use crate::io::ingest::{IngestedData, load_observations};
use crate::report::{Rankings, ResidualStats, compute_residuals, rank_largest_residuals, residual_stats};

/// All computed outputs of a single calibration run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub result: CalibrationResult,
    pub intervals: Vec<ConfidenceInterval>,
    /// Residuals at the calibrated parameters.
    pub residuals: Vec<ObservationResidual>,
    /// Residuals at the initial guess.
    pub prior_residuals: Vec<ObservationResidual>,
    pub stats: ResidualStats,
    pub prior_stats: Option<ResidualStats>,
    pub rankings: Rankings,
}

/// Load `config.data_path` and run the pipeline.
pub fn run_calibration(config: &CalibrationConfig) -> Result<RunOutput, AppError> {
    let ingest = load_observations(&config.data_path)?;
    run_with_data(ingest, config)
}

/// Run the pipeline on already-loaded data.
///
/// The TUI uses this to recalibrate without re-reading the file.
pub fn run_with_data(ingest: IngestedData, config: &CalibrationConfig) -> Result<RunOutput, AppError> {
    let result = calibrate(&ingest.observations, config)?;
    let intervals = result.posterior.intervals(config.level);

    let residuals = compute_residuals(&ingest.observations, &result.map)?;
    let prior_residuals = compute_residuals(&ingest.observations, &result.initial)?;

    let stats = residual_stats(&residuals).ok_or_else(|| AppError::data("No residuals to summarize."))?;
    let prior_stats = residual_stats(&prior_residuals);
    let rankings = rank_largest_residuals(&residuals, config.top_n);

    Ok(RunOutput {
        ingest,
        result,
        intervals,
        residuals,
        prior_residuals,
        stats,
        prior_stats,
        rankings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleSpec, generate_observations, write_observations_csv};
    use crate::domain::CalibrationMethod;

    #[test]
    fn end_to_end_from_csv() {
        let spec = SampleSpec { noise_sd: 0.2, ..SampleSpec::default() };
        let obs = generate_observations(&spec).unwrap();
        let path = std::env::temp_dir().join(format!("balldrop-pipeline-{}.csv", std::process::id()));
        write_observations_csv(&path, &obs).unwrap();

        let config = CalibrationConfig { data_path: path.clone(), top_n: 3, ..CalibrationConfig::default() };
        let run = run_calibration(&config).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(run.ingest.observations.len(), spec.count);
        assert_eq!(run.residuals.len(), spec.count);
        assert!((run.result.map.g - 9.81).abs() < 0.5, "g={}", run.result.map.g);
        assert!((run.result.map.h0 - 45.0).abs() < 0.5, "h0={}", run.result.map.h0);
        assert_eq!(run.intervals.len(), 2);
        assert!(run.intervals.iter().all(|ci| ci.lower <= ci.estimate && ci.estimate <= ci.upper));
        assert!(run.rankings.above.len() <= 3 && run.rankings.below.len() <= 3);

        // The calibrated curve fits at least as well as the initial guess.
        let prior = run.prior_stats.unwrap();
        assert!(run.stats.rmse <= prior.rmse + 1e-12);
    }

    #[test]
    fn every_method_runs_on_loaded_data() {
        let obs = generate_observations(&SampleSpec::default()).unwrap();
        let ingest = IngestedData::from_observations("memory", obs).unwrap();
        for method in CalibrationMethod::ALL {
            let config = CalibrationConfig { method, ..CalibrationConfig::default() };
            let run = run_with_data(ingest.clone(), &config).unwrap();
            assert_eq!(run.result.method, method);
        }
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let config = CalibrationConfig {
            data_path: "definitely/not/here.csv".into(),
            ..CalibrationConfig::default()
        };
        assert_eq!(run_calibration(&config).unwrap_err().exit_code(), 2);
    }
}
