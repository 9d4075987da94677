//! Read/write calibration JSON files.
//!
//! Calibration JSON is the "portable" representation of a run:
//! - method, MAP and posterior (plus prior for the Gaussian methods)
//! - intervals at the requested level
//! - a precomputed model grid for quick plotting
//!
//! The schema is defined by `domain::CalibrationFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{CalibrationFile, CalibrationResult, CurveGrid, Theta};
use crate::error::AppError;
use crate::io::ingest::IngestedData;
use crate::models::{drop_height, impact_time};

const GRID_POINTS: usize = 101;

/// Assemble the JSON document for a calibration.
pub fn calibration_file(result: &CalibrationResult, ingest: &IngestedData, level: f64) -> CalibrationFile {
    let t_max = grid_end(&result.map, ingest.stats.time_max);
    CalibrationFile {
        tool: "balldrop".to_string(),
        generated_at: Utc::now().to_rfc3339(),
        data_path: ingest.source.clone(),
        level,
        result: result.clone(),
        intervals: result.posterior.intervals(level),
        grid: build_grid(&result.map, t_max, GRID_POINTS),
    }
}

/// Write a calibration JSON file.
pub fn write_calibration_json(
    path: &Path,
    result: &CalibrationResult,
    ingest: &IngestedData,
    level: f64,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create calibration JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, &calibration_file(result, ingest, level))
        .map_err(|e| AppError::input(format!("Failed to write calibration JSON: {e}")))?;

    tracing::info!(path = %path.display(), "wrote calibration JSON");
    Ok(())
}

/// Read a calibration JSON file.
pub fn read_calibration_json(path: &Path) -> Result<CalibrationFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open calibration JSON '{}': {e}", path.display())))?;
    let calibration: CalibrationFile = serde_json::from_reader(file)
        .map_err(|e| AppError::input(format!("Invalid calibration JSON: {e}")))?;
    Ok(calibration)
}

/// Sample the model on `[0, t_max]`.
pub fn build_grid(theta: &Theta, t_max: f64, n: usize) -> CurveGrid {
    let n = n.max(2);
    let t1 = if t_max.is_finite() && t_max > 0.0 { t_max } else { 1.0 };

    let mut time = Vec::with_capacity(n);
    let mut height = Vec::with_capacity(n);
    for i in 0..n {
        let t = t1 * i as f64 / (n as f64 - 1.0);
        time.push(t);
        height.push(drop_height(theta, t));
    }
    CurveGrid { time, height }
}

/// Cover the observed window and the calibrated impact, whichever ends later.
fn grid_end(theta: &Theta, time_max: f64) -> f64 {
    let impact = impact_time(theta).unwrap_or(0.0);
    time_max.max(impact * 1.05)
}
