//! Export per-observation results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{CalibrationResult, ObservationResidual};
use crate::error::AppError;

/// Write per-observation results to a CSV file.
pub fn write_residuals_csv(
    path: &Path,
    residuals: &[ObservationResidual],
    result: &CalibrationResult,
) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(file, "index,time,height,h_fit,residual,method,g,h0")
        .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;

    let method = result.method.key();

    for r in residuals {
        let o = &r.observation;
        writeln!(
            file,
            "{},{:.6},{:.6},{:.6},{:.6},{},{:.10},{:.10}",
            o.index, o.time, o.height, r.h_fit, r.residual, method, result.map.g, result.map.h0,
        )
        .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }

    tracing::info!(path = %path.display(), rows = residuals.len(), "wrote residuals CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calib::calibrate;
    use crate::domain::{CalibrationConfig, Observation, Theta};
    use crate::models::drop_height;
    use crate::report::compute_residuals;

    #[test]
    fn writes_one_row_per_observation() {
        let truth = Theta::new(9.81, 45.0);
        let obs: Vec<Observation> = (0..10)
            .map(|i| {
                let t = i as f64 * 0.3;
                Observation { index: i, time: t, height: drop_height(&truth, t) + if i % 2 == 0 { 0.1 } else { -0.1 } }
            })
            .collect();
        let result = calibrate(&obs, &CalibrationConfig::default()).unwrap();
        let residuals = compute_residuals(&obs, &result.map).unwrap();

        let path = std::env::temp_dir().join(format!("balldrop-export-{}.csv", std::process::id()));
        write_residuals_csv(&path, &residuals, &result).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 11);
        assert!(lines[0].starts_with("index,time,height"));
        assert!(lines[1].starts_with("0,0.000000,"));
        assert!(lines[1].contains(",nlls,"));
    }
}
