//! Debug bundle writer for inspecting inputs and all calibration methods.

use std::fmt::Write as _;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::calib::{calibrate_with, prior_from_config};
use crate::domain::{CalibrationConfig, CalibrationMethod, Param};
use crate::error::AppError;
use crate::io::ingest::IngestedData;
use crate::report::{compute_residuals, residual_stats};

/// Write a Markdown bundle under `debug/`.
pub fn write_debug_bundle(ingest: &IngestedData, config: &CalibrationConfig) -> Result<PathBuf, AppError> {
    write_debug_bundle_in(Path::new("debug"), ingest, config)
}

/// Write a Markdown bundle under `dir` and return its path.
pub fn write_debug_bundle_in(
    dir: &Path,
    ingest: &IngestedData,
    config: &CalibrationConfig,
) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::input(format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("balldrop_debug_{}_seed{}_{ts}.md", config.method.key(), config.seed));

    let body = render_bundle(ingest, config);
    std::fs::write(&path, body).map_err(|e| AppError::input(format!("Failed to write debug file: {e}")))?;

    tracing::info!(path = %path.display(), "wrote debug bundle");
    Ok(path)
}

fn render_bundle(ingest: &IngestedData, config: &CalibrationConfig) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_header(&mut out, ingest, config);
    let _ = write_methods(&mut out, ingest, config);
    let _ = write_residuals(&mut out, ingest, config);
    out
}

fn write_header(out: &mut String, ingest: &IngestedData, config: &CalibrationConfig) -> std::fmt::Result {
    let prior = prior_from_config(config);

    writeln!(out, "# balldrop debug bundle")?;
    writeln!(out, "- generated: {}", Local::now().to_rfc3339())?;
    writeln!(out, "- data: {}", ingest.source)?;
    writeln!(
        out,
        "- rows: read={} used={} errors={}",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len()
    )?;
    writeln!(
        out,
        "- ranges: t=[{:.4}, {:.4}] s, h=[{:.4}, {:.4}] m",
        ingest.stats.time_min, ingest.stats.time_max, ingest.stats.height_min, ingest.stats.height_max
    )?;
    writeln!(out, "- method: {}", config.method.key())?;
    writeln!(out, "- initial: g={:.4}, h0={:.4}", config.initial.g, config.initial.h0)?;
    writeln!(
        out,
        "- prior: sd_g={:.4}, sd_h0={:.4}, rho={:.3}; sigma_obs={:.4}",
        prior.std_dev(Param::G),
        prior.std_dev(Param::H0),
        prior.correlation(),
        config.obs_sigma
    )?;
    writeln!(
        out,
        "- solver: max_iter={}, tol={:e}, multistart={}, bootstrap={}, seed={}",
        config.max_iter, config.tolerance, config.multistart, config.bootstrap, config.seed
    )?;
    writeln!(out, "- level: {}", config.level)?;

    for err in &ingest.row_errors {
        writeln!(out, "- row error (line {}): {}", err.line, err.message)?;
    }
    Ok(())
}

fn write_methods(out: &mut String, ingest: &IngestedData, config: &CalibrationConfig) -> std::fmt::Result {
    writeln!(out, "\n## Methods")?;
    writeln!(out, "| method | g | sd_g | h0 | sd_h0 | corr | sse | iter | converged |")?;
    writeln!(out, "| - | - | - | - | - | - | - | - | - |")?;

    for method in CalibrationMethod::ALL {
        match calibrate_with(&ingest.observations, config, method) {
            Ok(r) => writeln!(
                out,
                "| {} | {:.6} | {:.6} | {:.6} | {:.6} | {:.4} | {:.6} | {} | {} |",
                method.key(),
                r.map.g,
                r.posterior.std_dev(Param::G),
                r.map.h0,
                r.posterior.std_dev(Param::H0),
                r.posterior.correlation(),
                r.quality.sse,
                r.iterations,
                r.converged
            )?,
            Err(e) => writeln!(out, "| {} | error: {} | | | | | | | |", method.key(), e.message())?,
        }
    }
    Ok(())
}

fn write_residuals(out: &mut String, ingest: &IngestedData, config: &CalibrationConfig) -> std::fmt::Result {
    writeln!(out, "\n## Residuals ({})", config.method.key())?;
    let result = match calibrate_with(&ingest.observations, config, config.method) {
        Ok(r) => r,
        Err(e) => return writeln!(out, "calibration failed: {}", e.message()),
    };
    let residuals = match compute_residuals(&ingest.observations, &result.map) {
        Ok(r) => r,
        Err(e) => return writeln!(out, "residuals failed: {}", e.message()),
    };

    if let Some(s) = residual_stats(&residuals) {
        writeln!(
            out,
            "mean={:.6} std={:.6} rmse={:.6} min={:.6} max={:.6}\n",
            s.mean, s.std, s.rmse, s.min, s.max
        )?;
    }

    writeln!(out, "| index | time | height | h_fit | residual |")?;
    writeln!(out, "| - | - | - | - | - |")?;
    for r in &residuals {
        writeln!(
            out,
            "| {} | {:.4} | {:.4} | {:.4} | {:.4} |",
            r.observation.index, r.observation.time, r.observation.height, r.h_fit, r.residual
        )?;
    }
    Ok(())
}
