//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/calibration code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use crate::domain::{CalibrationConfig, CalibrationResult, ConfidenceInterval, ObservationResidual, Param};
use crate::io::ingest::IngestedData;
use crate::report::{Rankings, ResidualStats};

/// Format the run summary (dataset stats + calibration diagnostics).
pub fn format_run_summary(ingest: &IngestedData, result: &CalibrationResult, config: &CalibrationConfig) -> String {
    let mut out = String::new();

    out.push_str("=== balldrop - falling-ball calibration ===\n");
    out.push_str(&format!("Data: {}\n", ingest.source));
    out.push_str(&format!(
        "Points: n={} (read {}, {} row errors) | t=[{:.3}, {:.3}] s | h=[{:.2}, {:.2}] m\n",
        ingest.stats.n_points,
        ingest.rows_read,
        ingest.row_errors.len(),
        ingest.stats.time_min,
        ingest.stats.time_max,
        ingest.stats.height_min,
        ingest.stats.height_max,
    ));
    out.push_str(&format!("Method: {} ({})\n", result.method.display_name(), result.method.key()));

    if let Some(prior) = result.prior.as_ref().filter(|_| result.method.uses_prior()) {
        out.push_str(&format!(
            "Prior: g ~ N({:.4}, {:.4}²) | h0 ~ N({:.4}, {:.4}²) | rho={:.3} | sigma_obs={:.4} m\n",
            prior.mean.g,
            prior.std_dev(Param::G),
            prior.mean.h0,
            prior.std_dev(Param::H0),
            prior.correlation(),
            config.obs_sigma,
        ));
    } else {
        out.push_str(&format!(
            "Initial guess: g={:.4} m/s² | h0={:.4} m\n",
            result.initial.g, result.initial.h0
        ));
    }

    out.push_str("\nCalibration diagnostics:\n");
    out.push_str(&format!(
        "- iterations: {}{}\n",
        result.iterations,
        if result.converged { "" } else { " (did not converge)" }
    ));
    out.push_str(&format!(
        "- SSE={:.6} RMSE={:.6} m sigma_hat={:.6} m\n",
        result.quality.sse, result.quality.rmse, result.quality.sigma_hat
    ));
    if let Some(b) = &result.bootstrap {
        out.push_str(&format!(
            "- bootstrap: {} of {} replicates kept\n",
            b.samples.len(),
            b.requested
        ));
    }

    out.push_str("\nMAP estimate:\n");
    out.push_str(&format!(
        "- g  = {:.6} m/s² (sd {:.6})\n",
        result.map.g,
        result.posterior.std_dev(Param::G)
    ));
    out.push_str(&format!(
        "- h0 = {:.6} m    (sd {:.6})\n",
        result.map.h0,
        result.posterior.std_dev(Param::H0)
    ));
    out.push_str(&format!("- corr(g, h0) = {:.4}\n", result.posterior.correlation()));
    out.push('\n');

    out
}

/// One line per interval, e.g. `g  = 9.8123 m/s²  95% CI [9.6100, 10.0146]`.
pub fn format_intervals(intervals: &[ConfidenceInterval]) -> String {
    let mut out = String::new();
    for ci in intervals {
        out.push_str(&format!(
            "{:<2} = {:.4} {:<4} {}% CI [{:.4}, {:.4}]\n",
            ci.param.label(),
            ci.estimate,
            ci.param.unit(),
            fmt_level(ci.level),
            ci.lower,
            ci.upper,
        ));
    }
    out
}

/// Prior (initial guess) vs posterior (MAP) residual statistics.
pub fn format_residual_stats(prior: Option<&ResidualStats>, posterior: &ResidualStats) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:>5} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
        "residuals", "n", "mean", "std", "rmse", "min", "max"
    ));
    if let Some(p) = prior {
        out.push_str(&stats_row("initial", p));
    }
    out.push_str(&stats_row("calibrated", posterior));
    out
}

fn stats_row(label: &str, s: &ResidualStats) -> String {
    format!(
        "{:<10} {:>5} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}\n",
        label, s.n, s.mean, s.std, s.rmse, s.min, s.max
    )
}

/// Format the above/below tables.
pub fn format_rankings(rankings: &Rankings) -> String {
    let mut out = String::new();

    out.push_str("Largest residuals above the curve:\n");
    out.push_str(&format_residual_table(&rankings.above));
    out.push('\n');

    out.push_str("Largest residuals below the curve:\n");
    out.push_str(&format_residual_table(&rankings.below));

    out
}

pub fn format_residual_table(rows: &[ObservationResidual]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>6} {:>9} {:>10} {:>10} {:>10}\n", "index", "time", "height", "h_fit", "residual"));
    out.push_str(&format!("{:->6} {:->9} {:->10} {:->10} {:->10}\n", "", "", "", "", ""));

    for r in rows {
        let o = &r.observation;
        out.push_str(&format!(
            "{:>6} {:>9.3} {:>10.3} {:>10.3} {:>10.4}\n",
            o.index, o.time, o.height, r.h_fit, r.residual
        ));
    }

    out
}

/// Side-by-side summary of several methods.
pub fn format_comparison(results: &[CalibrationResult], level: f64) -> String {
    let mut out = String::new();
    let ci_header = format!("{}% CI", fmt_level(level));
    out.push_str(&format!(
        "{:<26} {:>10} {:>23} {:>10} {:>23} {:>10} {:>5}\n",
        "method", "g", format!("g {ci_header}"), "h0", format!("h0 {ci_header}"), "RMSE", "iter"
    ));
    out.push_str(&format!(
        "{:-<26} {:->10} {:->23} {:->10} {:->23} {:->10} {:->5}\n",
        "", "", "", "", "", "", ""
    ));

    for r in results {
        let g = r.posterior.marginal_interval(Param::G, level);
        let h = r.posterior.marginal_interval(Param::H0, level);
        let marker = if r.converged { "" } else { "*" };
        out.push_str(&format!(
            "{:<26} {:>10.4} {:>23} {:>10.4} {:>23} {:>10.4} {:>5}\n",
            format!("{}{marker}", r.method.display_name()),
            r.map.g,
            format!("[{:.4}, {:.4}]", g.lower, g.upper),
            r.map.h0,
            format!("[{:.4}, {:.4}]", h.lower, h.upper),
            r.quality.rmse,
            r.iterations,
        ));
    }
    if results.iter().any(|r| !r.converged) {
        out.push_str("* did not converge\n");
    }

    out
}

/// `0.95` -> `95`, `0.975` -> `97.5`.
fn fmt_level(level: f64) -> String {
    let pct = level * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("{}", pct.round() as i64)
    } else {
        format!("{pct:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Theta;
    use crate::math::covariance_from_sigmas;
    use crate::domain::ParameterDistribution;

    #[test]
    fn interval_line_format() {
        let d = ParameterDistribution::new(Theta::new(9.8123, 45.0), covariance_from_sigmas(0.1, 0.5, 0.0));
        let txt = format_intervals(&d.intervals(0.95));
        let first = txt.lines().next().unwrap();
        assert!(first.starts_with("g  = 9.8123 m/s²"), "{first}");
        assert!(first.contains("95% CI [9.6163, 10.0083]"), "{first}");
        assert!(txt.lines().nth(1).unwrap().starts_with("h0 = 45.0000 m"));
    }

    #[test]
    fn summary_shows_prior_only_for_gaussian_methods() {
        let obs: Vec<crate::domain::Observation> = (0..20)
            .map(|i| {
                let t = i as f64 * 0.15;
                let h = crate::models::drop_height(&Theta::new(9.81, 45.0), t) + [0.1, -0.1][i % 2];
                crate::domain::Observation { index: i, time: t, height: h }
            })
            .collect();
        let ingest = IngestedData::from_observations("memory", obs.clone()).unwrap();

        for method in crate::domain::CalibrationMethod::ALL {
            let config = CalibrationConfig { method, ..CalibrationConfig::default() };
            let result = crate::calib::calibrate(&obs, &config).unwrap();
            let txt = format_run_summary(&ingest, &result, &config);
            assert_eq!(txt.contains("Prior: g ~ N("), method.uses_prior(), "{method:?}");
            assert_eq!(txt.contains("Initial guess:"), !method.uses_prior(), "{method:?}");
        }
    }

    #[test]
    fn level_formatting() {
        assert_eq!(fmt_level(0.95), "95");
        assert_eq!(fmt_level(0.975), "97.5");
        assert_eq!(fmt_level(0.5), "50");
    }

    #[test]
    fn residual_table_has_header_and_rows() {
        let rows = vec![ObservationResidual {
            observation: crate::domain::Observation { index: 7, time: 1.5, height: 33.0 },
            h_fit: 33.5,
            residual: -0.5,
        }];
        let txt = format_residual_table(&rows);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("residual"));
        assert!(lines[2].trim_start().starts_with('7'));
        assert!(lines[2].ends_with("-0.5000"));
    }
}
