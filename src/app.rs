//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads observations and runs the calibration methods
//! - prints reports/plots
//! - writes optional exports

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{CalibrateArgs, Command, ExploreArgs, PlotArgs, SimulateArgs};
use crate::domain::{CalibrationConfig, DEFAULT_DATA_PATH, Param, Theta};
use crate::error::AppError;
use crate::plot::CurveOverlay;

pub mod pipeline;

/// Environment variable naming the default observation CSV.
pub const DATA_ENV: &str = "BALLDROP_DATA";

/// Entry point for the `balldrop` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    // `balldrop` and `balldrop --method lls` behave like `balldrop tui ...`.
    // Clap requires a subcommand name, so argv is rewritten before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    let default_log = if matches!(cli.command, Command::Tui(_)) { "off" } else { "warn" };
    crate::logging::init(default_log);

    match cli.command {
        Command::Calibrate(args) => handle_calibrate(args),
        Command::Compare(args) => handle_compare(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Explore(args) => handle_explore(args),
        Command::Plot(args) => handle_plot(args),
        Command::Tui(args) => crate::tui::run(config_from_args(&args)),
    }
}

fn handle_calibrate(args: CalibrateArgs) -> Result<(), AppError> {
    let config = config_from_args(&args);
    let run = pipeline::run_calibration(&config)?;

    println!("{}", crate::report::format_run_summary(&run.ingest, &run.result, &config));
    println!("{}", crate::report::format_intervals(&run.intervals));
    println!("{}", crate::report::format_residual_stats(run.prior_stats.as_ref(), &run.stats));
    println!("{}", crate::report::format_rankings(&run.rankings));

    if config.plot {
        print_plots(&run, &config);
    }

    if let Some(path) = &config.export_residuals {
        crate::io::export::write_residuals_csv(path, &run.residuals, &run.result)?;
        println!("Wrote residuals: {}", path.display());
    }
    if let Some(path) = &config.export_json {
        crate::io::calibration::write_calibration_json(path, &run.result, &run.ingest, config.level)?;
        println!("Wrote calibration: {}", path.display());
    }
    if config.debug_bundle {
        let path = crate::debug::write_debug_bundle(&run.ingest, &config)?;
        println!("Wrote debug bundle: {}", path.display());
    }

    Ok(())
}

fn print_plots(run: &pipeline::RunOutput, config: &CalibrationConfig) {
    let (w, h) = (config.plot_width, config.plot_height);
    let curves = [
        CurveOverlay { theta: run.result.initial, symbol: '.' },
        CurveOverlay { theta: run.result.map, symbol: '-' },
    ];

    println!("{}", crate::plot::render_model_vs_data(&run.ingest.observations, &curves, w, h));
    println!("  . initial guess   - calibrated   o observed\n");
    println!("{}", crate::plot::render_observed_vs_predicted(&run.residuals, w, h));
    println!("{}", crate::plot::render_residuals_vs_time(&run.residuals, w, h));
    println!("{}", crate::plot::render_normal_probability(&run.residuals, w, h));

    let prior = run.result.prior.as_ref();
    for param in Param::ALL {
        println!("{}", crate::plot::render_marginal(param, prior, &run.result.posterior, w, h));
    }

    let grid = run.result.posterior.density_grid(config.grid_steps, 3.0);
    println!("{}", crate::plot::render_joint_density(&grid, w, h));
}

fn handle_compare(args: CalibrateArgs) -> Result<(), AppError> {
    let config = config_from_args(&args);
    let ingest = crate::io::ingest::load_observations(&config.data_path)?;
    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (method, outcome) in crate::calib::calibrate_all(&ingest.observations, &config) {
        match outcome {
            Ok(result) => results.push(result),
            Err(err) => {
                tracing::warn!(method = method.key(), code = err.exit_code(), "{}", err.message());
                failures.push((method, err));
            }
        }
    }
    if results.is_empty() {
        if let Some((_, err)) = failures.into_iter().next() {
            return Err(err);
        }
        return Ok(());
    }

    println!("Data: {} (n={})\n", ingest.source, ingest.stats.n_points);
    println!("{}", crate::report::format_comparison(&results, config.level));
    for (method, err) in &failures {
        println!("{} failed: {err}", method.display_name());
    }

    if config.plot {
        let curves: Vec<CurveOverlay> = results
            .iter()
            .zip(['1', '2', '3', '4'])
            .map(|(r, symbol)| CurveOverlay { theta: r.map, symbol })
            .collect();
        println!(
            "{}",
            crate::plot::render_model_vs_data(&ingest.observations, &curves, config.plot_width, config.plot_height)
        );
        for (r, symbol) in results.iter().zip(['1', '2', '3', '4']) {
            println!("  {symbol} : {}", r.method.display_name());
        }
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spec = crate::data::SampleSpec {
        theta: Theta::new(args.g, args.h0),
        count: args.count,
        t_max: args.t_max,
        noise_sd: args.noise,
        seed: args.seed,
    };
    let observations = crate::data::generate_observations(&spec)?;
    crate::data::write_observations_csv(&args.output, &observations)?;
    println!("Wrote {} observations: {}", observations.len(), args.output.display());
    Ok(())
}

fn handle_explore(args: ExploreArgs) -> Result<(), AppError> {
    let ingest = crate::io::ingest::load_observations(&resolve_data_path(args.data.clone()))?;
    let base = Theta::new(args.g, args.h0);
    let values = sweep_values(&args, base)?;

    println!(
        "{}",
        crate::plot::render_model_family(&ingest.observations, base, args.param, &values, args.width, args.height)
    );
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let calibration = crate::io::calibration::read_calibration_json(&args.calibration)?;
    let observations = match &args.data {
        Some(path) => crate::io::ingest::load_observations(path)?.observations,
        None => Vec::new(),
    };

    let plot = crate::plot::render_calibration_file(&calibration, &observations, args.width, args.height);
    println!("{plot}");
    println!("{}", crate::report::format_intervals(&calibration.intervals));
    Ok(())
}

pub fn config_from_args(args: &CalibrateArgs) -> CalibrationConfig {
    CalibrationConfig {
        data_path: resolve_data_path(args.data.clone()),
        method: args.method,
        initial: Theta::new(args.g, args.h0),
        prior_sigma: Theta::new(args.prior_sd_g, args.prior_sd_h0),
        prior_correlation: args.prior_corr,
        obs_sigma: args.sigma,
        level: args.level,
        max_iter: args.max_iter,
        tolerance: args.tol,
        multistart: args.multistart,
        bootstrap: args.bootstrap,
        seed: args.seed,
        grid_steps: args.grid_steps,
        top_n: args.top,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_residuals: args.export_residuals.clone(),
        export_json: args.export_json.clone(),
        debug_bundle: args.debug_bundle,
    }
}

/// `--data`, else `$BALLDROP_DATA`, else the bundled data set.
fn resolve_data_path(arg: Option<PathBuf>) -> PathBuf {
    arg.or_else(|| std::env::var_os(DATA_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH))
}

/// Values to sweep for `explore`: explicit `--values`, else an even range.
fn sweep_values(args: &ExploreArgs, base: Theta) -> Result<Vec<f64>, AppError> {
    let values = if !args.values.is_empty() {
        args.values.clone()
    } else {
        if args.steps < 2 {
            return Err(AppError::input("Sweep needs at least 2 steps."));
        }
        let center = base.get(args.param);
        let from = args.from.unwrap_or(0.8 * center);
        let to = args.to.unwrap_or(1.2 * center);
        let last = (args.steps - 1) as f64;
        (0..args.steps).map(|i| from + (to - from) * i as f64 / last).collect()
    };

    if values.iter().any(|v| !v.is_finite()) {
        return Err(AppError::input("Sweep values must be finite."));
    }
    Ok(values)
}

/// Rewrite argv so `balldrop` defaults to `balldrop tui`.
///
/// Rules:
/// - `balldrop`                      -> `balldrop tui`
/// - `balldrop -m lls ...`           -> `balldrop tui -m lls ...`
/// - `balldrop --help/--version/-h`  -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    // Flags go to the TUI; subcommands and anything else pass through.
    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
    }
    argv
}
