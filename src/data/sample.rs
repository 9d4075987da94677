//! Synthetic ball-drop observations from known parameters.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Observation, Theta};
use crate::error::AppError;
use crate::models::drop_height;

/// What to simulate.
#[derive(Debug, Clone, Copy)]
pub struct SampleSpec {
    /// True parameters θ*.
    pub theta: Theta,
    pub count: usize,
    /// Observation times are `i · t_max / (count − 1)`.
    pub t_max: f64,
    /// Standard deviation of the additive Gaussian noise (m).
    pub noise_sd: f64,
    pub seed: u64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            theta: Theta::new(9.81, 45.0),
            count: 40,
            t_max: 3.12,
            noise_sd: 0.4,
            seed: 42,
        }
    }
}

/// Noisy observations on a uniform time grid.
///
/// Heights are clamped at zero after adding noise, like a sensor that cannot
/// read below ground.
pub fn generate_observations(spec: &SampleSpec) -> Result<Vec<Observation>, AppError> {
    if spec.count < 2 {
        return Err(AppError::input("Sample count must be >= 2."));
    }
    if !(spec.t_max.is_finite() && spec.t_max > 0.0) {
        return Err(AppError::input("Simulated time span must be > 0."));
    }
    if !spec.theta.is_finite() {
        return Err(AppError::input("Simulation parameters must be finite."));
    }
    if !(spec.noise_sd.is_finite() && spec.noise_sd >= 0.0) {
        return Err(AppError::input("Noise standard deviation must be >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, spec.noise_sd)
        .map_err(|e| AppError::input(format!("Noise distribution error: {e}")))?;

    let dt = spec.t_max / (spec.count - 1) as f64;
    let observations = (0..spec.count)
        .map(|i| {
            let time = i as f64 * dt;
            let noise = normal.sample(&mut rng);
            Observation {
                index: i,
                time,
                height: (drop_height(&spec.theta, time) + noise).max(0.0),
            }
        })
        .collect();

    tracing::info!(
        count = spec.count,
        g = spec.theta.g,
        h0 = spec.theta.h0,
        noise_sd = spec.noise_sd,
        seed = spec.seed,
        "generated synthetic observations"
    );

    Ok(observations)
}

/// Write observations in the `,time,height` layout the loader reads.
pub fn write_observations_csv(path: &Path, observations: &[Observation]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", parent.display())))?;
    }
    let mut file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create CSV '{}': {e}", path.display())))?;

    writeln!(file, ",time,height").map_err(|e| AppError::input(format!("Failed to write CSV header: {e}")))?;
    for o in observations {
        writeln!(file, "{},{},{}", o.index, o.time, o.height)
            .map_err(|e| AppError::input(format!("Failed to write CSV row: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::load_observations;

    #[test]
    fn same_seed_same_sample() {
        let spec = SampleSpec::default();
        assert_eq!(generate_observations(&spec).unwrap(), generate_observations(&spec).unwrap());
        let other = SampleSpec { seed: 43, ..spec };
        assert_ne!(generate_observations(&spec).unwrap(), generate_observations(&other).unwrap());
    }

    #[test]
    fn heights_are_clamped_and_times_uniform() {
        let spec = SampleSpec { t_max: 5.0, noise_sd: 1.0, ..SampleSpec::default() };
        let obs = generate_observations(&spec).unwrap();
        assert_eq!(obs.len(), 40);
        assert!(obs.iter().all(|o| o.height >= 0.0));
        assert_eq!(obs[0].time, 0.0);
        assert!((obs[39].time - 5.0).abs() < 1e-12);
    }

    #[test]
    fn noiseless_sample_matches_model() {
        let spec = SampleSpec { noise_sd: 0.0, ..SampleSpec::default() };
        for o in generate_observations(&spec).unwrap() {
            assert_eq!(o.height, drop_height(&spec.theta, o.time));
        }
    }

    #[test]
    fn csv_round_trip_through_loader() {
        let obs = generate_observations(&SampleSpec::default()).unwrap();
        let path = std::env::temp_dir().join(format!("balldrop-sample-{}.csv", std::process::id()));
        write_observations_csv(&path, &obs).unwrap();
        let back = load_observations(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back.observations, obs);
    }

    #[test]
    fn rejects_bad_specs() {
        let bad = [
            SampleSpec { count: 1, ..SampleSpec::default() },
            SampleSpec { t_max: 0.0, ..SampleSpec::default() },
            SampleSpec { noise_sd: -1.0, ..SampleSpec::default() },
            SampleSpec { noise_sd: f64::NAN, ..SampleSpec::default() },
        ];
        for spec in bad {
            assert_eq!(generate_observations(&spec).unwrap_err().exit_code(), 2);
        }
    }
}
