//! Damped Gauss–Newton (Levenberg–Marquardt) solver.
//!
//! Both least-squares style methods minimize `‖target − prediction(θ)‖²` for
//! some residual system:
//!
//! - plain data misfit (non-linear least squares)
//! - data misfit whitened by the observation error, stacked with prior rows
//!   (Gaussian non-linear calibration)
//!
//! Each iteration solves the augmented system
//!
//! ```text
//! [ J          ]       [ r ]
//! [ sqrt(λ) D  ] δ  =  [ 0 ]
//! ```
//!
//! with the same SVD least-squares routine used everywhere else, where `D` is
//! the Marquardt scaling `sqrt(diag(JᵀJ))`.

use nalgebra::{DMatrix, DVector, Vector2};
use rayon::prelude::*;

use crate::domain::Theta;
use crate::error::AppError;
use crate::math::{gradient, solve_least_squares, stack_rows};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
/// Floor for the Marquardt scaling of columns without information.
const SCALE_FLOOR: f64 = 1e-9;

/// A residual vector `target − prediction(θ)` and its model-side Jacobian
/// `∂prediction/∂θ`.
pub trait ResidualSystem: Sync {
    fn residuals(&self, theta: &Theta) -> DVector<f64>;
    fn jacobian(&self, theta: &Theta) -> DMatrix<f64>;

    fn cost(&self, theta: &Theta) -> f64 {
        self.residuals(theta).norm_squared()
    }
}

/// Solver settings.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    pub max_iter: usize,
    /// Relative tolerance on steps and cost decrease.
    pub tolerance: f64,
    /// Additional starting points around the initial guess.
    pub multistart: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tolerance: 1e-10,
            multistart: 0,
        }
    }
}

/// Outcome of a single solve.
#[derive(Debug, Clone, Copy)]
pub struct SolverOutcome {
    pub theta: Theta,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize the system's cost starting from `start`.
pub fn minimize<S: ResidualSystem>(
    system: &S,
    start: Theta,
    opts: &SolverOptions,
) -> Result<SolverOutcome, AppError> {
    if !start.is_finite() {
        return Err(AppError::input("Initial guess must be finite."));
    }

    let mut theta = start;
    let mut r = system.residuals(&theta);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(AppError::numeric("Non-finite cost at the initial guess."));
    }

    let tol = opts.tolerance.max(f64::EPSILON);
    let mut lambda = LAMBDA_INIT;
    let mut iterations = 0;
    let mut converged = cost == 0.0;

    while !converged && iterations < opts.max_iter {
        iterations += 1;
        let j = system.jacobian(&theta);

        let Some(step) = damped_step(&j, &r, lambda) else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
            continue;
        };

        let candidate = Theta::from_vector(&(theta.to_vector() + step));
        let r_candidate = system.residuals(&candidate);
        let cost_candidate = r_candidate.norm_squared();

        if cost_candidate.is_finite() && cost_candidate < cost {
            let decrease = cost - cost_candidate;
            let small_step = step.norm() <= tol * (theta.to_vector().norm() + tol);

            theta = candidate;
            r = r_candidate;
            cost = cost_candidate;
            lambda = (lambda / 10.0).max(LAMBDA_MIN);

            tracing::trace!(iterations, cost, lambda, g = theta.g, h0 = theta.h0, "step accepted");

            if small_step || decrease <= tol * cost || cost == 0.0 {
                converged = true;
            }
        } else {
            lambda *= 10.0;
            // The step could not improve the cost: either we are sitting on the
            // minimum (gradient vanishes) or the system is degenerate.
            if lambda > LAMBDA_MAX {
                converged = gradient_vanishes(&j, &r, tol, cost);
                break;
            }
        }
    }

    if !converged {
        tracing::warn!(iterations, cost, "least-squares solver stopped before converging");
    }

    Ok(SolverOutcome {
        theta,
        cost,
        iterations,
        converged,
    })
}

/// Run [`minimize`] from the initial guess and `opts.multistart` extra starts,
/// keeping the lowest cost.
///
/// Starts are evaluated in parallel; ties break on start index so the result is
/// deterministic.
pub fn minimize_multistart<S: ResidualSystem>(
    system: &S,
    initial: Theta,
    opts: &SolverOptions,
) -> Result<SolverOutcome, AppError> {
    let starts = multistart_points(initial, opts.multistart);

    let outcomes: Vec<(usize, SolverOutcome)> = starts
        .par_iter()
        .enumerate()
        .filter_map(|(idx, start)| {
            minimize(system, *start, opts)
                .ok()
                .filter(|o| o.cost.is_finite() && o.theta.is_finite())
                .map(|o| (idx, o))
        })
        .collect();

    let Some(first) = outcomes.first() else {
        return Err(AppError::numeric("Least-squares solver failed from every starting point."));
    };

    let mut best = first;
    for candidate in &outcomes[1..] {
        if candidate.1.cost < best.1.cost || (candidate.1.cost == best.1.cost && candidate.0 < best.0) {
            best = candidate;
        }
    }

    if starts.len() > 1 {
        tracing::debug!(
            starts = starts.len(),
            solved = outcomes.len(),
            best_start = best.0,
            cost = best.1.cost,
            "multi-start finished"
        );
    }

    Ok(best.1)
}

/// Deterministic starting points: the initial guess followed by `extra` points
/// scattered over `[0.5, 1.5] ×` each component (additive quasi-random sequence).
pub fn multistart_points(initial: Theta, extra: usize) -> Vec<Theta> {
    const ALPHA_G: f64 = 0.754_877_666_246_692_7;
    const ALPHA_H: f64 = 0.569_840_290_998_053_2;

    let mut out = Vec::with_capacity(extra + 1);
    out.push(initial);
    for k in 1..=extra {
        let u = (0.5 + ALPHA_G * k as f64).fract();
        let v = (0.5 + ALPHA_H * k as f64).fract();
        let g = scale_component(initial.g, u);
        let h0 = scale_component(initial.h0, v);
        out.push(Theta::new(g, h0));
    }
    out
}

fn scale_component(value: f64, u: f64) -> f64 {
    if value == 0.0 {
        // Nothing to scale; spread around zero instead.
        u - 0.5
    } else {
        value * (0.5 + u)
    }
}

fn damped_step(j: &DMatrix<f64>, r: &DVector<f64>, lambda: f64) -> Option<Vector2<f64>> {
    let p = j.ncols();
    let mut damping = DMatrix::<f64>::zeros(p, p);
    for c in 0..p {
        let scale = j.column(c).norm().max(SCALE_FLOOR);
        damping[(c, c)] = lambda.sqrt() * scale;
    }
    let (a, b) = stack_rows(j, r, &damping, &DVector::zeros(p));
    let step = solve_least_squares(&a, &b)?;
    Some(Vector2::new(step[0], step[1]))
}

fn gradient_vanishes(j: &DMatrix<f64>, r: &DVector<f64>, tol: f64, cost: f64) -> bool {
    let grad = gradient(j, r);
    grad.amax() <= tol.sqrt() * (1.0 + cost.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straight line `a + b x` fitted to points (linear, one step away).
    struct Line {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl ResidualSystem for Line {
        fn residuals(&self, theta: &Theta) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x.iter().zip(&self.y).map(|(x, y)| y - (theta.g + theta.h0 * x)),
            )
        }

        fn jacobian(&self, _theta: &Theta) -> DMatrix<f64> {
            DMatrix::from_fn(self.x.len(), 2, |i, c| if c == 0 { 1.0 } else { self.x[i] })
        }
    }

    /// Exponential decay `a exp(-b x)`.
    struct Decay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl ResidualSystem for Decay {
        fn residuals(&self, theta: &Theta) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x
                    .iter()
                    .zip(&self.y)
                    .map(|(x, y)| y - theta.g * (-theta.h0 * x).exp()),
            )
        }

        fn jacobian(&self, theta: &Theta) -> DMatrix<f64> {
            DMatrix::from_fn(self.x.len(), 2, |i, c| {
                let e = (-theta.h0 * self.x[i]).exp();
                if c == 0 { e } else { -theta.g * self.x[i] * e }
            })
        }
    }

    #[test]
    fn minimize_fits_line_exactly() {
        let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 2.0 + 3.0 * x).collect();
        let out = minimize(&Line { x, y }, Theta::new(0.0, 0.0), &SolverOptions::default()).unwrap();
        assert!(out.converged);
        assert!((out.theta.g - 2.0).abs() < 1e-8);
        assert!((out.theta.h0 - 3.0).abs() < 1e-8);
    }

    #[test]
    fn minimize_fits_nonlinear_decay() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|x| 5.0 * (-0.7 * x).exp()).collect();
        let out = minimize(&Decay { x, y }, Theta::new(1.0, 0.2), &SolverOptions::default()).unwrap();
        assert!((out.theta.g - 5.0).abs() < 1e-6, "{:?}", out);
        assert!((out.theta.h0 - 0.7).abs() < 1e-6, "{:?}", out);
        assert!(out.cost < 1e-12);
    }

    #[test]
    fn minimize_rejects_non_finite_start() {
        let sys = Line { x: vec![0.0, 1.0], y: vec![0.0, 1.0] };
        assert!(minimize(&sys, Theta::new(f64::NAN, 0.0), &SolverOptions::default()).is_err());
    }

    #[test]
    fn multistart_points_are_deterministic() {
        let a = multistart_points(Theta::new(9.8, 46.0), 4);
        let b = multistart_points(Theta::new(9.8, 46.0), 4);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_eq!(a[0], Theta::new(9.8, 46.0));
        for t in &a[1..] {
            assert!(t.g >= 4.9 && t.g <= 14.7);
            assert!(t.h0 >= 23.0 && t.h0 <= 69.0);
        }
    }

    #[test]
    fn multistart_picks_lowest_cost() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|x| 5.0 * (-0.7 * x).exp()).collect();
        let opts = SolverOptions { multistart: 6, ..SolverOptions::default() };
        let out = minimize_multistart(&Decay { x, y }, Theta::new(1.0, 0.2), &opts).unwrap();
        assert!(out.cost < 1e-12);
    }
}
