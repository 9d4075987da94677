//! Least squares solver.
//!
//! Every calibration method ends up solving a small, tall system
//!
//! ```text
//! minimize ‖A x − b‖²
//! ```
//!
//! where `A` has one row per observation (plus, for the Bayesian methods, two
//! prior rows) and one column per parameter.
//!
//! Implementation choices:
//! - We use SVD to solve the least-squares problem robustly even when
//!   the design matrix is tall (more rows than columns).
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Clamped observations contribute all-zero Jacobian rows, so rank
//!   deficiency is expected near ground impact; SVD truncates those directions.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.nrows() != b.len() || a.ncols() == 0 {
        return None;
    }
    let svd = a.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Stack two systems vertically: `[a_top; a_bottom]`, `[b_top; b_bottom]`.
pub fn stack_rows(
    a_top: &DMatrix<f64>,
    b_top: &DVector<f64>,
    a_bottom: &DMatrix<f64>,
    b_bottom: &DVector<f64>,
) -> (DMatrix<f64>, DVector<f64>) {
    let rows = a_top.nrows() + a_bottom.nrows();
    let cols = a_top.ncols().max(a_bottom.ncols());

    let mut a = DMatrix::<f64>::zeros(rows, cols);
    a.view_mut((0, 0), (a_top.nrows(), a_top.ncols())).copy_from(a_top);
    a.view_mut((a_top.nrows(), 0), (a_bottom.nrows(), a_bottom.ncols()))
        .copy_from(a_bottom);

    let mut b = DVector::<f64>::zeros(rows);
    b.rows_mut(0, b_top.len()).copy_from(b_top);
    b.rows_mut(b_top.len(), b_bottom.len()).copy_from(b_bottom);

    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn least_squares_zero_matrix_gives_zero_step() {
        let x = DMatrix::<f64>::zeros(3, 2);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        let beta = solve_least_squares(&x, &y).unwrap();
        assert!(beta.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn least_squares_rejects_mismatched_shapes() {
        let x = DMatrix::<f64>::zeros(3, 2);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve_least_squares(&x, &y).is_none());
    }

    #[test]
    fn stack_rows_places_blocks() {
        let a_top = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b_top = DVector::from_row_slice(&[5.0, 6.0]);
        let a_bottom = DMatrix::from_row_slice(1, 2, &[7.0, 8.0]);
        let b_bottom = DVector::from_row_slice(&[9.0]);

        let (a, b) = stack_rows(&a_top, &b_top, &a_bottom, &b_bottom);
        assert_eq!(a.nrows(), 3);
        assert_eq!(a[(2, 1)], 8.0);
        assert_eq!(b[2], 9.0);
        assert_eq!(b[0], 5.0);
    }
}
