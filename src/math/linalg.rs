//! Helpers for the 2×2 symmetric matrices of the parameter space.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

/// Normal matrix `JᵀJ` of an `n × 2` Jacobian.
pub fn gram(j: &DMatrix<f64>) -> Matrix2<f64> {
    let g = j.transpose() * j;
    Matrix2::new(g[(0, 0)], g[(0, 1)], g[(1, 0)], g[(1, 1)])
}

/// `Jᵀr` for an `n × 2` Jacobian.
pub fn gradient(j: &DMatrix<f64>, r: &DVector<f64>) -> Vector2<f64> {
    let v = j.transpose() * r;
    Vector2::new(v[0], v[1])
}

/// Smallest accepted `det / trace²` before a matrix counts as singular.
const MIN_RELATIVE_DET: f64 = 1e-12;

/// Inverse of a symmetric positive-definite matrix.
///
/// Returns `None` when the matrix is not (numerically) positive definite, e.g.
/// when the data says nothing about one direction of the parameter space.
pub fn inverse_spd(m: &Matrix2<f64>) -> Option<Matrix2<f64>> {
    let trace = m.trace();
    if !(trace > 0.0) || m.determinant() <= MIN_RELATIVE_DET * trace * trace {
        return None;
    }
    let inv = (*m).cholesky()?.inverse();
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

/// Whitening factor `W` of a covariance `C`, such that `WᵀW = C⁻¹`.
///
/// With `C = L Lᵀ` (Cholesky), `W = L⁻¹`.
pub fn whitening_factor(cov: &Matrix2<f64>) -> Option<Matrix2<f64>> {
    let l = (*cov).cholesky()?.l();
    let w = l.try_inverse()?;
    w.iter().all(|v| v.is_finite()).then_some(w)
}

/// Covariance from standard deviations and a correlation coefficient.
pub fn covariance_from_sigmas(sigma_a: f64, sigma_b: f64, rho: f64) -> Matrix2<f64> {
    let off = rho * sigma_a * sigma_b;
    Matrix2::new(sigma_a * sigma_a, off, off, sigma_b * sigma_b)
}

/// Sample covariance of 2-vectors (divisor `n - 1`).
pub fn sample_covariance(samples: &[Vector2<f64>]) -> Option<Matrix2<f64>> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().fold(Vector2::zeros(), |acc, s| acc + s) / n;
    let mut cov = Matrix2::zeros();
    for s in samples {
        let d = s - mean;
        cov += d * d.transpose();
    }
    Some(cov / (n - 1.0))
}

/// Copy a 2×2 static matrix into a dynamic one (for row stacking).
pub fn to_dynamic(m: &Matrix2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(2, 2, |i, j| m[(i, j)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_spd_matches_identity() {
        let m = Matrix2::new(4.0, 1.0, 1.0, 3.0);
        let inv = inverse_spd(&m).unwrap();
        let id = m * inv;
        assert!((id - Matrix2::identity()).norm() < 1e-12);
    }

    #[test]
    fn inverse_spd_rejects_singular() {
        let m = Matrix2::new(1.0, 0.0, 0.0, 0.0);
        assert!(inverse_spd(&m).is_none());
    }

    #[test]
    fn whitening_factor_inverts_covariance() {
        let cov = covariance_from_sigmas(2.0, 0.5, 0.3);
        let w = whitening_factor(&cov).unwrap();
        let prec = w.transpose() * w;
        let expected = inverse_spd(&cov).unwrap();
        assert!((prec - expected).norm() < 1e-10);
    }

    #[test]
    fn sample_covariance_of_symmetric_pairs() {
        let samples = vec![
            Vector2::new(1.0, 0.0),
            Vector2::new(-1.0, 0.0),
            Vector2::new(0.0, 2.0),
            Vector2::new(0.0, -2.0),
        ];
        let cov = sample_covariance(&samples).unwrap();
        assert!((cov[(0, 0)] - 2.0 / 3.0).abs() < 1e-12);
        assert!((cov[(1, 1)] - 8.0 / 3.0).abs() < 1e-12);
        assert!(cov[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn gram_and_gradient_shapes() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let r = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        let g = gram(&j);
        assert_eq!(g, Matrix2::new(2.0, 1.0, 1.0, 2.0));
        assert_eq!(gradient(&j, &r), Vector2::new(4.0, 5.0));
    }
}
