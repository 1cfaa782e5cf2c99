//! estimation::linalg — small dense linear-algebra helpers over `nalgebra`.
//!
//! Purpose
//! -------
//! Bridge `ndarray` matrices into `nalgebra::DMatrix` for the two
//! factorizations the engine needs: Cholesky solves for positive-definite
//! curvature matrices, and symmetric-eigen pseudoinverses when Cholesky
//! fails or when a covariance must tolerate rank deficiency.
//!
//! Conventions
//! -----------
//! - Inputs are treated as symmetric; callers symmetrize upstream.
//! - Eigenvalues `λ ≤ EIGEN_EPS · λ_max` are truncated to zero. The cutoff
//!   is relative, so rescaling a matrix rescales its pseudoinverse and keeps
//!   its rank. A matrix with `λ_max ≤ 0` has rank 0.
//! - Negative eigenvalues are always truncated, so the pseudoinverse of an
//!   indefinite matrix is the pseudoinverse of its positive part.
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::estimation::types::EIGEN_EPS;

pub fn to_dmatrix(m: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[[i, j]])
}

pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Solve `m x = v` for symmetric positive-definite `m`. `None` if the
/// Cholesky factorization fails.
pub fn cholesky_solve(m: &Array2<f64>, v: &Array1<f64>) -> Option<Array1<f64>> {
    let chol = to_dmatrix(m).cholesky()?;
    let rhs = DVector::from_iterator(v.len(), v.iter().copied());
    let x = chol.solve(&rhs);
    Some(x.iter().copied().collect())
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
pub fn cholesky_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let chol = to_dmatrix(m).cholesky()?;
    Some(from_dmatrix(&chol.inverse()))
}

/// Symmetric-eigen pseudoinverse and its numerical rank.
pub fn pseudo_inverse(m: &Array2<f64>) -> (Array2<f64>, usize) {
    let n = m.nrows();
    if n == 0 {
        return (Array2::zeros((0, 0)), 0);
    }
    let eigen = to_dmatrix(m).symmetric_eigen();
    let q = &eigen.eigenvectors;
    let lambda_max = eigen.eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    if !(lambda_max > 0.0) {
        return (Array2::zeros((n, n)), 0);
    }
    let cutoff = EIGEN_EPS * lambda_max;

    let mut pinv = Array2::<f64>::zeros((n, n));
    let mut rank = 0;
    for (k, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if !(lambda > cutoff) {
            continue;
        }
        rank += 1;
        for i in 0..n {
            let qik = q[(i, k)] / lambda;
            for j in 0..n {
                pinv[[i, j]] += qik * q[(j, k)];
            }
        }
    }
    (pinv, rank)
}

/// Inverse via Cholesky, falling back to the pseudoinverse. `None` when the
/// matrix has no positive curvature at all (e.g. all zeros).
pub fn robust_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    if let Some(inv) = cholesky_inverse(m) {
        return Some(inv);
    }
    let (pinv, rank) = pseudo_inverse(m);
    (rank > 0).then_some(pinv)
}
