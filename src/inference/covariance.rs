//! inference::covariance — classical and sandwich covariance from curvature.
//!
//! Purpose
//! -------
//! Turn the Hessian of the log-likelihood at the estimate, restricted to
//! free parameters, into a parameter covariance matrix, and combine it
//! with the BHHH matrix into the robust (sandwich) covariance.
//!
//! Key behaviors
//! -------------
//! - [`covariance_from_hessian`]: `J⁺` where `J = -H` is the observed
//!   information, via the symmetric-eigen pseudoinverse.
//! - [`sandwich_covariance`]: `J⁺ B J⁺`.
//! - [`standard_errors`]: square roots of the diagonal.
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs are square, symmetric and already restricted to free
//!   parameters; the engine expands results back to full size.
//! - Eigenvalues at or below the pseudoinverse cutoff are discarded, which
//!   inflates variances along weakly identified directions instead of
//!   failing.
//!
//! Conventions
//! -----------
//! - Matrices are on the summed (not averaged) log-likelihood scale.
//! - No explicit inverse is formed; the pseudoinverse always exists.
use ndarray::{Array1, Array2};

use crate::estimation::linalg::pseudo_inverse;

/// covariance_from_hessian — `(-H)⁺` and its numerical rank.
///
/// Parameters
/// ----------
/// - `hessian`: `&Array2<f64>`
///   Symmetric `p×p` Hessian of the log-likelihood at the estimate,
///   restricted to free parameters.
///
/// Returns
/// -------
/// `(Array2<f64>, usize)`
///   The pseudoinverse of the observed information and the number of
///   retained eigen-directions. A rank below `p` signals weak
///   identification.
///
/// Notes
/// -----
/// - Directions of non-negative curvature (`λ(J) ≤ cutoff`) contribute
///   nothing; the corresponding variances are understated, not infinite.
pub fn covariance_from_hessian(hessian: &Array2<f64>) -> (Array2<f64>, usize) {
    let info = hessian.mapv(|v| -v);
    pseudo_inverse(&info)
}

/// `J⁺ B J⁺` for symmetric `J⁺` (covariance) and `B` (BHHH).
pub fn sandwich_covariance(inv_info: &Array2<f64>, bhhh: &Array2<f64>) -> Array2<f64> {
    inv_info.dot(bhhh).dot(inv_info)
}

/// `sqrt(diag(cov))`; NaN for negative or non-finite variances.
pub fn standard_errors(cov: &Array2<f64>) -> Array1<f64> {
    cov.diag().mapv(|v| if v >= 0.0 && v.is_finite() { v.sqrt() } else { f64::NAN })
}
