//! Validation helpers shared by the evaluation pipeline and the engine.
//!
//! - [`validate_grad`]: length and finiteness of a gradient.
//! - [`validate_hessian`]: shape and finiteness of a Hessian.
//! - [`validate_theta`]: length of a parameter vector.
//!
//! Each returns the specific [`EstimationError`] variant for the first
//! problem found.
use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::types::{Grad, Hessian, Theta};

/// # Errors
/// - `GradientDimMismatch` if `grad.len() != dim`.
/// - `NonFiniteValue` for the first NaN or infinite entry.
pub fn validate_grad(grad: &Grad, dim: usize) -> EstResult<()> {
    if grad.len() != dim {
        return Err(EstimationError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    if let Some(&value) = grad.iter().find(|v| !v.is_finite()) {
        return Err(EstimationError::NonFiniteValue { what: "gradient", value });
    }
    Ok(())
}

/// # Errors
/// - `HessianDimMismatch` unless the matrix is `dim × dim`.
/// - `NonFiniteValue` for the first NaN or infinite entry.
pub fn validate_hessian(hessian: &Hessian, dim: usize) -> EstResult<()> {
    if hessian.nrows() != dim || hessian.ncols() != dim {
        return Err(EstimationError::HessianDimMismatch {
            expected: dim,
            found: (hessian.nrows(), hessian.ncols()),
        });
    }
    if let Some(&value) = hessian.iter().find(|v| !v.is_finite()) {
        return Err(EstimationError::NonFiniteValue { what: "Hessian", value });
    }
    Ok(())
}

/// # Errors
/// - `DimensionMismatch` if `theta.len() != dim`.
pub fn validate_theta(theta: &Theta, dim: usize) -> EstResult<()> {
    if theta.len() != dim {
        return Err(EstimationError::DimensionMismatch {
            what: "parameter vector",
            expected: dim,
            found: theta.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Shape errors take precedence over value errors, and the first
    // non-finite entry is reported.
    //
    // Given
    // -----
    // - A length-2 gradient checked against 3, and one containing NaN.
    //
    // Expect
    // ------
    // - `GradientDimMismatch`, then `NonFiniteValue`.
    fn gradient_checks() {
        assert_eq!(
            validate_grad(&array![1.0, 2.0], 3),
            Err(EstimationError::GradientDimMismatch { expected: 3, found: 2 })
        );
        assert!(matches!(
            validate_grad(&array![1.0, f64::NAN], 2),
            Err(EstimationError::NonFiniteValue { what: "gradient", .. })
        ));
        assert!(validate_grad(&array![1.0, 2.0], 2).is_ok());
    }

    #[test]
    // Purpose
    // -------
    // Hessians must be square with the right dimension and finite.
    //
    // Given
    // -----
    // - A 1×2 matrix and a 1×1 matrix holding infinity.
    //
    // Expect
    // ------
    // - `HessianDimMismatch` and `NonFiniteValue`.
    fn hessian_checks() {
        assert_eq!(
            validate_hessian(&array![[1.0, 0.0]], 1),
            Err(EstimationError::HessianDimMismatch { expected: 1, found: (1, 2) })
        );
        assert!(matches!(
            validate_hessian(&array![[f64::INFINITY]], 1),
            Err(EstimationError::NonFiniteValue { .. })
        ));
        assert!(validate_theta(&array![0.0], 2).is_err());
    }
}
