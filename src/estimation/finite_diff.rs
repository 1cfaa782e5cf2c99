//! estimation::finite_diff — finite-difference curvature and derivative checks.
//!
//! Purpose
//! -------
//! Approximate the Hessian when the model supplies none, and compare
//! analytic derivatives supplied by the model against numerical ones to
//! catch incorrect implementations.
//!
//! Key behaviors
//! -------------
//! - [`finite_diff_hessian`]: central-difference Jacobian of a gradient
//!   function over the free parameters, symmetrized, expanded back to full
//!   size with zero holdfast rows and columns.
//! - [`numeric_gradient`]: central-difference gradient of an objective over
//!   the free parameters (holdfast entries zero).
//! - [`max_relative_discrepancy`]: the statistic reported by the
//!   gradient and Hessian diagnostics.
//!
//! Invariants & assumptions
//! ------------------------
//! - The first error raised inside a difference closure is captured in a
//!   `RefCell` (the closure itself must return a plain value), the closure
//!   returns NaN, and the captured error is returned after the call.
//! - These routines cost O(free parameters) extra gradient or objective
//!   evaluations and are not used inside the iteration loop.
use std::cell::RefCell;

use finitediff::FiniteDiff;
use ndarray::{Array1, Array2, Zip};

use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::params::{free_to_full, full_to_free, hessfree_to_hessfull};
use crate::estimation::types::{Grad, Hessian, Theta};
use crate::estimation::validation::{validate_grad, validate_hessian};

/// Central-difference Hessian from a gradient function.
///
/// # Errors
/// - The first error returned by `grad_fn`.
/// - `NonFiniteValue` / `HessianDimMismatch` if the result fails
///   validation.
pub fn finite_diff_hessian<G>(grad_fn: G, theta: &Theta, holdfast: &[bool]) -> EstResult<Hessian>
where
    G: Fn(&Theta) -> EstResult<Grad>,
{
    let free0 = full_to_free(theta, holdfast);
    if free0.is_empty() {
        return Ok(Array2::zeros((theta.len(), theta.len())));
    }
    let closure_err: RefCell<Option<EstimationError>> = RefCell::new(None);
    let free_grad = |x: &Theta| -> Grad {
        let full = free_to_full(x, theta, holdfast);
        match grad_fn(&full) {
            Ok(g) => full_to_free(&g, holdfast),
            Err(e) => {
                capture(&closure_err, e);
                Array1::from_elem(x.len(), f64::NAN)
            }
        }
    };
    let mut hess_free = free0.central_hessian(&free_grad);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_hessian(&hess_free, free0.len())?;
    symmetrize_hess(&mut hess_free);
    Ok(hessfree_to_hessfull(&hess_free, holdfast))
}

/// Central-difference gradient of `objective` over the free parameters.
pub fn numeric_gradient<F>(objective: F, theta: &Theta, holdfast: &[bool]) -> EstResult<Grad>
where
    F: Fn(&Theta) -> EstResult<f64>,
{
    let free0 = full_to_free(theta, holdfast);
    if free0.is_empty() {
        return Ok(Array1::zeros(theta.len()));
    }
    let closure_err: RefCell<Option<EstimationError>> = RefCell::new(None);
    let free_obj = |x: &Theta| -> f64 {
        match objective(&free_to_full(x, theta, holdfast)) {
            Ok(v) => v,
            Err(e) => {
                capture(&closure_err, e);
                f64::NAN
            }
        }
    };
    let grad_free = free0.central_diff(&free_obj);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_grad(&grad_free, free0.len())?;
    Ok(free_to_full(&grad_free, &Array1::zeros(theta.len()), holdfast))
}

/// Largest `|a - b| / max(|a|, |b|, 1)` over matching entries.
///
/// Returns NaN if the inputs differ in length or any entry is NaN.
pub fn max_relative_discrepancy<'a, 'b, I, J>(analytic: I, numeric: J) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    J: IntoIterator<Item = &'b f64>,
{
    let a: Vec<f64> = analytic.into_iter().copied().collect();
    let b: Vec<f64> = numeric.into_iter().copied().collect();
    if a.len() != b.len() {
        return f64::NAN;
    }
    let mut worst = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = (x - y).abs() / x.abs().max(y.abs()).max(1.0);
        if d.is_nan() {
            return f64::NAN;
        }
        worst = worst.max(d);
    }
    worst
}

// ---- Helper methods ----

/// Average each off-diagonal pair in place.
pub fn symmetrize_hess(hess: &mut Hessian) {
    let t = hess.t().to_owned();
    Zip::from(&mut *hess).and(&t).for_each(|h, &ht| *h = 0.5 * (*h + ht));
}

fn capture(slot: &RefCell<Option<EstimationError>>, err: EstimationError) {
    let mut slot = slot.borrow_mut();
    if slot.is_none() {
        *slot = Some(err);
    }
}
