//! estimation::directions — interchangeable direction-finding strategies.
//!
//! Purpose
//! -------
//! Given the gradient and BHHH matrix at the current point (and, when
//! available, the change in parameters and gradient since the previous
//! turn), produce an ascent direction for the line search.
//!
//! Key behaviors
//! -------------
//! - [`DirectionStrategy::find`] returns `Ok(Some(d))` for a usable
//!   direction, `Ok(None)` when the direction is unusable (non-finite, or
//!   not an ascent direction `gᵀd <= 0`), and `Err` only for fatal
//!   conditions.
//! - BHHH: `d = B⁻¹ g` via Cholesky, falling back to the eigen
//!   pseudoinverse; a BHHH matrix with no positive curvature at all is a
//!   fatal `SingularMatrix`.
//! - BFGS / DFP: running inverse-curvature approximation updated with
//!   `s = Δθ` and `y = -Δg`. A missing history or a failed curvature
//!   condition `sᵀy > 0` resets the approximation to the BHHH inverse (or
//!   the identity if that is unavailable) with a warning.
//! - DFP-J: the DFP update applied each turn to a fresh BHHH inverse.
//! - Gradient: `d = g`.
//!
//! Conventions
//! -----------
//! - Strategies work on the free-parameter restriction internally and
//!   return full-size directions with holdfast entries exactly zero.
use ndarray::{Array1, Array2, Axis};

use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::linalg::{cholesky_solve, robust_inverse};
use crate::estimation::options::Algorithm;
use crate::estimation::params::{free_to_full, full_to_free, hessfull_to_hessfree};
use crate::estimation::types::{Bhhh, Grad, Theta};

/// Change since the previous turn: `θ_k - θ_{k-1}` and `g_k - g_{k-1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub step: Theta,
    pub gradient_change: Grad,
}

/// Everything a strategy may look at.
#[derive(Debug, Clone, Copy)]
pub struct DirectionInput<'a> {
    pub gradient: &'a Grad,
    pub bhhh: &'a Bhhh,
    pub holdfast: &'a [bool],
    pub turn: Option<&'a Turn>,
}

pub trait DirectionStrategy {
    fn algorithm(&self) -> Algorithm;

    fn find(&mut self, input: &DirectionInput<'_>) -> EstResult<Option<Theta>>;
}

/// Fresh strategy state for `algorithm`.
pub fn strategy_for(algorithm: Algorithm) -> Box<dyn DirectionStrategy> {
    match algorithm {
        Algorithm::Bhhh => Box::new(BhhhDirection),
        Algorithm::Bfgs => Box::new(QuasiNewton::new(Algorithm::Bfgs)),
        Algorithm::Dfp => Box::new(QuasiNewton::new(Algorithm::Dfp)),
        Algorithm::DfpJ => Box::new(QuasiNewton::new(Algorithm::DfpJ)),
        Algorithm::Gradient => Box::new(GradientDirection),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BhhhDirection;

impl DirectionStrategy for BhhhDirection {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bhhh
    }

    fn find(&mut self, input: &DirectionInput<'_>) -> EstResult<Option<Theta>> {
        let g = full_to_free(input.gradient, input.holdfast);
        let b = hessfull_to_hessfree(input.bhhh, input.holdfast);
        let d = match cholesky_solve(&b, &g) {
            Some(d) => d,
            None => {
                let inv = robust_inverse(&b)
                    .ok_or(EstimationError::SingularMatrix { what: "BHHH matrix" })?;
                log::debug!("[mle] BHHH not positive definite; using pseudoinverse");
                inv.dot(&g)
            }
        };
        Ok(finalize(&d, &g, input))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GradientDirection;

impl DirectionStrategy for GradientDirection {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Gradient
    }

    fn find(&mut self, input: &DirectionInput<'_>) -> EstResult<Option<Theta>> {
        let g = full_to_free(input.gradient, input.holdfast);
        Ok(finalize(&g, &g, input))
    }
}

/// BFGS, DFP and DFP-J inverse-curvature updates.
#[derive(Debug, Clone)]
pub struct QuasiNewton {
    algorithm: Algorithm,
    inv_hess: Option<Array2<f64>>,
}

impl QuasiNewton {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm, inv_hess: None }
    }

    /// Current free-parameter inverse-curvature approximation.
    pub fn inverse_curvature(&self) -> Option<&Array2<f64>> {
        self.inv_hess.as_ref()
    }

    fn seed(&self, b: &Array2<f64>) -> Array2<f64> {
        robust_inverse(b).unwrap_or_else(|| {
            log::warn!("[mle] {}: BHHH not invertible; seeding with identity", self.algorithm);
            Array2::eye(b.nrows())
        })
    }

    fn update(&self, h: &Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) -> Option<Array2<f64>> {
        let sy = s.dot(y);
        if !(sy > 0.0) || !sy.is_finite() {
            return None;
        }
        let hy = h.dot(y);
        let yhy = y.dot(&hy);
        let updated = match self.algorithm {
            Algorithm::Bfgs => {
                let rho = 1.0 / sy;
                h - &((outer(s, &hy) + outer(&hy, s)) * rho) + outer(s, s) * (rho * rho * yhy + rho)
            }
            _ => {
                if !(yhy > 0.0) {
                    return None;
                }
                h + &(outer(s, s) / sy) - outer(&hy, &hy) / yhy
            }
        };
        updated.iter().all(|v| v.is_finite()).then_some(updated)
    }
}

impl DirectionStrategy for QuasiNewton {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn find(&mut self, input: &DirectionInput<'_>) -> EstResult<Option<Theta>> {
        let g = full_to_free(input.gradient, input.holdfast);
        let b = hessfull_to_hessfree(input.bhhh, input.holdfast);

        let base = match (self.algorithm, self.inv_hess.take()) {
            (Algorithm::DfpJ, _) | (_, None) => None,
            (_, Some(h)) if h.nrows() == g.len() => Some(h),
            (_, Some(_)) => None,
        };
        let had_history = base.is_some() || self.algorithm == Algorithm::DfpJ;
        let start = base.unwrap_or_else(|| self.seed(&b));

        let h = match input.turn.filter(|_| had_history) {
            Some(turn) => {
                let s = full_to_free(&turn.step, input.holdfast);
                let y = -full_to_free(&turn.gradient_change, input.holdfast);
                match self.update(&start, &s, &y) {
                    Some(h) => h,
                    None => {
                        log::warn!(
                            "[mle] {} update rejected (curvature condition failed); resetting to BHHH",
                            self.algorithm
                        );
                        self.seed(&b)
                    }
                }
            }
            None => start,
        };

        let mut d = h.dot(&g);
        let mut direction = finalize(&d, &g, input);
        if direction.is_none() && had_history {
            log::warn!("[mle] {} direction unusable; resetting to BHHH", self.algorithm);
            let reset = self.seed(&b);
            d = reset.dot(&g);
            direction = finalize(&d, &g, input);
            self.inv_hess = Some(reset);
        } else {
            self.inv_hess = Some(h);
        }
        Ok(direction)
    }
}

// ---- Helper methods ----

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view().insert_axis(Axis(1)).dot(&b.view().insert_axis(Axis(0)))
}

/// Expand a free-parameter direction to full size if it is a finite
/// ascent direction.
fn finalize(d_free: &Array1<f64>, g_free: &Array1<f64>, input: &DirectionInput<'_>) -> Option<Theta> {
    let slope = g_free.dot(d_free);
    if !d_free.iter().all(|v| v.is_finite()) || !(slope > 0.0) {
        return None;
    }
    let zeros = Array1::zeros(input.gradient.len());
    Some(free_to_full(d_free, &zeros, input.holdfast))
}
