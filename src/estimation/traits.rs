//! The model seam: a case-wise log-likelihood supplied by the caller.
//!
//! The engine treats the model as a black box. It only needs each case's
//! log-likelihood contribution; analytic case scores and an analytic
//! Hessian are optional and fall back to finite differences when the
//! default implementations report they are missing.
//!
//! Contributions are *unweighted*: the pipeline multiplies by the case
//! weight from [`CaseView::weight`].
use ndarray::ArrayViewMut1;

use crate::data::provider::{CaseProvider, CaseView};
use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::types::{Hessian, Theta};

/// User-implemented case-wise log-likelihood.
///
/// Required:
/// - `case_loglike(θ, case)`: `ℓ_c(θ)`. Return `-inf` for a zero
///   probability; the pipeline decides whether that is fatal.
///
/// Optional:
/// - `case_score(θ, case, out)`: write `∇ℓ_c(θ)` into `out` (full length,
///   zero-initialized). Default: `GradientNotImplemented`.
/// - `hessian(θ, provider)`: weighted total `∇²ℓ(θ)`. Default:
///   `HessianNotImplemented`.
/// - `check(θ, provider)`: reject obviously invalid inputs once before a
///   run. Default: accept.
///
/// Implementations are called concurrently from worker threads.
pub trait LogLikelihood: Sync {
    fn case_loglike(&self, theta: &Theta, case: &CaseView<'_>) -> EstResult<f64>;

    fn case_score(
        &self, _theta: &Theta, _case: &CaseView<'_>, _out: ArrayViewMut1<'_, f64>,
    ) -> EstResult<()> {
        Err(EstimationError::GradientNotImplemented)
    }

    fn hessian(&self, _theta: &Theta, _provider: &dyn CaseProvider) -> EstResult<Hessian> {
        Err(EstimationError::HessianNotImplemented)
    }

    fn check(&self, _theta: &Theta, _provider: &dyn CaseProvider) -> EstResult<()> {
        Ok(())
    }
}
