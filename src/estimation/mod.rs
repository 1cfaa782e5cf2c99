//! estimation — parameter state, case-wise evaluation and the MLE engine.
//!
//! Purpose
//! -------
//! Maximize a log-likelihood that is a (weighted) sum of per-case
//! contributions supplied by a user model, over parameters with bounds and
//! holdfast flags, using interchangeable quasi-Newton direction strategies
//! and a bounded line search.
//!
//! Key behaviors
//! -------------
//! - [`ParameterState`]: values, bounds, holdfast flags, null/initial
//!   values and standard errors, addressed by name or index.
//! - [`Evaluator`]: cached, optionally parallel evaluation of `ℓ`, `∇ℓ`
//!   and the BHHH matrix, with analytic or finite-difference case scores.
//! - [`directions`]: BHHH, BFGS, DFP, DFP-J and plain gradient directions.
//! - [`line_search`]: expand/contract search clipped to the bounds.
//! - [`Estimator`]: the iteration loop, result codes, diagnostics and
//!   post-estimation covariance.
//!
//! Invariants & assumptions
//! ------------------------
//! - Holdfast parameters are bit-identical before and after `maximize`.
//! - The best objective is monotone within a run and the best point is
//!   restored on every exit.
//! - Only case evaluation is parallel; the cache and the engine state are
//!   touched from the calling thread only.
//!
//! Conventions
//! -----------
//! - The objective is maximized. Curvature matrices passed to direction
//!   strategies are approximations of `-∇²ℓ` (positive semi-definite).
//! - Errors are reported as [`EstimationError`] through [`EstResult`].
//! - Logging uses the `log` facade with an `[mle]` prefix.
//!
//! Downstream usage
//! ----------------
//! - Implement [`LogLikelihood`] for a model, wrap the data in a
//!   [`CaseProvider`](crate::data::CaseProvider), then:
//!   `Estimator::new(model, provider, EvalOptions::default())`,
//!   `add_parameter(..)`, `maximize(max_iter, None)`,
//!   `calculate_errors()`.
//! - `use rust_mle::estimation::prelude::*;` imports the common surface.
//!
//! Testing notes
//! -------------
//! - Each submodule carries unit tests for its own contract.
//! - End-to-end scenarios (convergence, holdfast, invalid cases, bounds,
//!   monotone best) live in `tests/integration_estimation.rs`.

pub mod directions;
pub mod engine;
pub mod errors;
pub mod evaluate;
pub mod finite_diff;
pub mod line_search;
pub mod linalg;
pub mod options;
pub mod params;
pub mod status;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::directions::{DirectionStrategy, strategy_for};
pub use self::engine::Estimator;
pub use self::errors::{EstResult, EstimationError};
pub use self::evaluate::{CaseValue, Evaluation, Evaluator};
pub use self::line_search::LineSearchOutcome;
pub use self::options::{Algorithm, EvalOptions, StrategyConfig, default_strategies};
pub use self::params::{
    ParamId, ParameterRecord, ParameterState, hessfree_to_hessfull, hessfull_to_hessfree,
};
pub use self::status::{EstimationSummary, ResultCode, StatusFlags};
pub use self::traits::LogLikelihood;
pub use self::types::{Bhhh, Grad, Hessian, Theta};

// ---- Optional convenience prelude for downstream crates ------------------

pub mod prelude {
    pub use super::engine::Estimator;
    pub use super::errors::{EstResult, EstimationError};
    pub use super::options::{Algorithm, EvalOptions, StrategyConfig};
    pub use super::status::{ResultCode, StatusFlags};
    pub use super::traits::LogLikelihood;
    pub use super::types::Theta;
    pub use crate::data::{CaseProvider, CaseRecord, CaseTable, CaseView};
}
