//! inference — covariance, standard errors and likelihood-ratio tests.
//!
//! Purpose
//! -------
//! Provide post-estimation uncertainty quantification on top of a fitted
//! model: classical covariance from the observed information, the robust
//! (sandwich) covariance built with the BHHH matrix, and p-values for
//! t-statistics and likelihood-ratio tests.
//!
//! Key behaviors
//! -------------
//! - [`covariance_from_hessian`] forms `(-H)⁺` with eigenvalue truncation.
//! - [`sandwich_covariance`] forms `J⁺ B J⁺`.
//! - [`standard_errors`] maps a covariance to per-parameter errors.
//! - [`LikelihoodRatio`] and [`normal_p_value`] use `statrs` distributions.
//!
//! Invariants & assumptions
//! ------------------------
//! - Everything here works on the free-parameter restriction; mapping back
//!   to the full parameter vector (NaN errors for holdfast parameters) is
//!   done by `estimation::engine`.
//! - Functions are pure: no logging, no global state.
//!
//! Downstream usage
//! ----------------
//! - `Estimator::calculate_errors` calls these after `maximize` and writes
//!   the results into the parameter records.
//! - `Estimator::likelihood_ratio_test` wraps [`LikelihoodRatio::new`].
//!
//! Testing notes
//! -------------
//! - Unit tests cover diagonal quadratics with known covariance, sandwich
//!   inflation, rank truncation and reference χ² / normal quantiles.
//! - End-to-end standard errors are checked in `tests/`.

pub mod covariance;
pub mod hypothesis;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::covariance::{covariance_from_hessian, sandwich_covariance, standard_errors};
pub use self::hypothesis::{LikelihoodRatio, normal_p_value};
