//! rust_mle — quasi-Newton maximum-likelihood estimation over case-wise data.
//!
//! Purpose
//! -------
//! Serve as the crate root. The crate maximizes a log-likelihood that is a
//! weighted sum of per-case contributions supplied by a user model, with
//! memoized evaluation, optional parallel fan-out across cases, several
//! direction-finding algorithms and post-estimation inference.
//!
//! Key behaviors
//! -------------
//! - `estimation`: parameter state, the evaluation pipeline, direction
//!   strategies, line search and the [`Estimator`](estimation::Estimator).
//! - `cache`: exact-match memoization of objective, gradient, BHHH,
//!   Hessian and convergence statistic per parameter vector.
//! - `parallel`: bounded per-call worker pools with private accumulators
//!   merged once after the join.
//! - `data`: the observation-provider seam, an in-memory provider and the
//!   read lock that blocks reloads during evaluation.
//! - `inference`: covariance, standard errors and likelihood-ratio tests.
//!
//! Invariants & assumptions
//! ------------------------
//! - No global state; every run is owned by one `Estimator`.
//! - The library installs no logger; callers pick a `log` backend.
//!
//! Conventions
//! -----------
//! - Numeric containers are `ndarray` arrays over `f64`.
//! - Fallible operations return [`EstResult`](estimation::EstResult).
//!
//! Downstream usage
//! ----------------
//! - `use rust_mle::estimation::prelude::*;` for the common surface.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; end-to-end scenarios live in
//!   `tests/`.

pub mod cache;
pub mod data;
pub mod estimation;
pub mod inference;
pub mod parallel;
