//! estimation::types — shared numeric aliases and constants.
//!
//! All vectors and matrices are `ndarray` containers over `f64`. Full-size
//! quantities are indexed by parameter position (holdfast entries
//! included); free-parameter restrictions are produced explicitly with
//! [`hessfull_to_hessfree`](crate::estimation::params::hessfull_to_hessfree)
//! and friends.
use ndarray::{Array1, Array2};

/// Parameter vector `θ`.
pub type Theta = Array1<f64>;

/// Gradient `∇ℓ(θ)` of the log-likelihood, same length as [`Theta`].
pub type Grad = Array1<f64>;

/// Dense `n × n` Hessian `∇²ℓ(θ)`.
pub type Hessian = Array2<f64>;

/// Outer product of case scores `Σ w_c s_c s_cᵀ`.
pub type Bhhh = Array2<f64>;

/// Eigenvalues at or below this (relative to the largest) are treated as
/// zero when forming pseudoinverses.
pub const EIGEN_EPS: f64 = 1e-12;

/// Default central-difference step for score approximations.
pub const DEFAULT_FD_STEP: f64 = 1e-6;
