//! Unified error surface for the estimation engine.
//!
//! Every fallible operation in this crate returns [`EstResult<T>`]. The
//! variants are grouped by the layer that raises them: configuration checks,
//! parameter-container invariants, case-wise evaluation, linear algebra, and
//! the external data provider. Recoverable numeric conditions (a NaN trial
//! step, a rejected quasi-Newton update) are handled inside the engine and
//! never surface here; what does surface is fatal for the current
//! `maximize` call.
use std::collections::BTreeSet;

/// Crate-wide result alias for estimation operations.
pub type EstResult<T> = Result<T, EstimationError>;

#[derive(Debug, Clone, PartialEq)]
pub enum EstimationError {
    // ---- Parameters ----
    /// No parameter with the given name exists.
    ParameterNotFound {
        name: String,
    },

    /// Parameter index is outside the parameter vector.
    ParameterIndexOutOfRange {
        index: usize,
        len: usize,
    },

    /// A parameter with the same name was already registered.
    DuplicateParameter {
        name: String,
    },

    /// A per-parameter container disagrees with the parameter count.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Lower bound exceeds upper bound, or the value lies outside them.
    InvalidBounds {
        name: String,
        min: f64,
        max: f64,
        value: f64,
    },

    // ---- Options ----
    /// Step-size settings must be finite, positive and ordered.
    InvalidStep {
        value: f64,
        reason: &'static str,
    },

    /// Convergence tolerances must be finite and non-negative.
    InvalidTolerance {
        tol: f64,
        reason: &'static str,
    },

    /// Maximum iterations must be positive.
    InvalidMaxIter {
        max_iter: usize,
        reason: &'static str,
    },

    /// Worker count must be positive.
    InvalidWorkerCount {
        workers: usize,
    },

    /// Unknown direction-finding algorithm name.
    InvalidAlgorithm {
        name: String,
        reason: &'static str,
    },

    // ---- Case-wise evaluation ----
    /// A case produced a zero probability (log-likelihood of −∞).
    ZeroProbability {
        case: usize,
    },

    /// One or more cases reference alternative codes the provider cannot resolve.
    InvalidCases {
        codes: BTreeSet<i64>,
        cases: usize,
    },

    /// The model returned a non-finite value where a finite one is required.
    NonFiniteValue {
        what: &'static str,
        value: f64,
    },

    /// The model does not supply analytic case scores.
    GradientNotImplemented,

    /// The model does not supply an analytic Hessian.
    HessianNotImplemented,

    /// Error reported by a user-supplied model callback.
    Model(String),

    // ---- Linear algebra ----
    /// A curvature matrix could not be inverted at all.
    SingularMatrix {
        what: &'static str,
    },

    /// Gradient length does not match the parameter count.
    GradientDimMismatch {
        expected: usize,
        found: usize,
    },

    /// Hessian shape does not match the parameter count.
    HessianDimMismatch {
        expected: usize,
        found: (usize, usize),
    },

    // ---- Data provider ----
    /// Provider refused a structural change while a read lock is held.
    ReadLockActive {
        holders: usize,
    },

    /// Case index outside the provider's range.
    CaseOutOfRange {
        case: usize,
        n_cases: usize,
    },

    /// An alternative code was listed twice when building a provider.
    DuplicateAlternative {
        code: i64,
    },

    // ---- Fallback ----
    UnknownError,
}

impl std::error::Error for EstimationError {}

impl std::fmt::Display for EstimationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Parameters ----
            EstimationError::ParameterNotFound { name } => {
                write!(f, "Parameter not found: '{name}'")
            }
            EstimationError::ParameterIndexOutOfRange { index, len } => {
                write!(f, "Parameter index {index} out of range for {len} parameters")
            }
            EstimationError::DuplicateParameter { name } => {
                write!(f, "Parameter '{name}' already exists")
            }
            EstimationError::DimensionMismatch { what, expected, found } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, found {found}")
            }
            EstimationError::InvalidBounds { name, min, max, value } => {
                write!(
                    f,
                    "Invalid bounds for parameter '{name}': min {min}, max {max}, value {value}"
                )
            }

            // ---- Options ----
            EstimationError::InvalidStep { value, reason } => {
                write!(f, "Invalid step setting {value}: {reason}")
            }
            EstimationError::InvalidTolerance { tol, reason } => {
                write!(f, "Invalid tolerance {tol}: {reason}")
            }
            EstimationError::InvalidMaxIter { max_iter, reason } => {
                write!(f, "Invalid maximum iterations {max_iter}: {reason}")
            }
            EstimationError::InvalidWorkerCount { workers } => {
                write!(f, "Invalid worker count {workers}: must be greater than zero")
            }
            EstimationError::InvalidAlgorithm { name, reason } => {
                write!(f, "Invalid algorithm '{name}': {reason}")
            }

            // ---- Case-wise evaluation ----
            EstimationError::ZeroProbability { case } => {
                write!(f, "Case {case} has zero probability")
            }
            EstimationError::InvalidCases { codes, cases } => {
                write!(f, "{cases} case(s) reference {} unidentified alternative codes:", codes.len())?;
                for code in codes {
                    write!(f, " {code}")?;
                }
                Ok(())
            }
            EstimationError::NonFiniteValue { what, value } => {
                write!(f, "Non-finite {what}: {value}")
            }
            EstimationError::GradientNotImplemented => {
                write!(f, "Analytic case scores not implemented")
            }
            EstimationError::HessianNotImplemented => {
                write!(f, "Analytic Hessian not implemented")
            }
            EstimationError::Model(msg) => {
                write!(f, "Model error: {msg}")
            }

            // ---- Linear algebra ----
            EstimationError::SingularMatrix { what } => {
                write!(f, "Singular matrix: {what} cannot be inverted")
            }
            EstimationError::GradientDimMismatch { expected, found } => {
                write!(f, "Gradient dimension mismatch: expected {expected}, found {found}")
            }
            EstimationError::HessianDimMismatch { expected, found } => {
                write!(
                    f,
                    "Hessian dimension mismatch: expected ({expected}, {expected}), found {found:?}"
                )
            }

            // ---- Data provider ----
            EstimationError::ReadLockActive { holders } => {
                write!(
                    f,
                    "There is a repository read lock active ({holders} holder(s)), cannot load new data now"
                )
            }
            EstimationError::CaseOutOfRange { case, n_cases } => {
                write!(f, "Case {case} out of range for {n_cases} cases")
            }
            EstimationError::DuplicateAlternative { code } => {
                write!(f, "Alternative code {code} listed more than once")
            }

            // ---- Fallback ----
            EstimationError::UnknownError => {
                write!(f, "Unknown error")
            }
        }
    }
}

impl From<anyhow::Error> for EstimationError {
    fn from(err: anyhow::Error) -> Self {
        EstimationError::Model(err.to_string())
    }
}
