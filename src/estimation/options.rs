//! Configuration for evaluation and for each optimization strategy.
//!
//! - [`EvalOptions`]: how case-wise passes run (parallelism, invalid-case
//!   and zero-probability policy, finite-difference step).
//! - [`StrategyConfig`]: one entry of the strategy list handed to
//!   `maximize` (direction algorithm, line-search steps, convergence).
//! - [`Algorithm`]: direction-finding method, parsed case-insensitively.
//!
//! Constructors validate their inputs and return `EstResult<Self>`; the
//! `Default` impls are always valid.
use std::fmt;
use std::str::FromStr;

use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::types::DEFAULT_FD_STEP;
use crate::parallel::default_worker_count;

/// Case counts below this run on the calling thread.
pub const DEFAULT_MIN_PARALLEL_CASES: usize = 64;

/// Case-wise evaluation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    pub parallel: bool,
    pub workers: usize,
    pub min_parallel_cases: usize,
    /// Exclude cases with unresolvable alternative codes instead of failing.
    pub skip_invalid: bool,
    /// Let zero-probability cases contribute `-inf` instead of failing.
    pub mute_zero_probability: bool,
    pub fd_step: f64,
}

impl EvalOptions {
    /// # Errors
    /// - `InvalidWorkerCount` if `workers == 0`.
    /// - `InvalidStep` if `fd_step` is not finite and positive.
    pub fn new(
        parallel: bool, workers: usize, min_parallel_cases: usize, skip_invalid: bool,
        mute_zero_probability: bool, fd_step: f64,
    ) -> EstResult<Self> {
        if workers == 0 {
            return Err(EstimationError::InvalidWorkerCount { workers });
        }
        verify_positive_step(fd_step, "Finite-difference step must be finite and positive.")?;
        Ok(Self { parallel, workers, min_parallel_cases, skip_invalid, mute_zero_probability, fd_step })
    }

    /// Run every pass on the calling thread.
    pub fn sequential() -> Self {
        Self { parallel: false, workers: 1, ..Self::default() }
    }

    pub fn with_skip_invalid(mut self, skip_invalid: bool) -> Self {
        self.skip_invalid = skip_invalid;
        self
    }

    pub fn with_mute_zero_probability(mut self, mute: bool) -> Self {
        self.mute_zero_probability = mute;
        self
    }

    /// Whether a pass over `n_cases` should fan out.
    pub fn dispatch_parallel(&self, n_cases: usize) -> bool {
        self.parallel && self.workers > 1 && n_cases >= self.min_parallel_cases
    }
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            workers: default_worker_count(),
            min_parallel_cases: DEFAULT_MIN_PARALLEL_CASES,
            skip_invalid: false,
            mute_zero_probability: false,
            fd_step: DEFAULT_FD_STEP,
        }
    }
}

/// Direction-finding method.
///
/// Parsing accepts case-insensitive `"bhhh"`, `"bfgs"`, `"dfp"`, `"dfpj"`
/// and `"gradient"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Inverse of the outer product of case scores.
    Bhhh,
    /// BFGS inverse update seeded from BHHH.
    Bfgs,
    /// DFP inverse update seeded from BHHH.
    Dfp,
    /// DFP update applied to the current BHHH inverse each iteration.
    DfpJ,
    /// Plain gradient ascent.
    Gradient,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Bhhh => "bhhh",
            Algorithm::Bfgs => "bfgs",
            Algorithm::Dfp => "dfp",
            Algorithm::DfpJ => "dfpj",
            Algorithm::Gradient => "gradient",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = EstimationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bhhh" => Ok(Algorithm::Bhhh),
            "bfgs" => Ok(Algorithm::Bfgs),
            "dfp" => Ok(Algorithm::Dfp),
            "dfpj" => Ok(Algorithm::DfpJ),
            "gradient" => Ok(Algorithm::Gradient),
            _ => Err(EstimationError::InvalidAlgorithm {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'bhhh', 'bfgs', 'dfp', 'dfpj' or 'gradient'.",
            }),
        }
    }
}

/// One strategy pack: a direction algorithm plus its line-search and
/// convergence settings.
///
/// Defaults: initial step 1, minimum relative move 1e-10, extend ×2,
/// retract ×0.5, tolerance 1e-10 on `gᵀ B⁻¹ g`, no per-strategy iteration
/// cap.
///
/// Gains are measured against the total gain since the starting point.
/// An accepted step gaining at most `gain_tolerance` (1e-14) of it
/// converges; `patience` (5) consecutive steps each gaining less than
/// `min_improvement` (1e-12) of it are slow progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub algorithm: Algorithm,
    pub initial_step: f64,
    pub min_step: f64,
    pub extend: f64,
    pub retract: f64,
    pub tolerance: f64,
    pub gain_tolerance: f64,
    pub min_improvement: f64,
    pub patience: usize,
    pub max_iter: Option<usize>,
}

impl StrategyConfig {
    /// # Errors
    /// - `InvalidStep` unless `0 < min_step <= initial_step`, `extend >= 1`
    ///   and `0 < retract < 1`, all finite.
    /// - `InvalidTolerance` for a negative or non-finite `tolerance` or
    ///   `min_improvement`.
    /// - `InvalidMaxIter` for `patience == 0` or `max_iter == Some(0)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        algorithm: Algorithm, initial_step: f64, min_step: f64, extend: f64, retract: f64,
        tolerance: f64, min_improvement: f64, patience: usize, max_iter: Option<usize>,
    ) -> EstResult<Self> {
        verify_positive_step(initial_step, "Initial step must be finite and positive.")?;
        verify_positive_step(min_step, "Minimum step must be finite and positive.")?;
        if min_step > initial_step {
            return Err(EstimationError::InvalidStep {
                value: min_step,
                reason: "Minimum step must not exceed the initial step.",
            });
        }
        if !extend.is_finite() || extend < 1.0 {
            return Err(EstimationError::InvalidStep {
                value: extend,
                reason: "Extend factor must be finite and at least one.",
            });
        }
        if !retract.is_finite() || retract <= 0.0 || retract >= 1.0 {
            return Err(EstimationError::InvalidStep {
                value: retract,
                reason: "Retract factor must lie strictly between zero and one.",
            });
        }
        verify_tolerance(tolerance)?;
        verify_tolerance(min_improvement)?;
        if patience == 0 {
            return Err(EstimationError::InvalidMaxIter {
                max_iter: patience,
                reason: "Slow-progress patience must be greater than zero.",
            });
        }
        if let Some(0) = max_iter {
            return Err(EstimationError::InvalidMaxIter {
                max_iter: 0,
                reason: "Maximum iterations must be greater than zero.",
            });
        }
        Ok(Self {
            algorithm,
            initial_step,
            min_step,
            extend,
            retract,
            tolerance,
            gain_tolerance: Self::default().gain_tolerance,
            min_improvement,
            patience,
            max_iter,
        })
    }

    /// Default settings for `algorithm`.
    pub fn of(algorithm: Algorithm) -> Self {
        Self { algorithm, ..Self::default() }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> EstResult<Self> {
        verify_tolerance(tolerance)?;
        self.tolerance = tolerance;
        Ok(self)
    }

    /// # Errors
    /// `InvalidTolerance` for a negative or non-finite value.
    pub fn with_gain_tolerance(mut self, gain_tolerance: f64) -> EstResult<Self> {
        verify_tolerance(gain_tolerance)?;
        self.gain_tolerance = gain_tolerance;
        Ok(self)
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> EstResult<Self> {
        if max_iter == 0 {
            return Err(EstimationError::InvalidMaxIter {
                max_iter,
                reason: "Maximum iterations must be greater than zero.",
            });
        }
        self.max_iter = Some(max_iter);
        Ok(self)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Bfgs,
            initial_step: 1.0,
            min_step: 1e-10,
            extend: 2.0,
            retract: 0.5,
            tolerance: 1e-10,
            gain_tolerance: 1e-14,
            min_improvement: 1e-12,
            patience: 5,
            max_iter: None,
        }
    }
}

/// Strategy list used when `maximize` is given none: BFGS, then BHHH, then
/// plain gradient ascent.
pub fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig::of(Algorithm::Bfgs),
        StrategyConfig::of(Algorithm::Bhhh),
        StrategyConfig::of(Algorithm::Gradient),
    ]
}

// ---- Helper methods ----

fn verify_positive_step(value: f64, reason: &'static str) -> EstResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EstimationError::InvalidStep { value, reason });
    }
    Ok(())
}

fn verify_tolerance(tol: f64) -> EstResult<()> {
    if !tol.is_finite() {
        return Err(EstimationError::InvalidTolerance { tol, reason: "Tolerance must be finite." });
    }
    if tol < 0.0 {
        return Err(EstimationError::InvalidTolerance {
            tol,
            reason: "Tolerance must be non-negative.",
        });
    }
    Ok(())
}
