//! estimation::line_search — bounded step search along a fixed direction.
//!
//! Purpose
//! -------
//! Find a step multiplier `t` such that `ℓ(θ + t·d) > ℓ(θ)`, starting from
//! the strategy's initial step, expanding while the objective keeps
//! improving and contracting when it does not.
//!
//! Key behaviors
//! -------------
//! - The step is first clipped to the largest multiplier that keeps every
//!   free parameter inside `[min, max]`; trial points are additionally
//!   clamped and holdfast entries are copied from the current point
//!   unchanged.
//! - First trial improves → [`LineSearchOutcome::SuccessBig`]; the search
//!   then multiplies the step by `extend` while the objective keeps
//!   improving (at most [`MAX_EXPANSIONS`] times, never past the bound
//!   ceiling) and keeps the best trial.
//! - First trial fails → contract by `retract` until a trial improves
//!   ([`LineSearchOutcome::SuccessSmall`]) or the largest relative move of
//!   a free parameter, `t · max |dᵢ| / max(1, |θᵢ|)`, falls below
//!   `min_step` ([`LineSearchOutcome::NoImprovement`]). The floor is thus
//!   measured in parameter space and does not depend on the direction's
//!   magnitude.
//! - A NaN objective at an intermediate trial is treated as a failed trial;
//!   NaN at the last (minimum) trial yields [`LineSearchOutcome::Nan`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Every accepted point satisfies the bounds and has holdfast entries
//!   bit-identical to the current point.
//! - Errors returned by the objective (model errors, zero probability,
//!   invalid cases) are fatal and propagate unchanged.
use std::fmt;

use ndarray::Array1;

use crate::estimation::errors::EstResult;
use crate::estimation::options::StrategyConfig;
use crate::estimation::types::Theta;

/// Upper bound on step expansions after a first-trial success.
pub const MAX_EXPANSIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchOutcome {
    SuccessBig,
    SuccessSmall,
    NoImprovement,
    Nan,
}

impl LineSearchOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, LineSearchOutcome::SuccessBig | LineSearchOutcome::SuccessSmall)
    }
}

impl fmt::Display for LineSearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineSearchOutcome::SuccessBig => "success (initial step)",
            LineSearchOutcome::SuccessSmall => "success (reduced step)",
            LineSearchOutcome::NoImprovement => "no improvement",
            LineSearchOutcome::Nan => "NaN at minimum step",
        };
        f.write_str(s)
    }
}

/// Box constraints seen by the search.
#[derive(Debug, Clone, Copy)]
pub struct Bounds<'a> {
    pub min: &'a [f64],
    pub max: &'a [f64],
    pub holdfast: &'a [bool],
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineSearchResult {
    pub outcome: LineSearchOutcome,
    /// Accepted multiplier (0 when nothing was accepted).
    pub step: f64,
    /// Accepted point (the current point when nothing was accepted).
    pub theta: Theta,
    pub loglike: f64,
    pub trials: usize,
}

/// Largest `t >= 0` keeping `current + t·direction` inside the bounds on
/// every free coordinate.
pub fn max_feasible_step(current: &Theta, direction: &Theta, bounds: &Bounds<'_>) -> f64 {
    let mut limit = f64::INFINITY;
    for i in 0..current.len() {
        let d = direction[i];
        if bounds.holdfast[i] || d == 0.0 {
            continue;
        }
        let room = if d > 0.0 { bounds.max[i] - current[i] } else { bounds.min[i] - current[i] };
        let t = (room / d).max(0.0);
        if t < limit {
            limit = t;
        }
    }
    limit
}

/// Largest relative displacement per unit step over the free coordinates.
pub fn displacement_scale(current: &Theta, direction: &Theta, bounds: &Bounds<'_>) -> f64 {
    let mut scale = 0.0_f64;
    for i in 0..current.len() {
        if bounds.holdfast[i] {
            continue;
        }
        scale = scale.max(direction[i].abs() / current[i].abs().max(1.0));
    }
    scale
}

/// `current + step·direction`, clamped to the bounds, holdfast entries
/// copied exactly.
pub fn trial_point(current: &Theta, direction: &Theta, step: f64, bounds: &Bounds<'_>) -> Theta {
    Array1::from_shape_fn(current.len(), |i| {
        if bounds.holdfast[i] {
            current[i]
        } else {
            (current[i] + step * direction[i]).max(bounds.min[i]).min(bounds.max[i])
        }
    })
}

/// Search along `direction` from `current` (objective `current_ll`).
///
/// # Errors
/// Any error returned by `objective`.
pub fn line_search<F>(
    mut objective: F, current: &Theta, current_ll: f64, direction: &Theta, bounds: &Bounds<'_>,
    config: &StrategyConfig,
) -> EstResult<LineSearchResult>
where
    F: FnMut(&Theta) -> EstResult<f64>,
{
    let ceiling = max_feasible_step(current, direction, bounds);
    let rejected = |outcome, trials| LineSearchResult {
        outcome,
        step: 0.0,
        theta: current.clone(),
        loglike: current_ll,
        trials,
    };
    if !(ceiling > 0.0) {
        return Ok(rejected(LineSearchOutcome::NoImprovement, 0));
    }

    let scale = displacement_scale(current, direction, bounds);
    let mut step = config.initial_step.min(ceiling);
    let mut trials = 0;
    let mut first = true;
    loop {
        let theta = trial_point(current, direction, step, bounds);
        let ll = objective(&theta)?;
        trials += 1;
        if ll > current_ll {
            let outcome =
                if first { LineSearchOutcome::SuccessBig } else { LineSearchOutcome::SuccessSmall };
            let mut accepted = LineSearchResult { outcome, step, theta, loglike: ll, trials };
            if first {
                expand(&mut objective, current, direction, bounds, config, ceiling, &mut accepted)?;
            }
            return Ok(accepted);
        }
        let next = step * config.retract;
        if !(next * scale >= config.min_step) {
            let outcome =
                if ll.is_nan() { LineSearchOutcome::Nan } else { LineSearchOutcome::NoImprovement };
            return Ok(rejected(outcome, trials));
        }
        if ll.is_nan() {
            log::debug!("[mle] line search: NaN at step {step:.3e}; contracting");
        }
        step = next;
        first = false;
    }
}

// ---- Helper methods ----

fn expand<F>(
    objective: &mut F, current: &Theta, direction: &Theta, bounds: &Bounds<'_>,
    config: &StrategyConfig, ceiling: f64, accepted: &mut LineSearchResult,
) -> EstResult<()>
where
    F: FnMut(&Theta) -> EstResult<f64>,
{
    for _ in 0..MAX_EXPANSIONS {
        let next = (accepted.step * config.extend).min(ceiling);
        if !(next > accepted.step) {
            break;
        }
        let theta = trial_point(current, direction, next, bounds);
        let ll = objective(&theta)?;
        accepted.trials += 1;
        if !(ll > accepted.loglike) {
            break;
        }
        accepted.step = next;
        accepted.theta = theta;
        accepted.loglike = ll;
    }
    Ok(())
}
