//! estimation::engine — the quasi-Newton maximum-likelihood engine.
//!
//! Purpose
//! -------
//! Own the parameter state and the cached evaluation pipeline, and drive
//! them through the iteration loop: evaluate, test convergence, find a
//! direction, line-search along it, accept the step, repeat. After the run,
//! compute covariance matrices and standard errors at the best point.
//!
//! Key behaviors
//! -------------
//! - [`Estimator::maximize`] runs a list of strategy packs
//!   ([`StrategyConfig`]) in order. Each pack iterates with its own
//!   direction-finding algorithm until it converges, stalls, gets stuck or
//!   exhausts its budget; the next pack then continues from the best point
//!   so far. Convergence or the global iteration cap ends the run.
//! - Convergence statistic: `gᵀ B⁺ g` over the free parameters, with `B`
//!   the BHHH matrix. It is stored in the cache next to the point.
//! - A pack also converges when an accepted step gains at most
//!   `gain_tolerance` of the total gain since the start, and ends as `Slow`
//!   after `patience` steps each gaining less than `min_improvement` of it.
//!   With a single case `gᵀ B⁺ g` is identically 1, so the gain test is the
//!   only way such a model converges.
//! - Line-search failures are handled inside the loop:
//!   no improvement → `Stuck`, NaN at the minimum step → `Error`; both end
//!   the current pack, not the run.
//! - The best parameter vector is restored into `current` on every exit,
//!   including fatal errors.
//!
//! Invariants & assumptions
//! ------------------------
//! - Holdfast entries are never written by the loop; every accepted point
//!   lies within the bounds.
//! - The best objective never decreases during a run.
//! - One estimator is driven from one thread; only case evaluation fans
//!   out to workers.
//!
//! Conventions
//! -----------
//! - Result codes and stop reasons are kept in an [`EstimationSummary`];
//!   `maximize` returns the stop reason.
//! - Full-size matrices have zero rows and columns for holdfast
//!   parameters; `*_free` accessors return the free restriction.
//!
//! Downstream usage
//! ----------------
//! - Build with [`Estimator::new`], register parameters, call
//!   [`Estimator::maximize`], then [`Estimator::calculate_errors`] and
//!   read [`ParameterState::records`].
//!
//! Testing notes
//! -------------
//! - Unit tests below cover convergence, holdfast, NaN handling, strategy
//!   fallback and diagnostics on small closed-form models.
//! - End-to-end scenarios over `CaseTable` live in `tests/`.
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::data::provider::CaseProvider;
use crate::estimation::directions::{DirectionInput, Turn, strategy_for};
use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::evaluate::{Evaluation, Evaluator};
use crate::estimation::finite_diff::{max_relative_discrepancy, numeric_gradient};
use crate::estimation::line_search::{Bounds, LineSearchOutcome, line_search};
use crate::estimation::linalg::pseudo_inverse;
use crate::estimation::options::{EvalOptions, StrategyConfig, default_strategies};
use crate::estimation::params::{
    ParameterState, free_to_full, full_to_free, hessfree_to_hessfull, hessfull_to_hessfree,
};
use crate::estimation::status::{
    EstimationSummary, ResultCode, StatusColumns, StatusFlags, render_status,
};
use crate::estimation::traits::LogLikelihood;
use crate::estimation::types::{Bhhh, Grad, Hessian, Theta};
use crate::inference::{
    LikelihoodRatio, covariance_from_hessian, sandwich_covariance, standard_errors,
};

/// Gradient remembered for `gradient(false)`.
#[derive(Debug, Clone)]
struct LastGradient {
    theta: Theta,
    holdfast: Vec<bool>,
    gradient: Grad,
}

/// Running totals across strategy packs.
#[derive(Debug, Clone)]
struct RunState {
    max_iter: usize,
    iterations: usize,
    start_loglike: f64,
    best_loglike: f64,
    trace: Vec<f64>,
}

/// Maximum-likelihood estimator over a case-wise model.
pub struct Estimator<M> {
    params: ParameterState,
    evaluator: Evaluator<M>,
    last_gradient: Option<LastGradient>,
    direction: Option<Theta>,
    summary: Option<EstimationSummary>,
    inv_hessian: Option<Array2<f64>>,
    robust_covariance: Option<Array2<f64>>,
}

impl<M: LogLikelihood> Estimator<M> {
    pub fn new(model: M, provider: Arc<dyn CaseProvider>, options: EvalOptions) -> Self {
        Self {
            params: ParameterState::new(),
            evaluator: Evaluator::new(model, provider, options),
            last_gradient: None,
            direction: None,
            summary: None,
            inv_hessian: None,
            robust_covariance: None,
        }
    }

    // ---- Parameters ----

    /// Register a parameter; see [`ParameterState::add_parameter`].
    pub fn add_parameter(
        &mut self, name: &str, initial: f64, null: f64, min: f64, max: f64, holdfast: bool,
    ) -> EstResult<usize> {
        let slot = self.params.add_parameter(name, initial, null, min, max, holdfast)?;
        self.invalidate();
        Ok(slot)
    }

    pub fn params(&self) -> &ParameterState {
        &self.params
    }

    /// Mutable access for setting values, bounds and flags. Results from a
    /// previous run stay available through [`summary`](Self::summary).
    pub fn params_mut(&mut self) -> &mut ParameterState {
        &mut self.params
    }

    pub fn evaluator(&self) -> &Evaluator<M> {
        &self.evaluator
    }

    pub fn model(&self) -> &M {
        self.evaluator.model()
    }

    // ---- Evaluation ----

    /// Log-likelihood at the current parameters (cached).
    pub fn objective(&mut self) -> EstResult<f64> {
        let theta = self.params.current().clone();
        self.evaluator.objective(&theta)
    }

    /// Gradient at the current parameters.
    ///
    /// Reuses the most recent gradient unless `force_recalculate` is set or
    /// the current parameters (or holdfast mask) changed since. A forced
    /// recalculation bypasses the cache.
    pub fn gradient(&mut self, force_recalculate: bool) -> EstResult<Grad> {
        let theta = self.params.current().clone();
        let holdfast = self.params.holdfast_mask().to_vec();
        if !force_recalculate {
            if let Some(last) = &self.last_gradient {
                if last.theta == theta && last.holdfast == holdfast {
                    return Ok(last.gradient.clone());
                }
            }
        }
        let eval = if force_recalculate {
            self.evaluator.full_evaluation(&theta, &holdfast, true)?
        } else {
            self.evaluator.derivatives(&theta, &holdfast)?
        };
        self.remember_gradient(theta, holdfast, &eval.gradient);
        Ok(eval.gradient)
    }

    /// Evaluate at the current parameters without the cache shortcut.
    pub fn full_evaluation(&mut self, with_derivatives: bool) -> EstResult<Evaluation> {
        let theta = self.params.current().clone();
        let holdfast = self.params.holdfast_mask().to_vec();
        let eval = self.evaluator.full_evaluation(&theta, &holdfast, with_derivatives)?;
        if with_derivatives {
            self.remember_gradient(theta, holdfast, &eval.gradient);
        }
        Ok(eval)
    }

    /// Log-likelihood at the null values.
    pub fn loglike_null(&mut self) -> EstResult<f64> {
        let null = self.params.null_values();
        self.evaluator.objective(&null)
    }

    pub fn clear_cache(&mut self) {
        self.evaluator.clear_cache();
        self.last_gradient = None;
    }

    // ---- Optimization ----

    /// Maximize the log-likelihood and return the stop reason.
    ///
    /// `strategies = None` (or an empty list) runs [`default_strategies`].
    /// On return `current` holds the best parameters found, also when an
    /// error is returned.
    ///
    /// # Errors
    /// - `InvalidMaxIter` if `max_iter == 0`.
    /// - `InvalidBounds` if a current value lies outside its bounds.
    /// - `NonFiniteValue` if the starting log-likelihood is not finite.
    /// - Any fatal evaluation error (invalid cases, zero probability, model
    ///   errors).
    pub fn maximize(
        &mut self, max_iter: usize, strategies: Option<Vec<StrategyConfig>>,
    ) -> EstResult<String> {
        if max_iter == 0 {
            return Err(EstimationError::InvalidMaxIter { max_iter, reason: "Must be positive." });
        }
        let strategies = match strategies {
            Some(list) if !list.is_empty() => list,
            _ => default_strategies(),
        };
        self.params.validate_current()?;
        self.params.mark_best();
        self.direction = None;

        let outcome = self.run(max_iter, &strategies);
        self.params.restore_best();
        let summary = outcome?;

        log::info!(
            "[mle] finished: {} after {} iterations (ℓ {:.6} → {:.6}): {}",
            summary.code,
            summary.iterations,
            summary.starting_loglike,
            summary.best_loglike,
            summary.explain_stop
        );
        let explain = summary.explain_stop.clone();
        self.summary = Some(summary);
        Ok(explain)
    }

    pub fn summary(&self) -> Option<&EstimationSummary> {
        self.summary.as_ref()
    }

    pub fn best_loglike(&self) -> Option<f64> {
        self.summary.as_ref().map(|s| s.best_loglike)
    }

    /// Direction used by the most recent iteration.
    pub fn direction(&self) -> Option<&Theta> {
        self.direction.as_ref()
    }

    // ---- Diagnostics ----

    /// Finite-difference Hessian at the current parameters.
    pub fn finite_diff_hessian(&self) -> EstResult<Hessian> {
        self.evaluator.finite_diff_hessian(self.params.current(), self.params.holdfast_mask())
    }

    /// Largest relative discrepancy between the model's analytic gradient
    /// and a central-difference gradient of the objective.
    ///
    /// # Errors
    /// - `GradientNotImplemented` if the model has no case scores.
    pub fn gradient_diagnostic(&self) -> EstResult<f64> {
        let theta = self.params.current();
        let holdfast = self.params.holdfast_mask();
        let analytic = self.evaluator.analytic_derivatives(theta, holdfast)?.gradient;
        let numeric = numeric_gradient(|t| self.evaluator.loglike_uncached(t), theta, holdfast)?;
        Ok(max_relative_discrepancy(&analytic, &numeric))
    }

    /// Largest relative discrepancy between the model's analytic Hessian
    /// and finite differences of the gradient, over free parameters.
    ///
    /// # Errors
    /// - `HessianNotImplemented` if the model has no analytic Hessian.
    pub fn hessian_diagnostic(&self) -> EstResult<f64> {
        let theta = self.params.current();
        let holdfast = self.params.holdfast_mask();
        let analytic = hessfull_to_hessfree(&self.evaluator.analytic_hessian(theta)?, holdfast);
        let numeric =
            hessfull_to_hessfree(&self.evaluator.finite_diff_hessian(theta, holdfast)?, holdfast);
        Ok(max_relative_discrepancy(&analytic, &numeric))
    }

    pub fn print_status(&self, flags: StatusFlags) -> String {
        let current = self.params.current();
        let gradient = self
            .last_gradient
            .as_ref()
            .filter(|last| &last.theta == current)
            .map(|last| &last.gradient);
        let columns = StatusColumns {
            names: self.params.names(),
            current,
            last_turn: self.params.last_turn(),
            direction: self.direction.as_ref(),
            gradient,
        };
        render_status(&columns, flags)
    }

    // ---- Inference ----

    /// Covariance matrices and standard errors at the best parameters.
    ///
    /// Uses the model's analytic Hessian when available, otherwise finite
    /// differences. Holdfast parameters get NaN errors and zero rows and
    /// columns in both matrices.
    pub fn calculate_errors(&mut self) -> EstResult<()> {
        let theta = self.params.best().clone();
        let holdfast = self.params.holdfast_mask().to_vec();
        let n = theta.len();

        let hessian = self.evaluator.hessian(&theta, &holdfast)?;
        let eval = self.evaluator.derivatives(&theta, &holdfast)?;
        let h_free = hessfull_to_hessfree(&hessian, &holdfast);
        let b_free = hessfull_to_hessfree(&eval.bhhh, &holdfast);

        let (cov_free, rank) = covariance_from_hessian(&h_free);
        if rank < h_free.nrows() {
            log::warn!(
                "[mle] Hessian has rank {rank} of {}; some errors are understated",
                h_free.nrows()
            );
        }
        let robust_free = sandwich_covariance(&cov_free, &b_free);

        let nan = Array1::from_elem(n, f64::NAN);
        let se = free_to_full(&standard_errors(&cov_free), &nan, &holdfast);
        let robust_se = free_to_full(&standard_errors(&robust_free), &nan, &holdfast);
        self.params.set_standard_errors(&se, &robust_se);
        self.inv_hessian = Some(hessfree_to_hessfull(&cov_free, &holdfast));
        self.robust_covariance = Some(hessfree_to_hessfull(&robust_free, &holdfast));
        Ok(())
    }

    /// `(-H)⁺` from the last [`calculate_errors`](Self::calculate_errors).
    pub fn inverse_hessian(&self) -> Option<&Array2<f64>> {
        self.inv_hessian.as_ref()
    }

    pub fn robust_covariance(&self) -> Option<&Array2<f64>> {
        self.robust_covariance.as_ref()
    }

    pub fn inverse_hessian_free(&self) -> Option<Array2<f64>> {
        let holdfast = self.params.holdfast_mask();
        self.inv_hessian.as_ref().map(|m| hessfull_to_hessfree(m, holdfast))
    }

    pub fn robust_covariance_free(&self) -> Option<Array2<f64>> {
        let holdfast = self.params.holdfast_mask();
        self.robust_covariance.as_ref().map(|m| hessfull_to_hessfree(m, holdfast))
    }

    /// Likelihood-ratio test of the best point against `null_loglike`, with
    /// one degree of freedom per free parameter.
    pub fn likelihood_ratio_test(&mut self, null_loglike: f64) -> EstResult<LikelihoodRatio> {
        let model_ll = match self.best_loglike() {
            Some(ll) => ll,
            None => {
                let best = self.params.best().clone();
                self.evaluator.objective(&best)?
            }
        };
        Ok(LikelihoodRatio::new(model_ll, null_loglike, self.params.free_count()))
    }

    // ---- Helper methods ----

    fn invalidate(&mut self) {
        self.last_gradient = None;
        self.direction = None;
        self.inv_hessian = None;
        self.robust_covariance = None;
    }

    fn remember_gradient(&mut self, theta: Theta, holdfast: Vec<bool>, gradient: &Grad) {
        self.last_gradient = Some(LastGradient { theta, holdfast, gradient: gradient.clone() });
    }

    fn run(&mut self, max_iter: usize, strategies: &[StrategyConfig]) -> EstResult<EstimationSummary> {
        let start = self.params.current().clone();
        self.evaluator.model().check(&start, self.evaluator.provider())?;
        let starting_loglike = self.evaluator.objective(&start)?;
        if !starting_loglike.is_finite() {
            return Err(EstimationError::NonFiniteValue {
                what: "starting log-likelihood",
                value: starting_loglike,
            });
        }
        log::info!(
            "[mle] maximize: {} parameters ({} free), starting ℓ = {:.6}",
            self.params.len(),
            self.params.free_count(),
            starting_loglike
        );

        let mut run = RunState {
            max_iter,
            iterations: 0,
            start_loglike: starting_loglike,
            best_loglike: starting_loglike,
            trace: vec![starting_loglike],
        };
        let (code, explain_stop) = if self.params.free_count() == 0 {
            (ResultCode::Stuck, "no free parameters".to_string())
        } else {
            let mut last = (ResultCode::Stuck, String::new());
            for (k, config) in strategies.iter().enumerate() {
                if k > 0 {
                    log::info!("[mle] switching to {} after: {}", config.algorithm, last.1);
                }
                last = self.run_pack(config, k + 1 == strategies.len(), &mut run)?;
                if matches!(last.0, ResultCode::Success | ResultCode::MaxIterations) {
                    break;
                }
            }
            last
        };

        Ok(EstimationSummary {
            starting_loglike,
            best_loglike: run.best_loglike,
            code,
            explain_stop,
            iterations: run.iterations,
            best_trace: run.trace,
        })
    }

    /// Iterate one strategy pack until it reaches a terminal code.
    fn run_pack(
        &mut self, config: &StrategyConfig, is_last: bool, run: &mut RunState,
    ) -> EstResult<(ResultCode, String)> {
        let alg = config.algorithm;
        let holdfast = self.params.holdfast_mask().to_vec();
        let min = self.params.min_values().to_vec();
        let max = self.params.max_values().to_vec();
        let mut strategy = strategy_for(alg);
        let mut previous: Option<(Theta, Grad)> = None;
        let mut pack_iterations = 0;
        let mut slow_streak = 0;

        loop {
            let theta = self.params.current().clone();
            let eval = self.evaluator.derivatives(&theta, &holdfast)?;
            self.remember_gradient(theta.clone(), holdfast.clone(), &eval.gradient);

            let tolerance = convergence_statistic(&eval.gradient, &eval.bhhh, &holdfast);
            self.evaluator.store_tolerance(&theta, tolerance);
            if tolerance.is_nan() {
                return Ok((ResultCode::NanTolerance, format!("{alg}: convergence statistic is NaN")));
            }
            if tolerance < config.tolerance {
                return Ok((
                    ResultCode::Success,
                    format!("converged: tolerance {tolerance:.3e} < {:.3e}", config.tolerance),
                ));
            }
            if run.iterations >= run.max_iter {
                return Ok((
                    ResultCode::MaxIterations,
                    format!("reached the maximum of {} iterations", run.max_iter),
                ));
            }
            if let Some(cap) = config.max_iter.filter(|&cap| pack_iterations >= cap) {
                return Ok((ResultCode::Improved, format!("{alg}: iteration cap of {cap} reached")));
            }

            let turn = previous.as_ref().map(|(t, g)| Turn {
                step: &theta - t,
                gradient_change: &eval.gradient - g,
            });
            let input = DirectionInput {
                gradient: &eval.gradient,
                bhhh: &eval.bhhh,
                holdfast: &holdfast,
                turn: turn.as_ref(),
            };
            let direction = match strategy.find(&input) {
                Ok(Some(d)) => d,
                Ok(None) => {
                    return Ok((ResultCode::Stuck, format!("{alg}: no usable ascent direction")));
                }
                Err(EstimationError::SingularMatrix { what }) if !is_last => {
                    log::warn!("[mle] {alg}: {what} cannot be inverted");
                    return Ok((ResultCode::Stuck, format!("{alg}: {what} cannot be inverted")));
                }
                Err(e) => return Err(e),
            };
            self.direction = Some(direction.clone());

            let bounds = Bounds { min: &min, max: &max, holdfast: &holdfast };
            let evaluator = &mut self.evaluator;
            let search = line_search(
                |t| evaluator.objective(t),
                &theta,
                eval.loglike,
                &direction,
                &bounds,
                config,
            )?;
            log::debug!(
                "[mle] {alg} iter {}: ℓ = {:.9}, tol = {:.3e}, step = {:.3e}, {}",
                run.iterations + 1,
                eval.loglike,
                tolerance,
                search.step,
                search.outcome
            );
            match search.outcome {
                LineSearchOutcome::NoImprovement => {
                    let reason = format!("{alg}: line search found no improving step");
                    return Ok((ResultCode::Stuck, reason));
                }
                LineSearchOutcome::Nan => {
                    let reason = format!("{alg}: log-likelihood is NaN at the minimum step");
                    return Ok((ResultCode::Error, reason));
                }
                LineSearchOutcome::SuccessBig | LineSearchOutcome::SuccessSmall => {}
            }

            self.params.shift_last_turn();
            self.params.set_current(&search.theta)?;
            previous = Some((theta, eval.gradient));
            run.iterations += 1;
            pack_iterations += 1;

            let gain = search.loglike - run.best_loglike;
            if search.loglike > run.best_loglike {
                self.params.mark_best();
                run.best_loglike = search.loglike;
            }
            run.trace.push(run.best_loglike);

            let total_gain = run.best_loglike - run.start_loglike;
            if gain <= config.gain_tolerance * total_gain {
                return Ok((
                    ResultCode::Success,
                    format!(
                        "converged: gain {gain:.3e} <= {:.3e} of the total gain {total_gain:.3e}",
                        config.gain_tolerance
                    ),
                ));
            }
            if gain < config.min_improvement * total_gain {
                slow_streak += 1;
                if slow_streak >= config.patience.max(1) {
                    let reason = format!(
                        "{alg}: gain below {:.3e} of the total for {slow_streak} iterations",
                        config.min_improvement
                    );
                    return Ok((ResultCode::Slow, reason));
                }
            } else {
                slow_streak = 0;
            }
        }
    }
}

/// `gᵀ B⁺ g` over the free parameters; NaN if either input is not finite.
fn convergence_statistic(gradient: &Grad, bhhh: &Bhhh, holdfast: &[bool]) -> f64 {
    if !gradient.iter().chain(bhhh.iter()).all(|v| v.is_finite()) {
        return f64::NAN;
    }
    let g = full_to_free(gradient, holdfast);
    let (pinv, _) = pseudo_inverse(&hessfull_to_hessfree(bhhh, holdfast));
    g.dot(&pinv.dot(&g))
}
