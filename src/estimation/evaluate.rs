//! estimation::evaluate — cached, case-wise evaluation of ℓ, ∇ℓ and BHHH.
//!
//! Purpose
//! -------
//! Turn a parameter vector into the quantities the engine needs (the
//! log-likelihood, its gradient, and the BHHH outer-product matrix) by
//! summing per-case contributions from the model over every case in the
//! provider. Results are memoized in a [`ResultCache`] keyed on the exact
//! parameter vector.
//!
//! Key behaviors
//! -------------
//! - One *pass* visits every case once, on the calling thread or fanned out
//!   with [`parallel_for`] when [`EvalOptions::dispatch_parallel`] says so.
//!   Each worker fills its own [`CaseAccumulator`]; the parts are folded
//!   with [`merge_into`] after the join.
//! - Every pass reads through one [`CaseReader`], which pins the current
//!   batch and holds the provider's read lock until the pass ends.
//! - Case scores come from [`LogLikelihood::case_score`] when the model
//!   provides it. Otherwise each free parameter is perturbed by `±h` and
//!   two case-wise passes give per-case central differences, from which
//!   both the gradient and BHHH are formed. Holdfast entries are zero.
//! - A zero-probability case (`ℓ_c = -inf`) is fatal unless
//!   `mute_zero_probability` is set, in which case it flows into the total.
//! - Cases the provider cannot resolve are collected across the whole pass
//!   and reported together in one `InvalidCases` error, unless
//!   `skip_invalid` is set; skipped cases contribute nothing.
//!
//! Invariants & assumptions
//! ------------------------
//! - The cache is touched only from `&mut self` methods on the engine
//!   thread, never from inside a pass.
//! - Changing the holdfast mask invalidates cached derivatives, so the cache
//!   is cleared whenever a different mask is seen.
//! - `*_uncached` methods never read or write the cache.
//!
//! Conventions
//! -----------
//! - Case weights multiply contributions: `ℓ = Σ w_c ℓ_c`,
//!   `∇ℓ = Σ w_c s_c`, `BHHH = Σ w_c s_c s_cᵀ`. Zero-weight cases are
//!   visited but add nothing.
use std::borrow::Cow;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{Array1, Array2, Axis};

use crate::cache::ResultCache;
use crate::data::provider::{CaseFault, CaseProvider, CaseReader};
use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::finite_diff::finite_diff_hessian;
use crate::estimation::options::EvalOptions;
use crate::estimation::params::free_indices;
use crate::estimation::traits::LogLikelihood;
use crate::estimation::types::{Bhhh, Grad, Hessian, Theta};
use crate::estimation::validation::{validate_grad, validate_hessian};
use crate::parallel::{merge_into, parallel_for, sequential_for};

/// Log-likelihood with first-order information at one parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub loglike: f64,
    pub gradient: Grad,
    pub bhhh: Bhhh,
}

/// One case's unweighted contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseValue {
    pub case: usize,
    pub weight: f64,
    pub loglike: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Loglike,
    Casewise,
    Scores,
}

/// Per-worker partial results of one pass.
#[derive(Debug, Clone)]
struct CaseAccumulator {
    kind: PassKind,
    loglike: f64,
    gradient: Grad,
    bhhh: Bhhh,
    scratch: Grad,
    casewise: Vec<CaseValue>,
    invalid_codes: BTreeSet<i64>,
    invalid_cases: usize,
    skipped: usize,
    error: Option<EstimationError>,
}

impl CaseAccumulator {
    fn template(kind: PassKind, n_params: usize) -> Self {
        let n = if kind == PassKind::Scores { n_params } else { 0 };
        Self {
            kind,
            loglike: 0.0,
            gradient: Array1::zeros(n),
            bhhh: Array2::zeros((n, n)),
            scratch: Array1::zeros(n),
            casewise: Vec::new(),
            invalid_codes: BTreeSet::new(),
            invalid_cases: 0,
            skipped: 0,
            error: None,
        }
    }

    fn record_error(&mut self, err: EstimationError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn absorb(&mut self, other: CaseAccumulator) {
        self.loglike += other.loglike;
        if self.kind == PassKind::Scores {
            self.gradient += &other.gradient;
            self.bhhh += &other.bhhh;
        }
        self.casewise.extend(other.casewise);
        self.invalid_codes.extend(other.invalid_codes);
        self.invalid_cases += other.invalid_cases;
        self.skipped += other.skipped;
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

/// Cached evaluation pipeline over a model and a case provider.
pub struct Evaluator<M> {
    model: M,
    provider: Arc<dyn CaseProvider>,
    options: EvalOptions,
    cache: ResultCache,
    holdfast_seen: Vec<bool>,
    analytic_scores: Cell<Option<bool>>,
    warned_skip: Cell<bool>,
}

impl<M: LogLikelihood> Evaluator<M> {
    pub fn new(model: M, provider: Arc<dyn CaseProvider>, options: EvalOptions) -> Self {
        Self {
            model,
            provider,
            options,
            cache: ResultCache::new(),
            holdfast_seen: Vec::new(),
            analytic_scores: Cell::new(None),
            warned_skip: Cell::new(false),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn provider(&self) -> &dyn CaseProvider {
        self.provider.as_ref()
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    // ---- Cached entry points ----

    /// Log-likelihood at `theta`, from the cache when possible.
    pub fn objective(&mut self, theta: &Theta) -> EstResult<f64> {
        let key = cache_key(theta);
        if let Some(value) = self.cache.read_loglike(&key) {
            return Ok(value);
        }
        let value = self.loglike_uncached(theta)?;
        self.cache.store_loglike(&key, value);
        Ok(value)
    }

    /// Log-likelihood, gradient and BHHH at `theta`, from the cache when
    /// all three are present.
    pub fn derivatives(&mut self, theta: &Theta, holdfast: &[bool]) -> EstResult<Evaluation> {
        self.sync_holdfast(holdfast);
        let key = cache_key(theta);
        if let Some(hit) = self.cache.lookup(&key) {
            if let (Some(loglike), Some(gradient), Some(bhhh)) =
                (hit.loglike, hit.gradient.as_ref(), hit.information.as_ref())
            {
                return Ok(Evaluation { loglike, gradient: gradient.clone(), bhhh: bhhh.clone() });
            }
        }
        let eval = self.derivatives_uncached(theta, holdfast)?;
        self.store_evaluation(&key, &eval);
        Ok(eval)
    }

    /// Recompute at `theta` without consulting the cache, then overwrite the
    /// cached entry. Without derivatives the gradient and BHHH are empty.
    pub fn full_evaluation(
        &mut self, theta: &Theta, holdfast: &[bool], with_derivs: bool,
    ) -> EstResult<Evaluation> {
        self.sync_holdfast(holdfast);
        let key = cache_key(theta);
        if with_derivs {
            let eval = self.derivatives_uncached(theta, holdfast)?;
            self.store_evaluation(&key, &eval);
            Ok(eval)
        } else {
            let loglike = self.loglike_uncached(theta)?;
            self.cache.store_loglike(&key, loglike);
            Ok(Evaluation { loglike, gradient: Array1::zeros(0), bhhh: Array2::zeros((0, 0)) })
        }
    }

    /// Hessian at `theta`: the model's analytic one if provided, else finite
    /// differences of the gradient. Cached.
    pub fn hessian(&mut self, theta: &Theta, holdfast: &[bool]) -> EstResult<Hessian> {
        self.sync_holdfast(holdfast);
        let key = cache_key(theta);
        if let Some(h) = self.cache.read_hessian(&key) {
            return Ok(h.clone());
        }
        let h = match self.analytic_hessian(theta) {
            Ok(h) => h,
            Err(EstimationError::HessianNotImplemented) => self.finite_diff_hessian(theta, holdfast)?,
            Err(e) => return Err(e),
        };
        self.cache.store_hessian(&key, &h);
        Ok(h)
    }

    pub fn store_tolerance(&mut self, theta: &Theta, tolerance: f64) {
        self.cache.store_tolerance(&cache_key(theta), tolerance);
    }

    // ---- Uncached computations ----

    pub fn loglike_uncached(&self, theta: &Theta) -> EstResult<f64> {
        Ok(self.run_pass(theta, PassKind::Loglike)?.loglike)
    }

    /// Unweighted per-case log-likelihoods, in case order, skipping
    /// excluded cases.
    pub fn casewise_loglike(&self, theta: &Theta) -> EstResult<Vec<CaseValue>> {
        let mut values = self.run_pass(theta, PassKind::Casewise)?.casewise;
        values.sort_by_key(|v| v.case);
        Ok(values)
    }

    /// Gradient and BHHH from analytic case scores only.
    ///
    /// # Errors
    /// - `GradientNotImplemented` if the model has no case scores.
    pub fn analytic_derivatives(&self, theta: &Theta, holdfast: &[bool]) -> EstResult<Evaluation> {
        let acc = self.run_pass(theta, PassKind::Scores)?;
        let mut eval = Evaluation { loglike: acc.loglike, gradient: acc.gradient, bhhh: acc.bhhh };
        zero_holdfast(&mut eval, holdfast);
        Ok(eval)
    }

    /// Gradient and BHHH, analytic when available, else central differences.
    pub fn derivatives_uncached(&self, theta: &Theta, holdfast: &[bool]) -> EstResult<Evaluation> {
        if self.analytic_scores.get() != Some(false) {
            match self.analytic_derivatives(theta, holdfast) {
                Ok(eval) => {
                    self.analytic_scores.set(Some(true));
                    validate_grad_shape(&eval.gradient, theta.len())?;
                    return Ok(eval);
                }
                Err(EstimationError::GradientNotImplemented) => {
                    log::debug!("[mle] model has no case scores; using finite differences");
                    self.analytic_scores.set(Some(false));
                }
                Err(e) => return Err(e),
            }
        }
        self.fd_derivatives(theta, holdfast)
    }

    pub fn analytic_hessian(&self, theta: &Theta) -> EstResult<Hessian> {
        let h = self.model.hessian(theta, self.provider())?;
        validate_hessian(&h, theta.len())?;
        Ok(h)
    }

    pub fn finite_diff_hessian(&self, theta: &Theta, holdfast: &[bool]) -> EstResult<Hessian> {
        finite_diff_hessian(|t| Ok(self.derivatives_uncached(t, holdfast)?.gradient), theta, holdfast)
    }

    // ---- Helper methods ----

    /// Per-case central differences over the free parameters.
    fn fd_derivatives(&self, theta: &Theta, holdfast: &[bool]) -> EstResult<Evaluation> {
        let base = self.casewise_loglike(theta)?;
        let n = theta.len();
        let m = base.len();
        let weights: Array1<f64> = base.iter().map(|v| v.weight).collect();
        let loglike = base.iter().filter(|v| v.weight != 0.0).map(|v| v.weight * v.loglike).sum();

        let mut scores = Array2::<f64>::zeros((m, n));
        for i in free_indices(holdfast) {
            let h = self.options.fd_step * theta[i].abs().max(1.0);
            let mut up = theta.clone();
            up[i] += h;
            let mut down = theta.clone();
            down[i] -= h;
            let plus = self.casewise_loglike(&up)?;
            let minus = self.casewise_loglike(&down)?;
            if plus.len() != m || minus.len() != m {
                return Err(EstimationError::DimensionMismatch {
                    what: "case-wise pass",
                    expected: m,
                    found: plus.len().min(minus.len()),
                });
            }
            for (r, (p, q)) in plus.iter().zip(minus.iter()).enumerate() {
                scores[[r, i]] = (p.loglike - q.loglike) / (2.0 * h);
            }
        }

        let weighted = &scores * &weights.view().insert_axis(Axis(1));
        let gradient = weighted.sum_axis(Axis(0));
        let bhhh = weighted.t().dot(&scores);
        Ok(Evaluation { loglike, gradient, bhhh })
    }

    fn run_pass(&self, theta: &Theta, kind: PassKind) -> EstResult<CaseAccumulator> {
        let reader = self.provider().read_lock();
        let n_cases = reader.n_cases();
        let template = CaseAccumulator::template(kind, theta.len());
        let model = &self.model;
        let options = &self.options;
        let reader = &reader;
        let visit = |k: usize, acc: &mut CaseAccumulator| {
            visit_case(model, reader, theta, options, k, acc);
        };

        let total = if options.dispatch_parallel(n_cases) {
            let parts = parallel_for(0, n_cases, options.workers, &template, visit);
            let shared = Mutex::new(template);
            merge_into(&shared, parts, CaseAccumulator::absorb);
            shared.into_inner().unwrap_or_else(PoisonError::into_inner)
        } else {
            sequential_for(0, n_cases, &template, visit)
        };
        self.finish_pass(total)
    }

    fn finish_pass(&self, mut acc: CaseAccumulator) -> EstResult<CaseAccumulator> {
        if let Some(err) = acc.error.take() {
            return Err(err);
        }
        if !acc.invalid_codes.is_empty() {
            return Err(EstimationError::InvalidCases {
                codes: std::mem::take(&mut acc.invalid_codes),
                cases: acc.invalid_cases,
            });
        }
        if acc.skipped > 0 {
            if self.warned_skip.replace(true) {
                log::debug!("[data] skipped {} invalid case(s)", acc.skipped);
            } else {
                log::warn!("[data] skipping {} case(s) with unresolvable alternative codes", acc.skipped);
            }
        }
        Ok(acc)
    }

    fn store_evaluation(&mut self, key: &[f64], eval: &Evaluation) {
        self.cache.store_loglike(key, eval.loglike);
        self.cache.store_gradient(key, &eval.gradient);
        self.cache.store_information(key, &eval.bhhh);
    }

    fn sync_holdfast(&mut self, holdfast: &[bool]) {
        if self.holdfast_seen != holdfast {
            if !self.holdfast_seen.is_empty() {
                log::debug!("[cache] holdfast mask changed");
                self.cache.clear();
            }
            self.holdfast_seen = holdfast.to_vec();
        }
    }
}

fn visit_case<M: LogLikelihood>(
    model: &M, reader: &CaseReader<'_>, theta: &Theta, options: &EvalOptions, k: usize,
    acc: &mut CaseAccumulator,
) {
    if acc.error.is_some() {
        return;
    }
    let case = match reader.case(k) {
        Ok(case) => case,
        Err(CaseFault::Invalid { codes, .. }) => {
            if options.skip_invalid {
                acc.skipped += 1;
            } else {
                acc.invalid_cases += 1;
                acc.invalid_codes.extend(codes);
            }
            return;
        }
        Err(fault) => {
            acc.record_error(fault.into());
            return;
        }
    };

    let ll = match model.case_loglike(theta, &case) {
        Ok(ll) => ll,
        Err(e) => {
            acc.record_error(e);
            return;
        }
    };
    if ll == f64::NEG_INFINITY && !options.mute_zero_probability {
        acc.record_error(EstimationError::ZeroProbability { case: k });
        return;
    }
    let w = case.weight;
    if w != 0.0 {
        acc.loglike += w * ll;
    }

    match acc.kind {
        PassKind::Loglike => {}
        PassKind::Casewise => acc.casewise.push(CaseValue { case: k, weight: w, loglike: ll }),
        PassKind::Scores => {
            acc.scratch.fill(0.0);
            if let Err(e) = model.case_score(theta, &case, acc.scratch.view_mut()) {
                acc.record_error(e);
                return;
            }
            if w == 0.0 {
                return;
            }
            acc.gradient.scaled_add(w, &acc.scratch);
            let n = acc.scratch.len();
            for i in 0..n {
                let wsi = w * acc.scratch[i];
                if wsi == 0.0 {
                    continue;
                }
                for j in 0..n {
                    acc.bhhh[[i, j]] += wsi * acc.scratch[j];
                }
            }
        }
    }
}

fn zero_holdfast(eval: &mut Evaluation, holdfast: &[bool]) {
    for (i, _) in holdfast.iter().enumerate().filter(|(_, h)| **h) {
        if i < eval.gradient.len() {
            eval.gradient[i] = 0.0;
            eval.bhhh.row_mut(i).fill(0.0);
            eval.bhhh.column_mut(i).fill(0.0);
        }
    }
}

fn validate_grad_shape(gradient: &Grad, dim: usize) -> EstResult<()> {
    match validate_grad(gradient, dim) {
        Err(EstimationError::NonFiniteValue { .. }) | Ok(()) => Ok(()),
        Err(e) => Err(e),
    }
}

fn cache_key(theta: &Theta) -> Cow<'_, [f64]> {
    match theta.as_slice() {
        Some(s) => Cow::Borrowed(s),
        None => Cow::Owned(theta.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::CaseView;
    use crate::data::table::{CaseRecord, CaseTable};
    use approx::assert_abs_diff_eq;
    use ndarray::{ArrayViewMut1, array};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Cache hits on repeated objective calls.
    // - Agreement of analytic and finite-difference scores (gradient and
    //   BHHH), and holdfast zeroing.
    // - Parallel and sequential passes giving the same totals.
    // - Zero-probability and invalid-case policies.
    //
    // They intentionally DO NOT cover:
    // - The optimization loop (see `estimation::engine`).
    // -------------------------------------------------------------------------

    /// `ℓ_c = -(β·x_c - y_c)² / 2` with `x_c` in column 0..n and `y_c` in
    /// the last column of the chosen row.
    struct LeastSquares {
        analytic: bool,
        calls: AtomicUsize,
    }

    impl LeastSquares {
        fn new(analytic: bool) -> Self {
            Self { analytic, calls: AtomicUsize::new(0) }
        }
        fn resid(theta: &Theta, case: &CaseView<'_>) -> f64 {
            let row = case.values.row(case.chosen);
            let n = theta.len();
            (0..n).map(|i| theta[i] * row[i]).sum::<f64>() - row[n]
        }
    }

    impl LogLikelihood for LeastSquares {
        fn case_loglike(&self, theta: &Theta, case: &CaseView<'_>) -> EstResult<f64> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let r = Self::resid(theta, case);
            Ok(-0.5 * r * r)
        }

        fn case_score(
            &self, theta: &Theta, case: &CaseView<'_>, mut out: ArrayViewMut1<'_, f64>,
        ) -> EstResult<()> {
            if !self.analytic {
                return Err(EstimationError::GradientNotImplemented);
            }
            let r = Self::resid(theta, case);
            let row = case.values.row(case.chosen);
            for i in 0..theta.len() {
                out[i] = -r * row[i];
            }
            Ok(())
        }
    }

    fn table(n: usize) -> Arc<dyn CaseProvider> {
        let records: Vec<CaseRecord> = (0..n)
            .map(|c| {
                let x0 = 1.0;
                let x1 = (c as f64) * 0.1 - 1.0;
                let y = 0.5 + 2.0 * x1 + if c % 2 == 0 { 0.3 } else { -0.3 };
                CaseRecord::new(1, vec![(1, vec![x0, x1, y])])
            })
            .collect();
        Arc::new(CaseTable::from_records(vec![1], 3, &records).unwrap())
    }

    #[test]
    // Purpose
    // -------
    // A repeated objective call at the same vector is served from the cache.
    //
    // Given
    // -----
    // - A sequential evaluator over 10 cases.
    //
    // Expect
    // ------
    // - The model is called 10 times for two identical requests; a new
    //   vector costs another 10.
    fn objective_hits_cache() {
        // Arrange
        let mut ev = Evaluator::new(LeastSquares::new(true), table(10), EvalOptions::sequential());
        let theta = array![0.1, 0.2];

        // Act
        let a = ev.objective(&theta).unwrap();
        let b = ev.objective(&theta).unwrap();

        // Assert
        assert_eq!(a, b);
        assert_eq!(ev.model().calls.load(Ordering::Relaxed), 10);
        ev.objective(&array![0.1, 0.3]).unwrap();
        assert_eq!(ev.model().calls.load(Ordering::Relaxed), 20);
    }

    #[test]
    // Purpose
    // -------
    // Finite-difference case scores reproduce the analytic gradient and
    // BHHH.
    //
    // Given
    // -----
    // - Identical data and parameters, one model with case scores and one
    //   without.
    //
    // Expect
    // ------
    // - Gradients and BHHH agree to 1e-5.
    fn fd_scores_match_analytic() {
        // Arrange
        let theta = array![0.2, 1.5];
        let exact = Evaluator::new(LeastSquares::new(true), table(20), EvalOptions::sequential());
        let approx_ev = Evaluator::new(LeastSquares::new(false), table(20), EvalOptions::sequential());

        // Act
        let a = exact.derivatives_uncached(&theta, &[false, false]).unwrap();
        let f = approx_ev.derivatives_uncached(&theta, &[false, false]).unwrap();

        // Assert
        assert_abs_diff_eq!(a.loglike, f.loglike, epsilon = 1e-12);
        for (x, y) in a.gradient.iter().zip(f.gradient.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
        for (x, y) in a.bhhh.iter().zip(f.bhhh.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }

    #[test]
    // Purpose
    // -------
    // Holdfast entries of the gradient and BHHH are zero on both paths.
    //
    // Given
    // -----
    // - Parameter 0 holdfast.
    //
    // Expect
    // ------
    // - Zero gradient entry 0 and zero row/column 0 of BHHH.
    fn holdfast_entries_are_zero() {
        for analytic in [true, false] {
            let ev = Evaluator::new(LeastSquares::new(analytic), table(8), EvalOptions::sequential());
            let eval = ev.derivatives_uncached(&array![0.2, 1.5], &[true, false]).unwrap();
            assert_eq!(eval.gradient[0], 0.0);
            assert_eq!(eval.bhhh.row(0).to_vec(), vec![0.0, 0.0]);
            assert_eq!(eval.bhhh.column(0).to_vec(), vec![0.0, 0.0]);
            assert!(eval.gradient[1] != 0.0);
        }
    }

    #[test]
    // Purpose
    // -------
    // Fanning out over workers gives the same totals as one thread.
    //
    // Given
    // -----
    // - 200 cases; parallel options with 4 workers and threshold 1.
    //
    // Expect
    // ------
    // - Log-likelihood and gradient agree to rounding.
    fn parallel_pass_matches_sequential() {
        // Arrange
        let theta = array![0.4, 1.9];
        let par_opts = EvalOptions::new(true, 4, 1, false, false, 1e-6).unwrap();
        let seq = Evaluator::new(LeastSquares::new(true), table(200), EvalOptions::sequential());
        let par = Evaluator::new(LeastSquares::new(true), table(200), par_opts);

        // Act
        let s = seq.derivatives_uncached(&theta, &[false, false]).unwrap();
        let p = par.derivatives_uncached(&theta, &[false, false]).unwrap();

        // Assert
        assert_abs_diff_eq!(s.loglike, p.loglike, epsilon = 1e-9);
        assert_abs_diff_eq!(s.gradient[1], p.gradient[1], epsilon = 1e-9);
        assert_eq!(par.casewise_loglike(&theta).unwrap().len(), 200);
    }

    struct AlwaysZero;

    impl LogLikelihood for AlwaysZero {
        fn case_loglike(&self, _: &Theta, case: &CaseView<'_>) -> EstResult<f64> {
            Ok(if case.index == 1 { f64::NEG_INFINITY } else { -1.0 })
        }
    }

    #[test]
    // Purpose
    // -------
    // Zero probability is fatal unless muted.
    //
    // Given
    // -----
    // - Case 1 has `ℓ = -inf`.
    //
    // Expect
    // ------
    // - `ZeroProbability { case: 1 }` by default; `-inf` when muted.
    fn zero_probability_policy() {
        let loud = Evaluator::new(AlwaysZero, table(3), EvalOptions::sequential());
        assert_eq!(loud.loglike_uncached(&array![0.0, 0.0]), Err(EstimationError::ZeroProbability { case: 1 }));

        let muted = Evaluator::new(
            AlwaysZero,
            table(3),
            EvalOptions::sequential().with_mute_zero_probability(true),
        );
        assert_eq!(muted.loglike_uncached(&array![0.0, 0.0]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    // Purpose
    // -------
    // Invalid cases are collected across a parallel pass and reported
    // together, or skipped on request.
    //
    // Given
    // -----
    // - 100 cases over 4 workers; case 3 references code 7 and case 90
    //   references code 99.
    //
    // Expect
    // ------
    // - `InvalidCases` with codes {7, 99} from 2 cases; with skipping,
    //   98 case-wise values.
    fn invalid_cases_are_collected_or_skipped() {
        // Arrange
        let records: Vec<CaseRecord> = (0..100)
            .map(|c| match c {
                3 => CaseRecord::new(7, vec![(1, vec![1.0, 0.0, 0.0])]),
                90 => CaseRecord::new(1, vec![(99, vec![1.0, 0.0, 0.0])]),
                _ => CaseRecord::new(1, vec![(1, vec![1.0, 0.0, 0.5])]),
            })
            .collect();
        let provider: Arc<dyn CaseProvider> =
            Arc::new(CaseTable::from_records(vec![1], 3, &records).unwrap());
        let opts = EvalOptions::new(true, 4, 1, false, false, 1e-6).unwrap();

        // Act
        let strict = Evaluator::new(LeastSquares::new(true), Arc::clone(&provider), opts.clone());
        let lenient = Evaluator::new(LeastSquares::new(true), provider, opts.with_skip_invalid(true));

        // Assert
        assert_eq!(
            strict.loglike_uncached(&array![0.0, 0.0]),
            Err(EstimationError::InvalidCases { codes: BTreeSet::from([7, 99]), cases: 2 })
        );
        assert_eq!(lenient.casewise_loglike(&array![0.0, 0.0]).unwrap().len(), 98);
    }
}
