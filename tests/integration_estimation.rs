//! Integration tests for the estimation pipeline over an in-memory provider.
//!
//! Purpose
//! -------
//! - Validate the end-to-end path: `CaseTable` data, a user model
//!   implementing `LogLikelihood`, `Estimator::maximize` with configured
//!   strategy packs, and post-estimation errors and tests.
//!
//! Coverage
//! --------
//! - Scenario A: a one-parameter quadratic converges to its maximizer,
//!   with two cases and with a single case.
//! - Scale: a ×1e-8 copy of the objective reaches the same optimum.
//! - Scenario B: a holdfast parameter leaves nothing to optimize.
//! - Scenario C: unresolvable alternative codes abort the run listing every
//!   code, unless invalid cases are skipped.
//! - Properties: holdfast values stay bit-identical, the best objective is
//!   monotone, accepted points respect bounds, parallel and sequential
//!   evaluation agree, and the provider is read-locked during evaluation.
//! - Reloading: a table shared with an estimator refuses loads during a
//!   pass and accepts them between runs.
//!
//! Exclusions
//! ----------
//! - Fine-grained direction, line-search and cache behavior; those are
//!   covered by unit tests next to each module.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use ndarray::ArrayViewMut1;
use rust_mle::estimation::prelude::*;

/// `ℓ_c(θ) = -Σ_k (θ_k - x_{c,k})² / 2`, one variable per parameter.
///
/// The maximizer is the per-variable mean over cases.
struct Quadratic;

impl LogLikelihood for Quadratic {
    fn case_loglike(&self, theta: &Theta, case: &CaseView<'_>) -> EstResult<f64> {
        let row = case.values.row(case.chosen);
        Ok(-0.5 * theta.iter().zip(row.iter()).map(|(t, x)| (t - x) * (t - x)).sum::<f64>())
    }

    fn case_score(
        &self, theta: &Theta, case: &CaseView<'_>, mut out: ArrayViewMut1<'_, f64>,
    ) -> EstResult<()> {
        let row = case.values.row(case.chosen);
        for k in 0..theta.len() {
            out[k] = row[k] - theta[k];
        }
        Ok(())
    }
}

/// `ℓ_c(p) = -scale · (p - x_c)²`; scores are analytic unless `scores` is
/// off, in which case the engine differentiates numerically.
struct Scaled {
    scale: f64,
    scores: bool,
}

impl LogLikelihood for Scaled {
    fn case_loglike(&self, theta: &Theta, case: &CaseView<'_>) -> EstResult<f64> {
        let e = theta[0] - case.values.row(case.chosen)[0];
        Ok(-self.scale * e * e)
    }

    fn case_score(
        &self, theta: &Theta, case: &CaseView<'_>, mut out: ArrayViewMut1<'_, f64>,
    ) -> EstResult<()> {
        if !self.scores {
            return Err(EstimationError::GradientNotImplemented);
        }
        out[0] = -2.0 * self.scale * (theta[0] - case.values.row(case.chosen)[0]);
        Ok(())
    }
}

/// Same likelihood, but records the provider's read-lock holders seen
/// during evaluation.
struct LockProbe {
    table: Arc<CaseTable>,
    max_holders: AtomicUsize,
}

impl LogLikelihood for LockProbe {
    fn case_loglike(&self, theta: &Theta, case: &CaseView<'_>) -> EstResult<f64> {
        self.max_holders.fetch_max(self.table.lock_holders(), Ordering::SeqCst);
        Quadratic.case_loglike(theta, case)
    }
}

/// Tries to reload the table it is evaluated over and counts refusals.
struct ReloadDuringPass {
    table: Arc<CaseTable>,
    refused: AtomicUsize,
}

impl LogLikelihood for ReloadDuringPass {
    fn case_loglike(&self, theta: &Theta, case: &CaseView<'_>) -> EstResult<f64> {
        if let Err(EstimationError::ReadLockActive { .. }) = self.table.load(&[]) {
            self.refused.fetch_add(1, Ordering::SeqCst);
        }
        Quadratic.case_loglike(theta, case)
    }
}

/// One alternative (code 1) with `values[c]` as its single row.
fn table(values: &[Vec<f64>]) -> Arc<CaseTable> {
    let n_vars = values.first().map_or(1, Vec::len);
    let records: Vec<CaseRecord> =
        values.iter().map(|row| CaseRecord::new(1, vec![(1, row.clone())])).collect();
    Arc::new(CaseTable::from_records(vec![1], n_vars, &records).unwrap())
}

fn scalar_table(xs: &[f64]) -> Arc<CaseTable> {
    table(&xs.iter().map(|&x| vec![x]).collect::<Vec<_>>())
}

fn bhhh_only() -> Option<Vec<StrategyConfig>> {
    Some(vec![StrategyConfig::of(Algorithm::Bhhh)])
}

#[test]
// Purpose
// -------
// Scenario A: a one-parameter quadratic converges to its maximizer.
//
// Given
// -----
// - Two cases with `x = 2` and `x = 4`, so `ℓ(p) = -(p - 3)² - 1`.
// - `p` starts at 0; BHHH strategy; at most 50 iterations.
//
// Expect
// ------
// - `Success` with `|p - 3| < 1e-6`.
fn scenario_a_quadratic_converges() {
    // Arrange
    let mut est = Estimator::new(Quadratic, scalar_table(&[2.0, 4.0]), EvalOptions::sequential());
    est.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();

    // Act
    let reason = est.maximize(50, bhhh_only()).unwrap();

    // Assert
    let summary = est.summary().unwrap();
    assert_eq!(summary.code, ResultCode::Success, "{reason}");
    assert_eq!(summary.code.code(), 2);
    assert!(reason.starts_with("converged"));
    assert_abs_diff_eq!(est.params().value("p").unwrap(), 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(summary.best_loglike, -1.0, epsilon = 1e-9);
    assert!(summary.iterations <= 50);
}

#[test]
// Purpose
// -------
// Scenario A with a single case, where `gᵀ B⁺ g` is 1 at every point and
// convergence has to come from the objective gain.
//
// Given
// -----
// - One case with `x = 3`, `ℓ(p) = -(p - 3)²`, `p` from 0.
// - BHHH, at most 50 iterations; analytic and numeric scores.
//
// Expect
// ------
// - `Success` with a "converged" reason and `|p - 3| < 1e-6` both ways.
fn scenario_a_single_case_converges() {
    for scores in [true, false] {
        // Arrange
        let model = Scaled { scale: 1.0, scores };
        let mut est = Estimator::new(model, scalar_table(&[3.0]), EvalOptions::sequential());
        est.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();

        // Act
        let reason = est.maximize(50, bhhh_only()).unwrap();

        // Assert
        let summary = est.summary().unwrap();
        assert_eq!(summary.code, ResultCode::Success, "scores={scores}: {reason}");
        assert!(reason.starts_with("converged"), "{reason}");
        assert_abs_diff_eq!(est.params().value("p").unwrap(), 3.0, epsilon = 1e-6);
        assert!(summary.best_loglike > -1e-12);
    }
}

#[test]
// Purpose
// -------
// Rescaling the log-likelihood does not change the estimate.
//
// Given
// -----
// - Cases `x = 2, 4` with `ℓ_c = -c (p - x_c)²` for `c = 1` and `c = 1e-8`.
// - BHHH from `p = 0`, at most 100 iterations.
//
// Expect
// ------
// - Both runs take steps and converge to `p = 3` within 1e-5.
// - `se(p) = 1 / (2√c)`, since `-H = 4c`.
fn scaled_objective_converges_to_same_optimum() {
    let mut estimates = Vec::new();
    for scale in [1.0, 1e-8] {
        // Arrange
        let model = Scaled { scale, scores: true };
        let mut est = Estimator::new(model, scalar_table(&[2.0, 4.0]), EvalOptions::sequential());
        est.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();

        // Act
        let reason = est.maximize(100, bhhh_only()).unwrap();
        est.calculate_errors().unwrap();

        // Assert
        let summary = est.summary().unwrap();
        assert_eq!(summary.code, ResultCode::Success, "scale={scale}: {reason}");
        assert!(summary.iterations > 0);
        let p = est.params().value("p").unwrap();
        assert_abs_diff_eq!(p, 3.0, epsilon = 1e-5);
        let se = est.params().record("p").unwrap().std_err;
        assert_abs_diff_eq!(se * 2.0 * scale.sqrt(), 1.0, epsilon = 1e-4);
        estimates.push(p);
    }
    assert_abs_diff_eq!(estimates[0], estimates[1], epsilon = 1e-5);
}

#[test]
// Purpose
// -------
// Scenario B: with the only parameter held fixed, the run stops at once.
//
// Given
// -----
// - The scenario A data with `p` holdfast at 0.
//
// Expect
// ------
// - `Stuck` (-1), zero iterations, and `p` still exactly 0.
fn scenario_b_holdfast_is_stuck() {
    // Arrange
    let mut est = Estimator::new(Quadratic, scalar_table(&[2.0, 4.0]), EvalOptions::sequential());
    est.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, true).unwrap();

    // Act
    let reason = est.maximize(50, bhhh_only()).unwrap();

    // Assert
    let summary = est.summary().unwrap();
    assert_eq!(summary.code, ResultCode::Stuck);
    assert_eq!(summary.code.code(), -1);
    assert_eq!(summary.iterations, 0);
    assert!(reason.contains("no free parameters"));
    assert_eq!(est.params().value("p").unwrap().to_bits(), 0.0_f64.to_bits());
}

#[test]
// Purpose
// -------
// Scenario C: unresolvable alternative codes abort the run and every code
// is reported; skipping invalid cases lets the run proceed.
//
// Given
// -----
// - Valid cases `x = 2, 4` plus two cases referencing codes 99 and 98.
//
// Expect
// ------
// - `InvalidCases { codes: {98, 99}, cases: 2 }` by default.
// - With `skip_invalid`, convergence to 3 from the valid cases only.
fn scenario_c_invalid_cases() {
    // Arrange
    let records = vec![
        CaseRecord::new(1, vec![(1, vec![2.0])]),
        CaseRecord::new(99, vec![(99, vec![5.0])]),
        CaseRecord::new(1, vec![(1, vec![4.0])]),
        CaseRecord::new(1, vec![(1, vec![1.0]), (98, vec![7.0])]),
    ];
    let provider = Arc::new(CaseTable::from_records(vec![1], 1, &records).unwrap());

    // Act
    let mut strict = Estimator::new(Quadratic, provider.clone(), EvalOptions::sequential());
    strict.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
    let err = strict.maximize(50, bhhh_only()).unwrap_err();

    let lenient_opts = EvalOptions::sequential().with_skip_invalid(true);
    let mut lenient = Estimator::new(Quadratic, provider, lenient_opts);
    lenient.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
    lenient.maximize(50, bhhh_only()).unwrap();

    // Assert
    let msg = err.to_string();
    assert!(msg.contains("98") && msg.contains("99"), "{msg}");
    match err {
        EstimationError::InvalidCases { codes, cases } => {
            assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec![98, 99]);
            assert_eq!(cases, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(strict.params().value("p").unwrap(), 0.0);
    assert_abs_diff_eq!(lenient.params().value("p").unwrap(), 3.0, epsilon = 1e-6);
}

#[test]
// Purpose
// -------
// Holdfast values are bit-identical after a multi-strategy run and the
// best objective never decreases.
//
// Given
// -----
// - Three parameters over three variables, the middle one holdfast at an
//   awkward value, default strategies.
//
// Expect
// ------
// - The holdfast value keeps its exact bits; the free ones reach the means;
//   `best_trace` is non-decreasing.
fn holdfast_bits_and_monotone_best() {
    // Arrange
    let rows = vec![vec![1.0, 10.0, -2.0], vec![3.0, 20.0, -4.0], vec![2.0, 30.0, -3.0]];
    let mut est = Estimator::new(Quadratic, table(&rows), EvalOptions::sequential());
    let held = 0.1 + 0.2;
    est.add_parameter("a", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
    est.add_parameter("b", held, 0.0, f64::NAN, f64::NAN, true).unwrap();
    est.add_parameter("c", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();

    // Act
    est.maximize(100, None).unwrap();

    // Assert
    assert_eq!(est.params().value("b").unwrap().to_bits(), held.to_bits());
    assert_abs_diff_eq!(est.params().value("a").unwrap(), 2.0, epsilon = 1e-5);
    assert_abs_diff_eq!(est.params().value("c").unwrap(), -3.0, epsilon = 1e-5);
    let trace = &est.summary().unwrap().best_trace;
    assert!(trace.len() >= 2);
    assert!(trace.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
// Purpose
// -------
// Accepted points never leave the bounds.
//
// Given
// -----
// - The scenario A data with `p ∈ [-1, 2.5]` (the unconstrained optimum 3
//   lies outside).
//
// Expect
// ------
// - `p` ends exactly on the upper bound and `p <= 2.5` throughout, as
//   seen in `last_turn` and `best`.
fn bounds_are_respected() {
    // Arrange
    let mut est = Estimator::new(Quadratic, scalar_table(&[2.0, 4.0]), EvalOptions::sequential());
    est.add_parameter("p", 0.0, 0.0, -1.0, 2.5, false).unwrap();

    // Act
    est.maximize(50, None).unwrap();

    // Assert
    let p = est.params().value("p").unwrap();
    assert!(p <= 2.5);
    assert_abs_diff_eq!(p, 2.5, epsilon = 1e-9);
    assert!(est.params().last_turn()[0] <= 2.5);
    assert!(est.params().best()[0] <= 2.5);
}

#[test]
// Purpose
// -------
// Parallel evaluation gives the same estimates as sequential evaluation,
// and the provider is read-locked while cases are visited.
//
// Given
// -----
// - 300 cases with two variables; one estimator with 4 workers and a
//   parallel threshold of 1, one sequential.
//
// Expect
// ------
// - Estimates agree to 1e-10; the probe saw at least one lock holder
//   during evaluation and none remain afterwards.
fn parallel_matches_sequential_and_locks_provider() {
    // Arrange
    let rows: Vec<Vec<f64>> =
        (0..300).map(|i| vec![(i % 7) as f64 * 0.5, -((i % 11) as f64)]).collect();
    let data = table(&rows);
    let parallel_opts = EvalOptions::new(true, 4, 1, false, false, 1e-6).unwrap();

    let probe = LockProbe { table: data.clone(), max_holders: AtomicUsize::new(0) };
    let mut par = Estimator::new(probe, data.clone(), parallel_opts);
    let mut seq = Estimator::new(Quadratic, data.clone(), EvalOptions::sequential());
    for est_params in [par.params_mut(), seq.params_mut()] {
        est_params.add_parameter("u", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
        est_params.add_parameter("v", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
    }

    // Act
    par.maximize(100, None).unwrap();
    seq.maximize(100, None).unwrap();

    // Assert
    for name in ["u", "v"] {
        assert_abs_diff_eq!(
            par.params().value(name).unwrap(),
            seq.params().value(name).unwrap(),
            epsilon = 1e-6
        );
    }
    assert!(par.model().max_holders.load(Ordering::SeqCst) >= 1);
    assert_eq!(data.lock_holders(), 0);
}

#[test]
// Purpose
// -------
// A table shared with an estimator refuses reloads while a pass reads it
// and accepts them between runs.
//
// Given
// -----
// - Scenario A data shared by the estimator and a model that tries to load
//   an empty batch from inside every case evaluation.
// - After the first run, cases `x = 6, 8` are loaded through the shared
//   handle and the run is repeated.
//
// Expect
// ------
// - Every in-pass load is refused and the first run still finds `p = 3`.
// - The reload succeeds and the second run finds `p = 7`.
fn shared_table_reloads_between_runs() {
    // Arrange
    let data = scalar_table(&[2.0, 4.0]);
    let model = ReloadDuringPass { table: Arc::clone(&data), refused: AtomicUsize::new(0) };
    let mut est = Estimator::new(model, data.clone(), EvalOptions::sequential());
    est.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
    est.maximize(50, bhhh_only()).unwrap();
    assert_abs_diff_eq!(est.params().value("p").unwrap(), 3.0, epsilon = 1e-6);
    assert!(est.model().refused.load(Ordering::SeqCst) > 0);

    // Act
    let fresh = [6.0, 8.0].map(|x| CaseRecord::new(1, vec![(1, vec![x])]));
    data.load(&fresh).unwrap();
    est.clear_cache();
    est.maximize(50, bhhh_only()).unwrap();

    // Assert
    assert_eq!(data.n_cases(), 2);
    assert_eq!(data.lock_holders(), 0);
    assert_abs_diff_eq!(est.params().value("p").unwrap(), 7.0, epsilon = 1e-6);
}

#[test]
// Purpose
// -------
// Post-estimation inference on scenario A data.
//
// Given
// -----
// - The converged scenario A estimator; `-H = 2` for two unit-variance
//   cases.
//
// Expect
// ------
// - `se(p) = 1/√2`; an LR statistic of `2 (ℓ̂ - ℓ(0)) = 18` with one
//   degree of freedom.
fn inference_after_convergence() {
    // Arrange
    let mut est = Estimator::new(Quadratic, scalar_table(&[2.0, 4.0]), EvalOptions::sequential());
    est.add_parameter("p", 0.0, 0.0, f64::NAN, f64::NAN, false).unwrap();
    est.maximize(50, bhhh_only()).unwrap();

    // Act
    est.calculate_errors().unwrap();
    let null = est.loglike_null().unwrap();
    let lr = est.likelihood_ratio_test(null).unwrap();

    // Assert
    let record = est.params().record("p").unwrap();
    assert_abs_diff_eq!(record.std_err, 0.5_f64.sqrt(), epsilon = 1e-5);
    assert_abs_diff_eq!(null, -10.0, epsilon = 1e-12);
    assert_abs_diff_eq!(lr.statistic, 18.0, epsilon = 1e-8);
    assert_eq!(lr.df, 1);
    assert!(lr.p_value < 1e-3);
    assert!(record.p_value() < 1e-3);
    let status = est.print_status(StatusFlags::NAMES | StatusFlags::CURRENT);
    assert!(status.starts_with("name\tcurrent"));
}
