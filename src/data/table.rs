//! data::table — in-memory [`CaseProvider`] over resolved case records.
//!
//! Purpose
//! -------
//! Hold a fixed list of alternative codes and a batch of case records, and
//! resolve each record's codes to dense alternative slots once at load
//! time. The resolved data is stored as one contiguous
//! `cases × alts × vars` block so each case is served as a borrowed view.
//! The block lives in a shared batch; readers pin the batch they started
//! with, and a load swaps in a new one.
//!
//! Key behaviors
//! -------------
//! - Rows for alternatives a case does not list stay at zero.
//! - A record whose chosen code or row codes do not resolve is kept, and
//!   [`CaseReader::case`] reports every such code for it. Loading never
//!   fails on unknown codes; the evaluation pipeline decides whether to
//!   abort or skip.
//! - [`CaseTable::load`] takes `&self`, so it can be called on a table
//!   shared with an estimator. It replaces the whole batch and is refused
//!   with `ReadLockActive` while any reader handed out by this table is
//!   alive.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every row has exactly `n_vars` values; weights are finite and
//!   non-negative. Violations are rejected at load time.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use ndarray::{Array3, Axis};

use crate::data::lock::ReadLockout;
use crate::data::provider::{CaseFault, CaseProvider, CaseReader, CaseSource, CaseView};
use crate::estimation::errors::{EstResult, EstimationError};

/// One observational unit before code resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    /// Code of the chosen alternative.
    pub chosen: i64,
    /// `(alternative code, attribute values)` rows.
    pub rows: Vec<(i64, Vec<f64>)>,
    pub weight: f64,
}

impl CaseRecord {
    pub fn new(chosen: i64, rows: Vec<(i64, Vec<f64>)>) -> Self {
        Self { chosen, rows, weight: 1.0 }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Resolved cases from one load.
#[derive(Debug)]
struct CaseBatch {
    values: Array3<f64>,
    chosen: Vec<usize>,
    weights: Vec<f64>,
    bad_codes: Vec<BTreeSet<i64>>,
}

#[derive(Debug)]
pub struct CaseTable {
    alt_codes: Vec<i64>,
    slots: BTreeMap<i64, usize>,
    n_vars: usize,
    batch: RwLock<Arc<CaseBatch>>,
    lockout: ReadLockout,
}

impl CaseTable {
    /// Empty table over the given alternatives.
    ///
    /// # Errors
    /// - `DuplicateAlternative` if a code appears twice.
    pub fn new(alt_codes: Vec<i64>, n_vars: usize) -> EstResult<Self> {
        let mut slots = BTreeMap::new();
        for (slot, &code) in alt_codes.iter().enumerate() {
            if slots.insert(code, slot).is_some() {
                return Err(EstimationError::DuplicateAlternative { code });
            }
        }
        let n_alts = alt_codes.len();
        Ok(Self {
            alt_codes,
            slots,
            n_vars,
            batch: RwLock::new(Arc::new(CaseBatch {
                values: Array3::zeros((0, n_alts, n_vars)),
                chosen: Vec::new(),
                weights: Vec::new(),
                bad_codes: Vec::new(),
            })),
            lockout: ReadLockout::new(),
        })
    }

    /// Convenience: [`CaseTable::new`] followed by [`CaseTable::load`].
    pub fn from_records(
        alt_codes: Vec<i64>, n_vars: usize, records: &[CaseRecord],
    ) -> EstResult<Self> {
        let table = Self::new(alt_codes, n_vars)?;
        table.load(records)?;
        Ok(table)
    }

    /// Replace the loaded cases with `records`.
    ///
    /// # Errors
    /// - `ReadLockActive` while a read lock is outstanding.
    /// - `DimensionMismatch` if a row does not have `n_vars` values.
    /// - `NonFiniteValue` for a negative or non-finite weight.
    pub fn load(&self, records: &[CaseRecord]) -> EstResult<()> {
        self.refuse_if_locked()?;

        let n_alts = self.alt_codes.len();
        let mut values = Array3::zeros((records.len(), n_alts, self.n_vars));
        let mut chosen = Vec::with_capacity(records.len());
        let mut weights = Vec::with_capacity(records.len());
        let mut bad_codes = Vec::with_capacity(records.len());

        for (c, record) in records.iter().enumerate() {
            if !record.weight.is_finite() || record.weight < 0.0 {
                return Err(EstimationError::NonFiniteValue {
                    what: "case weight",
                    value: record.weight,
                });
            }
            let mut bad = BTreeSet::new();
            let chosen_slot = match self.slots.get(&record.chosen) {
                Some(&slot) => slot,
                None => {
                    bad.insert(record.chosen);
                    0
                }
            };
            for (code, row) in &record.rows {
                if row.len() != self.n_vars {
                    return Err(EstimationError::DimensionMismatch {
                        what: "case row",
                        expected: self.n_vars,
                        found: row.len(),
                    });
                }
                match self.slots.get(code) {
                    Some(&slot) => {
                        for (v, &x) in row.iter().enumerate() {
                            values[[c, slot, v]] = x;
                        }
                    }
                    None => {
                        bad.insert(*code);
                    }
                }
            }
            chosen.push(chosen_slot);
            weights.push(record.weight);
            bad_codes.push(bad);
        }

        let n_bad = bad_codes.iter().filter(|b| !b.is_empty()).count();
        if n_bad > 0 {
            log::debug!("[data] loaded {} cases, {n_bad} with unresolved codes", records.len());
        }

        let batch = Arc::new(CaseBatch { values, chosen, weights, bad_codes });
        let mut slot = self.batch.write().unwrap_or_else(PoisonError::into_inner);
        // Readers acquire under the read guard, so this check cannot race one.
        self.refuse_if_locked()?;
        *slot = batch;
        Ok(())
    }

    pub fn alt_codes(&self) -> &[i64] {
        &self.alt_codes
    }

    /// Slot of an alternative code, if known.
    pub fn slot_of(&self, code: i64) -> Option<usize> {
        self.slots.get(&code).copied()
    }

    pub fn lock_holders(&self) -> usize {
        self.lockout.holders()
    }

    fn current(&self) -> Arc<CaseBatch> {
        Arc::clone(&self.batch.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn refuse_if_locked(&self) -> EstResult<()> {
        if self.lockout.is_active() {
            let holders = self.lockout.holders();
            log::warn!("[data] load refused: {holders} read lock(s) outstanding");
            return Err(EstimationError::ReadLockActive { holders });
        }
        Ok(())
    }
}

impl CaseSource for CaseBatch {
    fn n_cases(&self) -> usize {
        self.chosen.len()
    }

    fn case(&self, index: usize) -> Result<CaseView<'_>, CaseFault> {
        let n_cases = self.n_cases();
        if index >= n_cases {
            return Err(CaseFault::OutOfRange { case: index, n_cases });
        }
        if !self.bad_codes[index].is_empty() {
            return Err(CaseFault::Invalid { case: index, codes: self.bad_codes[index].clone() });
        }
        Ok(CaseView {
            index,
            values: self.values.index_axis(Axis(0), index),
            chosen: self.chosen[index],
            weight: self.weights[index],
        })
    }
}

impl CaseProvider for CaseTable {
    fn n_cases(&self) -> usize {
        self.current().n_cases()
    }

    fn n_alts(&self) -> usize {
        self.alt_codes.len()
    }

    fn n_vars(&self) -> usize {
        self.n_vars
    }

    fn read_lock(&self) -> CaseReader<'_> {
        let guard = self.batch.read().unwrap_or_else(PoisonError::into_inner);
        let lock = self.lockout.acquire();
        let source: Arc<dyn CaseSource> = Arc::<CaseBatch>::clone(&*guard);
        CaseReader::new(source, lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Code resolution into dense slots and zero-filled missing rows.
    // - Reporting of every unresolved code in a case.
    // - Refusal of `load` while a reader is outstanding, through a shared
    //   handle.
    //
    // They intentionally DO NOT cover:
    // - How the pipeline reacts to invalid cases (see `estimation::evaluate`).
    // -------------------------------------------------------------------------

    fn two_alt_table(records: &[CaseRecord]) -> CaseTable {
        CaseTable::from_records(vec![10, 20], 2, records).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Rows land in the slot of their code; unlisted alternatives stay zero.
    //
    // Given
    // -----
    // - Alternatives {10, 20}; one case listing only code 20, chosen 20.
    //
    // Expect
    // ------
    // - Slot 1 holds the row, slot 0 is zero, chosen slot is 1.
    fn rows_resolve_to_slots() {
        // Arrange
        let table = two_alt_table(&[CaseRecord::new(20, vec![(20, vec![1.5, -2.0])])]);

        // Act
        let reader = table.read_lock();
        let case = reader.case(0).unwrap();

        // Assert
        assert_eq!(case.chosen, 1);
        assert_eq!(case.values.row(1).to_vec(), vec![1.5, -2.0]);
        assert_eq!(case.values.row(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(case.weight, 1.0);
    }

    #[test]
    // Purpose
    // -------
    // All unresolved codes of a case are reported together.
    //
    // Given
    // -----
    // - A case choosing unknown code 7 with a row for unknown code 99.
    //
    // Expect
    // ------
    // - `case(0)` fails listing both 7 and 99; the valid case still loads.
    fn invalid_case_lists_every_code() {
        // Arrange
        let table = two_alt_table(&[
            CaseRecord::new(7, vec![(99, vec![0.0, 0.0]), (10, vec![1.0, 1.0])]),
            CaseRecord::new(10, vec![(10, vec![1.0, 1.0])]),
        ]);

        // Act
        let reader = table.read_lock();
        let fault = reader.case(0).unwrap_err();

        // Assert
        assert_eq!(fault, CaseFault::Invalid { case: 0, codes: BTreeSet::from([7, 99]) });
        assert!(reader.case(1).is_ok());
        assert!(matches!(reader.case(2), Err(CaseFault::OutOfRange { case: 2, n_cases: 2 })));
    }

    #[test]
    // Purpose
    // -------
    // New data cannot be loaded while a consumer holds a read lock.
    //
    // Given
    // -----
    // - A loaded table shared through `Arc<dyn CaseProvider>` and an
    //   outstanding reader taken through that handle.
    //
    // Expect
    // ------
    // - `load` on the shared table fails with `ReadLockActive` and the
    //   reader still sees its batch; after the reader drops the load
    //   succeeds and new readers see the new batch.
    fn load_refused_while_locked() {
        // Arrange
        let table = Arc::new(two_alt_table(&[CaseRecord::new(10, vec![])]));
        let shared: Arc<dyn CaseProvider> = table.clone();
        let reader = shared.read_lock();

        // Act
        let refused = table.load(&[]);

        // Assert
        assert_eq!(refused, Err(EstimationError::ReadLockActive { holders: 1 }));
        assert_eq!(reader.n_cases(), 1);
        drop(reader);
        assert!(table.load(&[]).is_ok());
        assert_eq!(shared.n_cases(), 0);
        assert_eq!(shared.read_lock().n_cases(), 0);
        assert_eq!(table.lock_holders(), 0);
    }

    #[test]
    // Purpose
    // -------
    // Structural checks run at load time.
    //
    // Given
    // -----
    // - A duplicate alternative list, a short row, and a negative weight.
    //
    // Expect
    // ------
    // - Each is rejected with its specific error.
    fn load_rejects_malformed_input() {
        assert_eq!(
            CaseTable::new(vec![1, 1], 1).unwrap_err(),
            EstimationError::DuplicateAlternative { code: 1 }
        );

        let table = CaseTable::new(vec![1, 2], 2).unwrap();
        let short = table.load(&[CaseRecord::new(1, vec![(1, vec![0.0])])]);
        assert!(matches!(short, Err(EstimationError::DimensionMismatch { what: "case row", .. })));

        let negative = table.load(&[CaseRecord::new(1, vec![]).with_weight(-1.0)]);
        assert!(matches!(negative, Err(EstimationError::NonFiniteValue { .. })));
    }
}
