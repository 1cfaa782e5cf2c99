//! data::provider — the observation seam consumed by the evaluation pipeline.
//!
//! Purpose
//! -------
//! Describe, independently of storage, how the engine reaches per-case
//! observations: counts of alternatives and variables, and a
//! [`CaseReader`] that pins the current batch and serves one case at a
//! time as a dense `alts × vars` block.
//!
//! Key behaviors
//! -------------
//! - [`CaseProvider::read_lock`] is the only way to reach case data. The
//!   reader carries a [`ReadLock`], so a provider shared behind an `Arc`
//!   refuses new loads for as long as any reader is alive.
//! - A reader keeps the batch it pinned. Views borrow from the reader, so
//!   they can never outlive it.
//!
//! Invariants & assumptions
//! ------------------------
//! - `case(i)` for `i < n_cases()` returns either a view whose `values`
//!   has shape `(n_alts(), n_vars())` or an [`CaseFault::Invalid`] listing
//!   every alternative code in that case the provider cannot resolve.
//! - Sources are `Send + Sync`; the pipeline calls `case` concurrently from
//!   worker threads.
use std::collections::BTreeSet;
use std::sync::Arc;

use ndarray::ArrayView2;

use crate::data::lock::ReadLock;
use crate::estimation::errors::EstimationError;

/// Borrowed observations for one case.
#[derive(Debug, Clone, Copy)]
pub struct CaseView<'a> {
    /// Position of the case in the provider.
    pub index: usize,
    /// Attribute block, one row per alternative slot.
    pub values: ArrayView2<'a, f64>,
    /// Slot of the chosen alternative.
    pub chosen: usize,
    /// Multiplier applied to this case's likelihood and score contributions.
    pub weight: f64,
}

/// A case the provider cannot serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseFault {
    /// The case references alternative codes that do not resolve to a slot.
    Invalid { case: usize, codes: BTreeSet<i64> },
    /// Index outside `[0, n_cases)`.
    OutOfRange { case: usize, n_cases: usize },
}

impl From<CaseFault> for EstimationError {
    fn from(fault: CaseFault) -> Self {
        match fault {
            CaseFault::Invalid { codes, .. } => EstimationError::InvalidCases { codes, cases: 1 },
            CaseFault::OutOfRange { case, n_cases } => EstimationError::CaseOutOfRange { case, n_cases },
        }
    }
}

/// A fixed batch of cases.
pub trait CaseSource: Send + Sync {
    fn n_cases(&self) -> usize;

    /// Observations for case `index`.
    fn case(&self, index: usize) -> Result<CaseView<'_>, CaseFault>;
}

/// Per-case observation provider.
pub trait CaseProvider: Send + Sync {
    /// Cases in the batch a new reader would see.
    fn n_cases(&self) -> usize;
    fn n_alts(&self) -> usize;
    fn n_vars(&self) -> usize;

    /// Pin the current batch. Structural reloads are refused until the
    /// reader is dropped.
    fn read_lock(&self) -> CaseReader<'_>;
}

/// Read access to one pinned batch, holding the provider's read lock.
#[derive(Clone)]
pub struct CaseReader<'a> {
    source: Arc<dyn CaseSource + 'a>,
    _lock: ReadLock,
}

impl<'a> CaseReader<'a> {
    pub fn new(source: Arc<dyn CaseSource + 'a>, lock: ReadLock) -> Self {
        Self { source, _lock: lock }
    }

    pub fn n_cases(&self) -> usize {
        self.source.n_cases()
    }

    pub fn case(&self, index: usize) -> Result<CaseView<'_>, CaseFault> {
        self.source.case(index)
    }
}

impl std::fmt::Debug for CaseReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseReader").field("n_cases", &self.n_cases()).finish()
    }
}
