//! cache::store — memoized evaluation results keyed by parameter vector.
//!
//! Purpose
//! -------
//! Remember the expensive quantities computed at a parameter vector (the
//! log-likelihood, the BHHH convergence tolerance, the gradient, the BHHH
//! information matrix, and the Hessian) so that revisiting the same vector
//! during line-search trials or strategy restarts costs a map lookup.
//!
//! Key behaviors
//! -------------
//! - `store_*` creates an entry on first write and augments it afterwards;
//!   a later write never removes an unrelated field.
//! - `read_*` returns `None` on a miss and never fails.
//! - [`ResultCache::clear`] drops every entry at once. There is no eviction:
//!   the cache lives for one estimation run and grows with the number of
//!   distinct vectors visited.
//!
//! Invariants & assumptions
//! ------------------------
//! - Keys are exact ([`CacheKey`] semantics); a vector that differs in the
//!   last bit is a different entry.
//! - The cache is single-threaded. All reads and writes happen on the
//!   engine thread, outside any parallel evaluation region.
use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

use crate::cache::key::{CacheKey, KeyValues};

/// Memoized payload for one parameter vector. Each field is independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedResult {
    pub loglike: Option<f64>,
    pub tolerance: Option<f64>,
    pub gradient: Option<Array1<f64>>,
    pub information: Option<Array2<f64>>,
    pub hessian: Option<Array2<f64>>,
}

/// Content-keyed store of [`CachedResult`]s.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    saved: BTreeMap<CacheKey, CachedResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full entry for `key`, if any field was ever stored for it. Searches
    /// by the borrowed slice; nothing is copied.
    pub fn lookup(&self, key: &[f64]) -> Option<&CachedResult> {
        self.saved.get(&key as &dyn KeyValues)
    }

    pub fn read_loglike(&self, key: &[f64]) -> Option<f64> {
        self.lookup(key).and_then(|r| r.loglike)
    }

    pub fn read_tolerance(&self, key: &[f64]) -> Option<f64> {
        self.lookup(key).and_then(|r| r.tolerance)
    }

    pub fn read_gradient(&self, key: &[f64]) -> Option<&Array1<f64>> {
        self.lookup(key).and_then(|r| r.gradient.as_ref())
    }

    pub fn read_information(&self, key: &[f64]) -> Option<&Array2<f64>> {
        self.lookup(key).and_then(|r| r.information.as_ref())
    }

    pub fn read_hessian(&self, key: &[f64]) -> Option<&Array2<f64>> {
        self.lookup(key).and_then(|r| r.hessian.as_ref())
    }

    pub fn store_loglike(&mut self, key: &[f64], value: f64) {
        self.update(key, |r| r.loglike = Some(value));
    }

    pub fn store_tolerance(&mut self, key: &[f64], value: f64) {
        self.update(key, |r| r.tolerance = Some(value));
    }

    pub fn store_gradient(&mut self, key: &[f64], gradient: &Array1<f64>) {
        self.update(key, |r| r.gradient = Some(gradient.clone()));
    }

    pub fn store_information(&mut self, key: &[f64], information: &Array2<f64>) {
        self.update(key, |r| r.information = Some(information.clone()));
    }

    pub fn store_hessian(&mut self, key: &[f64], hessian: &Array2<f64>) {
        self.update(key, |r| r.hessian = Some(hessian.clone()));
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        if !self.saved.is_empty() {
            log::debug!("[cache] clearing {} entries", self.saved.len());
        }
        self.saved.clear();
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Apply `write` to the entry for `key`; the key is copied only when
    /// the entry is new.
    fn update(&mut self, key: &[f64], write: impl FnOnce(&mut CachedResult)) {
        match self.saved.get_mut(&key as &dyn KeyValues) {
            Some(entry) => write(entry),
            None => {
                let mut entry = CachedResult::default();
                write(&mut entry);
                self.saved.insert(CacheKey::new(key), entry);
            }
        }
    }
}
