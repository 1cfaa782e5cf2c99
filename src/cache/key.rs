//! cache::key — value-equality key over a parameter vector.
//!
//! A [`CacheKey`] owns a private copy of the parameter values it was built
//! from, so the optimizer is free to mutate its live vector in place after a
//! store. Ordering is length first, then element by element; the first
//! differing element decides.
//!
//! Element comparison uses [`f64::total_cmp`], i.e. the IEEE-754 total
//! order. Two keys are equal only when every element matches bit for bit
//! (`0.0` and `-0.0` are distinct keys; a NaN entry matches an identical NaN).
//! No floating-point tolerance is applied.
//!
//! [`KeyValues`] is the borrowed form of a key. `CacheKey` borrows as
//! `dyn KeyValues`, so a map keyed by `CacheKey` can be searched with a
//! plain `&[f64]` without copying it.
use std::borrow::Borrow;
use std::cmp::Ordering;

use ndarray::ArrayView1;

/// Owned, totally ordered parameter-vector key.
#[derive(Debug, Clone)]
pub struct CacheKey {
    values: Box<[f64]>,
}

impl CacheKey {
    /// Copy `values` into a new key.
    pub fn new(values: &[f64]) -> Self {
        Self { values: values.into() }
    }

    /// Copy an `ndarray` view (contiguous or not) into a new key.
    pub fn from_view(values: ArrayView1<'_, f64>) -> Self {
        Self { values: values.iter().copied().collect() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

impl From<&[f64]> for CacheKey {
    fn from(values: &[f64]) -> Self {
        Self::new(values)
    }
}

impl From<Vec<f64>> for CacheKey {
    fn from(values: Vec<f64>) -> Self {
        Self { values: values.into_boxed_slice() }
    }
}

/// Parameter values viewed as a key, owned or borrowed.
pub trait KeyValues {
    fn values(&self) -> &[f64];
}

impl KeyValues for CacheKey {
    fn values(&self) -> &[f64] {
        &self.values
    }
}

impl KeyValues for &[f64] {
    fn values(&self) -> &[f64] {
        self
    }
}

impl<'a> Borrow<dyn KeyValues + 'a> for CacheKey {
    fn borrow(&self) -> &(dyn KeyValues + 'a) {
        self
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CacheKey {}

impl PartialOrd for CacheKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CacheKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.values, &other.values)
    }
}

impl<'a> PartialEq for dyn KeyValues + 'a {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<'a> Eq for dyn KeyValues + 'a {}

impl<'a> PartialOrd for dyn KeyValues + 'a {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for dyn KeyValues + 'a {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(self.values(), other.values())
    }
}

// ---- Helper methods ----

fn compare_values(a: &[f64], b: &[f64]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| x.total_cmp(y))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    })
}
