//! estimation::params — parameter state, bounds, holdfast flags and records.
//!
//! Purpose
//! -------
//! Own every per-parameter quantity the engine steps over time: current,
//! best and last-turn values, bounds, holdfast flags, null and initial
//! reference values, and the standard errors written after estimation.
//!
//! Key behaviors
//! -------------
//! - Parameters are registered with [`ParameterState::add_parameter`];
//!   NaN arguments mean "use the default" (initial 0, null 0, unbounded).
//! - Accessors take a [`ParamId`], so callers can address a parameter by
//!   name (`"beta"`) or by position (`2`).
//! - [`ParameterRecord`] is an owned snapshot of one parameter's metadata.
//! - [`hessfull_to_hessfree`] / [`hessfree_to_hessfull`] (and the vector
//!   counterparts) map between full parameter-indexed quantities and their
//!   restriction to free parameters.
//!
//! Invariants & assumptions
//! ------------------------
//! - All per-parameter containers have the same length at all times.
//! - `min_value <= value <= max_value` for current values set through the
//!   public setters.
//! - Holdfast entries of `current` are only changed by explicit setters,
//!   never by the engine.
use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

use crate::estimation::errors::{EstResult, EstimationError};
use crate::estimation::types::Theta;
use crate::estimation::validation::validate_theta;
use crate::inference::normal_p_value;

/// Parameter addressed by name or by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for ParamId<'a> {
    fn from(name: &'a str) -> Self {
        ParamId::Name(name)
    }
}

impl<'a> From<&'a String> for ParamId<'a> {
    fn from(name: &'a String) -> Self {
        ParamId::Name(name.as_str())
    }
}

impl From<usize> for ParamId<'_> {
    fn from(index: usize) -> Self {
        ParamId::Index(index)
    }
}

/// Snapshot of one parameter's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub name: String,
    pub value: f64,
    pub initial_value: f64,
    pub null_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub holdfast: bool,
    pub std_err: f64,
    pub robust_std_err: f64,
    pub extra: BTreeMap<String, f64>,
}

impl ParameterRecord {
    /// `(value - null_value) / std_err`; NaN until errors are computed.
    pub fn t_stat(&self) -> f64 {
        (self.value - self.null_value) / self.std_err
    }

    /// Two-sided normal p-value of [`t_stat`](Self::t_stat).
    pub fn p_value(&self) -> f64 {
        normal_p_value(self.t_stat())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterState {
    names: Vec<String>,
    index: BTreeMap<String, usize>,
    current: Theta,
    best: Theta,
    last_turn: Theta,
    min_values: Vec<f64>,
    max_values: Vec<f64>,
    holdfast: Vec<bool>,
    null_values: Vec<f64>,
    initial_values: Vec<f64>,
    std_err: Vec<f64>,
    robust_std_err: Vec<f64>,
    extra: Vec<BTreeMap<String, f64>>,
}

impl ParameterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter and return its position.
    ///
    /// NaN for `initial`, `null`, `min` or `max` selects the default
    /// (0, 0, −∞, +∞).
    ///
    /// # Errors
    /// - `DuplicateParameter` if the name is taken.
    /// - `InvalidBounds` if `min > max` or `initial` lies outside them.
    pub fn add_parameter(
        &mut self, name: &str, initial: f64, null: f64, min: f64, max: f64, holdfast: bool,
    ) -> EstResult<usize> {
        if self.index.contains_key(name) {
            return Err(EstimationError::DuplicateParameter { name: name.to_string() });
        }
        let initial = if initial.is_nan() { 0.0 } else { initial };
        let null = if null.is_nan() { 0.0 } else { null };
        let min = if min.is_nan() { f64::NEG_INFINITY } else { min };
        let max = if max.is_nan() { f64::INFINITY } else { max };
        check_bounds(name, min, max, initial)?;

        let slot = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), slot);
        push_value(&mut self.current, initial);
        push_value(&mut self.best, initial);
        push_value(&mut self.last_turn, initial);
        self.min_values.push(min);
        self.max_values.push(max);
        self.holdfast.push(holdfast);
        self.null_values.push(null);
        self.initial_values.push(initial);
        self.std_err.push(f64::NAN);
        self.robust_std_err.push(f64::NAN);
        self.extra.push(BTreeMap::new());
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a parameter.
    ///
    /// # Errors
    /// - `ParameterNotFound` for an unknown name.
    /// - `ParameterIndexOutOfRange` for a position past the end.
    pub fn resolve<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<usize> {
        match id.into() {
            ParamId::Name(name) => self
                .index
                .get(name)
                .copied()
                .ok_or_else(|| EstimationError::ParameterNotFound { name: name.to_string() }),
            ParamId::Index(i) if i < self.len() => Ok(i),
            ParamId::Index(i) => {
                Err(EstimationError::ParameterIndexOutOfRange { index: i, len: self.len() })
            }
        }
    }

    // ---- Per-parameter accessors ----

    pub fn value<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<f64> {
        Ok(self.current[self.resolve(id)?])
    }

    /// Set the current value; it must lie within the parameter's bounds.
    pub fn set_value<'a>(&mut self, id: impl Into<ParamId<'a>>, value: f64) -> EstResult<()> {
        let i = self.resolve(id)?;
        check_bounds(&self.names[i], self.min_values[i], self.max_values[i], value)?;
        self.current[i] = value;
        Ok(())
    }

    pub fn bounds<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<(f64, f64)> {
        let i = self.resolve(id)?;
        Ok((self.min_values[i], self.max_values[i]))
    }

    /// Replace the bounds; NaN means unbounded on that side. The current
    /// value must remain inside.
    pub fn set_bounds<'a>(
        &mut self, id: impl Into<ParamId<'a>>, min: f64, max: f64,
    ) -> EstResult<()> {
        let i = self.resolve(id)?;
        let min = if min.is_nan() { f64::NEG_INFINITY } else { min };
        let max = if max.is_nan() { f64::INFINITY } else { max };
        check_bounds(&self.names[i], min, max, self.current[i])?;
        self.min_values[i] = min;
        self.max_values[i] = max;
        Ok(())
    }

    pub fn holdfast<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<bool> {
        Ok(self.holdfast[self.resolve(id)?])
    }

    pub fn set_holdfast<'a>(&mut self, id: impl Into<ParamId<'a>>, holdfast: bool) -> EstResult<()> {
        let i = self.resolve(id)?;
        self.holdfast[i] = holdfast;
        Ok(())
    }

    pub fn null_value<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<f64> {
        Ok(self.null_values[self.resolve(id)?])
    }

    pub fn set_null_value<'a>(&mut self, id: impl Into<ParamId<'a>>, value: f64) -> EstResult<()> {
        let i = self.resolve(id)?;
        self.null_values[i] = value;
        Ok(())
    }

    pub fn initial_value<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<f64> {
        Ok(self.initial_values[self.resolve(id)?])
    }

    pub fn set_initial_value<'a>(
        &mut self, id: impl Into<ParamId<'a>>, value: f64,
    ) -> EstResult<()> {
        let i = self.resolve(id)?;
        check_bounds(&self.names[i], self.min_values[i], self.max_values[i], value)?;
        self.initial_values[i] = value;
        Ok(())
    }

    /// Attach an open-ended numeric annotation to a parameter.
    pub fn set_extra<'a>(
        &mut self, id: impl Into<ParamId<'a>>, key: &str, value: f64,
    ) -> EstResult<()> {
        let i = self.resolve(id)?;
        self.extra[i].insert(key.to_string(), value);
        Ok(())
    }

    pub fn record<'a>(&self, id: impl Into<ParamId<'a>>) -> EstResult<ParameterRecord> {
        let i = self.resolve(id)?;
        Ok(ParameterRecord {
            name: self.names[i].clone(),
            value: self.current[i],
            initial_value: self.initial_values[i],
            null_value: self.null_values[i],
            min_value: self.min_values[i],
            max_value: self.max_values[i],
            holdfast: self.holdfast[i],
            std_err: self.std_err[i],
            robust_std_err: self.robust_std_err[i],
            extra: self.extra[i].clone(),
        })
    }

    pub fn records(&self) -> Vec<ParameterRecord> {
        (0..self.len()).filter_map(|i| self.record(i).ok()).collect()
    }

    // ---- Whole-vector views ----

    pub fn current(&self) -> &Theta {
        &self.current
    }

    pub fn best(&self) -> &Theta {
        &self.best
    }

    pub fn last_turn(&self) -> &Theta {
        &self.last_turn
    }

    pub fn min_values(&self) -> &[f64] {
        &self.min_values
    }

    pub fn max_values(&self) -> &[f64] {
        &self.max_values
    }

    pub fn holdfast_mask(&self) -> &[bool] {
        &self.holdfast
    }

    pub fn null_values(&self) -> Theta {
        Array1::from(self.null_values.clone())
    }

    pub fn initial_values(&self) -> Theta {
        Array1::from(self.initial_values.clone())
    }

    pub fn any_holdfast(&self) -> bool {
        self.holdfast.iter().any(|&h| h)
    }

    pub fn count_holdfast(&self) -> usize {
        self.holdfast.iter().filter(|&&h| h).count()
    }

    pub fn free_count(&self) -> usize {
        self.len() - self.count_holdfast()
    }

    /// Positions of the non-holdfast parameters, in order.
    pub fn free_indices(&self) -> Vec<usize> {
        free_indices(&self.holdfast)
    }

    /// Copy initial values into current and best.
    pub fn reset_to_initial_value(&mut self) {
        self.current = Array1::from(self.initial_values.clone());
        self.best = self.current.clone();
    }

    /// Copy current values into the initial values.
    pub fn refresh_initial_value(&mut self) {
        self.initial_values = self.current.to_vec();
    }

    /// Check that every current value lies within its bounds.
    pub fn validate_current(&self) -> EstResult<()> {
        for i in 0..self.len() {
            check_bounds(&self.names[i], self.min_values[i], self.max_values[i], self.current[i])?;
        }
        Ok(())
    }

    // ---- Engine bookkeeping ----

    pub(crate) fn set_current(&mut self, theta: &Theta) -> EstResult<()> {
        validate_theta(theta, self.len())?;
        self.current.assign(theta);
        Ok(())
    }

    pub(crate) fn mark_best(&mut self) {
        self.best.assign(&self.current);
    }

    pub(crate) fn restore_best(&mut self) {
        self.current.assign(&self.best);
    }

    pub(crate) fn shift_last_turn(&mut self) {
        self.last_turn.assign(&self.current);
    }

    pub(crate) fn set_standard_errors(&mut self, std_err: &Array1<f64>, robust: &Array1<f64>) {
        self.std_err = std_err.to_vec();
        self.robust_std_err = robust.to_vec();
    }
}

// ---- Free-parameter restriction ----

pub fn free_indices(holdfast: &[bool]) -> Vec<usize> {
    holdfast.iter().enumerate().filter(|(_, h)| !**h).map(|(i, _)| i).collect()
}

/// Restrict a full parameter-indexed vector to its free entries.
pub fn full_to_free(full: &Array1<f64>, holdfast: &[bool]) -> Array1<f64> {
    free_indices(holdfast).into_iter().map(|i| full[i]).collect()
}

/// Scatter free entries into a full-size vector, filling holdfast entries
/// from `base`.
pub fn free_to_full(free: &Array1<f64>, base: &Array1<f64>, holdfast: &[bool]) -> Array1<f64> {
    let mut full = base.clone();
    for (k, i) in free_indices(holdfast).into_iter().enumerate() {
        full[i] = free[k];
    }
    full
}

/// Drop the rows and columns of holdfast parameters.
pub fn hessfull_to_hessfree(full: &Array2<f64>, holdfast: &[bool]) -> Array2<f64> {
    let free = free_indices(holdfast);
    Array2::from_shape_fn((free.len(), free.len()), |(r, c)| full[[free[r], free[c]]])
}

/// Expand a free-parameter matrix to full size with zero holdfast rows and
/// columns.
pub fn hessfree_to_hessfull(free_mat: &Array2<f64>, holdfast: &[bool]) -> Array2<f64> {
    let free = free_indices(holdfast);
    let n = holdfast.len();
    let mut full = Array2::zeros((n, n));
    for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
            full[[i, j]] = free_mat[[r, c]];
        }
    }
    full
}

// ---- Helper methods ----

fn check_bounds(name: &str, min: f64, max: f64, value: f64) -> EstResult<()> {
    if min > max || !(min..=max).contains(&value) {
        return Err(EstimationError::InvalidBounds { name: name.to_string(), min, max, value });
    }
    Ok(())
}

fn push_value(values: &mut Array1<f64>, value: f64) {
    *values = values.iter().copied().chain(std::iter::once(value)).collect();
}
