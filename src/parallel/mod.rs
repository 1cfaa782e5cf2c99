//! parallel — bounded, per-call fan-out over case indices.
//!
//! Purpose
//! -------
//! Evaluate independent per-case work concurrently without shared mutable
//! state inside the parallel region. Each worker owns an accumulator; the
//! caller merges them after the join.
//!
//! Key behaviors
//! -------------
//! - [`parallel_for`] / [`sequential_for`] run a per-index callback over a
//!   contiguous range with per-worker (or a single) accumulator.
//! - [`merge_into`] folds accumulators into a shared value under one lock.
//! - [`default_worker_count`] reports hardware parallelism, falling back
//!   to [`FALLBACK_WORKERS`].
//!
//! Testing notes
//! -------------
//! - `pool` has a property test for exact coverage of `[0, N)`.

pub mod pool;

pub use self::pool::{
    FALLBACK_WORKERS, default_worker_count, merge_into, parallel_for, partition, sequential_for,
};
