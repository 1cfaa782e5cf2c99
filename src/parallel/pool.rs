//! parallel::pool — per-call worker pool over a contiguous index range.
//!
//! Purpose
//! -------
//! Split `[start, end)` into contiguous slices, give each slice its own
//! accumulator cloned from a shared template, and run a per-index callback
//! over every slice on a freshly built, bounded `rayon` pool. The caller
//! blocks until every slice has finished, then folds the accumulators into
//! one shared result in a single critical section.
//!
//! Key behaviors
//! -------------
//! - [`partition`] computes the slices: width `ceil(n / workers)`, in index
//!   order, with the final slice taking whatever remains.
//! - [`parallel_for`] builds a pool with one thread per slice, runs the
//!   slices concurrently, joins, and returns the accumulators in slice
//!   order. If the pool cannot be built it logs a warning and runs the
//!   slices on the calling thread instead.
//! - [`sequential_for`] runs the same callback over the whole range on the
//!   calling thread with a single accumulator.
//! - [`merge_into`] takes the caller's lock exactly once and folds every
//!   accumulator into the shared value.
//!
//! Invariants & assumptions
//! ------------------------
//! - Within a slice, indices are visited in increasing order. Slices have
//!   no ordering guarantee relative to each other.
//! - No two workers ever touch the same accumulator. Merging happens only
//!   after the join, never inside the parallel region.
//! - There is no cancellation: a launched call always runs to completion.
//!   Callbacks record failures in their accumulator instead of aborting.
use std::ops::Range;
use std::sync::{Mutex, PoisonError};

/// Worker count used when the platform cannot report its parallelism.
pub const FALLBACK_WORKERS: usize = 8;

/// Number of hardware execution units, or [`FALLBACK_WORKERS`].
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(FALLBACK_WORKERS)
}

/// Contiguous slices of `[start, end)` for at most `workers` workers.
///
/// Returns an empty vector for an empty range. A `workers` of zero is
/// treated as one.
pub fn partition(start: usize, end: usize, workers: usize) -> Vec<Range<usize>> {
    let n = end.saturating_sub(start);
    if n == 0 {
        return Vec::new();
    }
    let workers = workers.max(1);
    let width = n.div_ceil(workers).max(1);
    let mut slices = Vec::with_capacity(workers);
    let mut lo = start;
    while lo < end {
        let hi = (lo + width).min(end);
        slices.push(lo..hi);
        lo = hi;
    }
    slices
}

/// Run `func(k, &mut acc)` for every `k` in `[start, end)` across a fresh
/// pool of at most `workers` threads.
///
/// Each slice gets `template.clone()` as its accumulator. The returned
/// vector holds the accumulators in slice order (one per non-empty slice).
pub fn parallel_for<A, F>(start: usize, end: usize, workers: usize, template: &A, func: F) -> Vec<A>
where
    A: Clone + Send,
    F: Fn(usize, &mut A) + Sync,
{
    let slices = partition(start, end, workers);
    let mut buckets: Vec<A> = slices.iter().map(|_| template.clone()).collect();
    if slices.len() <= 1 {
        run_slices(&slices, &mut buckets, &func);
        return buckets;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(slices.len())
        .thread_name(|i| format!("mle-worker-{i}"))
        .build();
    match pool {
        Ok(pool) => {
            let func = &func;
            pool.scope(|s| {
                for (range, bucket) in slices.iter().cloned().zip(buckets.iter_mut()) {
                    s.spawn(move |_| {
                        for k in range {
                            func(k, bucket);
                        }
                    });
                }
            });
        }
        Err(err) => {
            log::warn!(
                "[parallel] could not build a {}-thread pool ({err}); running sequentially",
                slices.len()
            );
            run_slices(&slices, &mut buckets, &func);
        }
    }
    buckets
}

/// Run `func(k, &mut acc)` for every `k` in `[start, end)` on the calling
/// thread, with a single accumulator cloned from `template`.
pub fn sequential_for<A, F>(start: usize, end: usize, template: &A, mut func: F) -> A
where
    A: Clone,
    F: FnMut(usize, &mut A),
{
    let mut bucket = template.clone();
    for k in start..end {
        func(k, &mut bucket);
    }
    bucket
}

/// Fold `parts` into the value behind `shared`, holding the lock once for
/// the whole merge.
pub fn merge_into<S, A, I, G>(shared: &Mutex<S>, parts: I, mut fold: G)
where
    I: IntoIterator<Item = A>,
    G: FnMut(&mut S, A),
{
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    for part in parts {
        fold(&mut *guard, part);
    }
}

// ---- Helper methods ----

fn run_slices<A, F>(slices: &[Range<usize>], buckets: &mut [A], func: &F)
where
    F: Fn(usize, &mut A),
{
    for (range, bucket) in slices.iter().cloned().zip(buckets.iter_mut()) {
        for k in range {
            func(k, bucket);
        }
    }
}
