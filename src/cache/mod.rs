//! cache — memoization of likelihood, gradient and curvature results.
//!
//! Purpose
//! -------
//! Avoid redundant case-wise evaluations when the optimizer revisits a
//! parameter vector it has already evaluated. Line-search trial points,
//! strategy restarts and the final "restore best" step all re-derive
//! identical vectors deterministically, so an exact-match cache is enough.
//!
//! Key behaviors
//! -------------
//! - [`CacheKey`]: owned copy of a parameter vector with length-first,
//!   then lexicographic, total ordering.
//! - [`ResultCache`]: `BTreeMap`-backed store of [`CachedResult`]s with
//!   independent optional fields and O(log n) lookup.
//!
//! Invariants & assumptions
//! ------------------------
//! - Keys never alias the optimizer's live vector.
//! - No eviction; [`ResultCache::clear`] is the only way entries disappear.
//! - Not thread-safe by design of use: only the engine thread touches it.
//!
//! Testing notes
//! -------------
//! - `key` has property tests for ordering; `store` has unit tests for
//!   field independence and reset.

pub mod key;
pub mod store;

pub use self::key::CacheKey;
pub use self::store::{CachedResult, ResultCache};
