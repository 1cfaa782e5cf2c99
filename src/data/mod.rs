//! data — observation provider seam and an in-memory implementation.
//!
//! Purpose
//! -------
//! Decouple the estimation engine from where case data comes from. The
//! engine only sees [`CaseProvider`]; [`CaseTable`] is the in-memory
//! provider used by tests and small programs.
//!
//! Key behaviors
//! -------------
//! - [`CaseProvider`]: counts plus a [`CaseReader`] that pins the current
//!   batch and serves one case at a time as a [`CaseView`] (dense
//!   `alts × vars` block, chosen slot, weight).
//! - [`CaseFault`]: an unservable case, listing every unresolved code.
//! - [`ReadLockout`] / [`ReadLock`]: reference-counted guard that blocks
//!   structural reloads while views may be outstanding.
//!
//! Invariants & assumptions
//! ------------------------
//! - The read lock is a protocol with the provider, not a mutex: it never
//!   blocks a thread, it only makes `load` fail. `CaseTable::load` takes
//!   `&self`, so the refusal applies to tables shared with an estimator.
//!
//! Downstream usage
//! ----------------
//! - `estimation::Estimator` holds an `Arc<dyn CaseProvider>` and reads
//!   through one `CaseReader` per case-wise pass.

pub mod lock;
pub mod provider;
pub mod table;

pub use self::lock::{ReadLock, ReadLockout};
pub use self::provider::{CaseFault, CaseProvider, CaseReader, CaseSource, CaseView};
pub use self::table::{CaseRecord, CaseTable};
