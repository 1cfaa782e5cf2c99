//! data::lock — read lockout guarding structural reuse of case buffers.
//!
//! A provider owns one [`ReadLockout`]. Every consumer that keeps views into
//! the provider's buffers across a call (the evaluation pipeline does so for
//! the duration of one case-wise pass) holds a [`ReadLock`] token. While any
//! token is alive the provider refuses to load new data. Dropping the token
//! releases it; there is no explicit unlock call.
use std::sync::Arc;

/// Provider-side half of the protocol.
#[derive(Debug, Default)]
pub struct ReadLockout {
    master: Arc<()>,
}

/// Consumer-side token. Cloning adds a holder; dropping removes one.
#[derive(Debug, Clone)]
pub struct ReadLock {
    _token: Arc<()>,
}

impl ReadLockout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a new token.
    pub fn acquire(&self) -> ReadLock {
        ReadLock { _token: Arc::clone(&self.master) }
    }

    /// Number of tokens currently alive.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.master) - 1
    }

    pub fn is_active(&self) -> bool {
        self.holders() > 0
    }
}
