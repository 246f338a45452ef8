use std::time::Duration;

use thiserror::Error;

/// Errors from lock acquisition, renewal and release.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to obtain lock: {0}")]
    Contention(String),

    #[error("block waiting timed out after {0:?}")]
    BlockTimeout(Duration),

    #[error("lock operation cancelled")]
    Cancelled,

    #[error("cannot unlock: {0}")]
    NotHeld(String),

    #[error("quorum not reached: acquired {acquired} of {nodes} nodes, need {required}")]
    QuorumInsufficient {
        acquired: usize,
        required: usize,
        nodes: usize,
    },

    #[error("quorum reached after the lease had already lapsed ({elapsed:?})")]
    QuorumExpired { elapsed: Duration },

    #[error("invalid lock configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Whether the failure means "someone else holds the lock" rather than an
    /// infrastructure fault. Blocking acquisition keeps polling on these.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_) | Self::BlockTimeout(_))
    }

    /// Whether the failure came from the store itself (connection or protocol).
    pub fn is_store_fault(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Backend(_))
    }
}
