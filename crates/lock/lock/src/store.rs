use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// Reply of an atomic set-if-absent-with-expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key was absent and now holds our value and TTL.
    Acquired,
    /// The key already existed; nothing was written.
    AlreadyHeld,
    /// The store answered with something other than its success marker.
    Unrecognized(String),
}

impl SetOutcome {
    /// Only an explicit success counts; ambiguous replies are treated as lost.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Server-side atomic scripts the lock protocol needs.
///
/// Both compare the value at `KEYS[1]` with the token in `ARGV[1]` and do
/// nothing (reply `0`) when the key is absent or holds another token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScript {
    /// Delete the key if it holds the token. Reply `1` when deleted.
    Release,
    /// Reset the key's expiry to `ARGV[2]` seconds if it holds the token.
    /// Reply `1` when extended.
    Extend,
}

impl LockScript {
    /// Number of `ARGV` entries the script expects.
    pub fn arity(self) -> usize {
        match self {
            Self::Release => 1,
            Self::Extend => 2,
        }
    }
}

impl fmt::Display for LockScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Extend => write!(f, "extend"),
        }
    }
}

/// The capability set a key-value store must offer to host locks.
///
/// Implementations must be `Send + Sync` and safe for concurrent access. Each
/// call takes and returns its own pooled connection.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically create `key` with `value` and `ttl` only if it is absent.
    ///
    /// Contention is reported through [`SetOutcome`]; `Err` is reserved for
    /// transport and protocol faults.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<SetOutcome, LockError>;

    /// Run one of the atomic lock scripts against `key`.
    ///
    /// Returns the script's integer reply: `1` when the operation was
    /// performed, `0` on token mismatch.
    async fn eval(&self, script: LockScript, key: &str, args: &[String])
    -> Result<i64, LockError>;

    /// Read the current value of `key`. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;
}
