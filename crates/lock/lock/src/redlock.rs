//! Quorum lock over independent stores (Redlock).
//!
//! A [`RedLock`] holds one [`StoreLock`] per store and acquires them in order.
//! Each attempt is timed on its own; it counts toward the quorum only if it
//! succeeded within `node_timeout`. A slow success is treated as a miss, since
//! the lease it wrote has already burned part of the budget.
//!
//! The lock is granted when a strict majority (`n / 2 + 1`) counted and, for a
//! fixed lease, the whole round finished before `expire` had elapsed.
//!
//! A failed round does not release the nodes it did win unless
//! [`RedLockOptions::release_on_failure`] is set. Callers should call
//! [`RedLock::unlock`] whatever [`RedLock::lock`] returned; it releases every
//! node best-effort and lease expiry covers the rest.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LockError;
use crate::lock::StoreLock;
use crate::options::RedLockOptions;
use crate::store::LockStore;

/// Fewest stores a quorum lock accepts. Two nodes cannot tolerate any failure.
pub const MIN_REDLOCK_NODES: usize = 3;

/// A lock granted by a majority of independent stores.
pub struct RedLock {
    locks: Vec<StoreLock>,
    options: RedLockOptions,
}

impl RedLock {
    /// Build a quorum lock for `resource` across `stores`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidConfig`] if fewer than
    /// [`MIN_REDLOCK_NODES`] stores are given, if `node_timeout` is zero, or
    /// if `node_timeout` times the node count exceeds a non-zero `expire`.
    pub fn new(
        resource: &str,
        options: RedLockOptions,
        stores: Vec<Arc<dyn LockStore>>,
    ) -> Result<Self, LockError> {
        if stores.len() < MIN_REDLOCK_NODES {
            return Err(LockError::InvalidConfig(format!(
                "red lock needs at least {MIN_REDLOCK_NODES} stores, got {}",
                stores.len()
            )));
        }

        // No real attempt finishes in zero time, so no node could ever count.
        if options.node_timeout_ms == 0 {
            return Err(LockError::InvalidConfig(
                "red lock node timeout must be greater than zero".into(),
            ));
        }

        let nodes = u64::try_from(stores.len()).unwrap_or(u64::MAX);
        let budget = options.node_timeout_ms.saturating_mul(nodes);
        if options.expire_ms > 0 && budget > options.expire_ms {
            return Err(LockError::InvalidConfig(format!(
                "node timeout {}ms x {nodes} nodes exceeds lease of {}ms",
                options.node_timeout_ms, options.expire_ms
            )));
        }

        let node_options = options.node_lock_options();
        let locks = stores
            .into_iter()
            .map(|store| StoreLock::new(resource, store, &node_options))
            .collect();

        Ok(Self { locks, options })
    }

    /// Number of nodes.
    pub fn nodes(&self) -> usize {
        self.locks.len()
    }

    /// Successful nodes needed to grant the lock.
    pub fn quorum(&self) -> usize {
        self.locks.len() / 2 + 1
    }

    pub fn options(&self) -> &RedLockOptions {
        &self.options
    }

    /// Per-node locks, in acquisition order.
    pub fn node_locks(&self) -> &[StoreLock] {
        &self.locks
    }

    /// Try every node once and grant the lock on a timely majority.
    ///
    /// # Errors
    ///
    /// - [`LockError::QuorumInsufficient`] if too few nodes succeeded in time.
    /// - [`LockError::QuorumExpired`] if the round outlasted the lease.
    /// - [`LockError::Cancelled`] if `cancel` fired during the round.
    pub async fn lock(&mut self, cancel: &CancellationToken) -> Result<(), LockError> {
        let node_timeout = self.options.node_timeout();
        let started = Instant::now();
        let mut acquired = 0usize;

        for (node, lock) in self.locks.iter_mut().enumerate() {
            let attempt = Instant::now();
            let result = lock.lock(cancel).await;
            let elapsed = attempt.elapsed();

            match result {
                Ok(()) if elapsed <= node_timeout => acquired += 1,
                Ok(()) => {
                    debug!(node, elapsed = ?elapsed, "node acquired too slowly to count");
                }
                Err(LockError::Cancelled) => return Err(LockError::Cancelled),
                Err(e) => {
                    debug!(node, error = %e, "node acquisition failed");
                }
            }
        }

        let required = self.quorum();
        let elapsed = started.elapsed();
        let failure = if acquired < required {
            Some(LockError::QuorumInsufficient {
                acquired,
                required,
                nodes: self.locks.len(),
            })
        } else if self.options.expire_ms > 0 && elapsed >= self.options.expire() {
            Some(LockError::QuorumExpired { elapsed })
        } else {
            None
        };

        match failure {
            None => {
                info!(acquired, required, elapsed = ?elapsed, "red lock acquired");
                Ok(())
            }
            Some(err) => {
                info!(acquired, required, error = %err, "red lock not acquired");
                if self.options.release_on_failure {
                    // Nodes we never won report NotHeld; that is expected here.
                    let _ = self.unlock(cancel).await;
                }
                Err(err)
            }
        }
    }

    /// Release every node, continuing past failures.
    ///
    /// # Errors
    ///
    /// Returns the last per-node error, if any. Nodes that were never
    /// acquired report [`LockError::NotHeld`].
    pub async fn unlock(&mut self, cancel: &CancellationToken) -> Result<(), LockError> {
        let mut last_err = None;

        for (node, lock) in self.locks.iter_mut().enumerate() {
            if let Err(e) = lock.unlock(cancel).await {
                warn!(node, key = %lock.key(), error = %e, "red lock node release failed");
                last_err = Some(e);
            }
        }

        last_err.map_or(Ok(()), Err)
    }
}
