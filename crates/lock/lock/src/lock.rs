//! Single-node lease lock.
//!
//! A [`StoreLock`] claims one key on one store with `SET key token EX ttl NX`
//! semantics. The value is an ownership token unique to the instance, and the
//! release and extend scripts only touch the key while it still holds that
//! token, so a holder whose lease lapsed can never delete or prolong a lock
//! that has since passed to someone else.
//!
//! # Acquisition
//!
//! [`StoreLock::lock`] makes one attempt. If the key is taken and the lock is
//! non-blocking the contention error is returned at once. Blocking locks poll
//! every [`LOCK_POLL_INTERVAL`] until they win, the caller cancels, or the
//! configured wait budget runs out. Store faults end the call immediately in
//! both modes; retry policy belongs to the caller.
//!
//! Waiters are not queued. Every poller races on every tick.
//!
//! # Lease lifetime
//!
//! With an explicit TTL the lease simply expires unless released. Without one
//! the lock runs in watchdog mode: a default TTL is written and a
//! [`Watchdog`] keeps extending it until [`StoreLock::unlock`] or drop.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use warden_lock::{LockOptions, StoreLock};
//!
//! let cancel = CancellationToken::new();
//! let mut lock = StoreLock::new("orders", store, &LockOptions::new().with_block(true));
//! lock.lock(&cancel).await?;
//! // Critical section...
//! lock.unlock(&cancel).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LockError;
use crate::key::{lock_key, new_token};
use crate::options::{LockConfig, LockOptions, whole_seconds};
use crate::store::{LockScript, LockStore};
use crate::watchdog::Watchdog;

/// Retry interval when polling for lock acquisition.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A lease lock on a single store.
///
/// Not meant for concurrent use: `lock` and `unlock` take `&mut self`.
pub struct StoreLock {
    store: Arc<dyn LockStore>,
    key: String,
    token: String,
    config: LockConfig,
    watchdog: Watchdog,
}

impl StoreLock {
    /// Create a lock for `resource` on `store`. Options are resolved once.
    pub fn new(resource: &str, store: Arc<dyn LockStore>, options: &LockOptions) -> Self {
        Self {
            store,
            key: lock_key(resource),
            token: new_token(),
            config: options.resolve(),
            watchdog: Watchdog::new(),
        }
    }

    /// The store key this lock claims.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The ownership token written as the key's value.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Whether a renewal task is currently running for this lock.
    pub fn watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    /// Acquire the lock.
    ///
    /// # Errors
    ///
    /// - [`LockError::Contention`] if non-blocking and the key is held.
    /// - [`LockError::BlockTimeout`] if blocking and the wait budget ran out.
    /// - [`LockError::Cancelled`] if `cancel` fired first.
    /// - [`LockError::Connection`] / [`LockError::Backend`] on store faults.
    pub async fn lock(&mut self, cancel: &CancellationToken) -> Result<(), LockError> {
        match self.try_lock(cancel).await {
            Ok(()) => {}
            Err(e) if !self.config.block || !e.is_retryable() => return Err(e),
            Err(_) => self.blocking_lock(cancel).await?,
        }

        debug!(key = %self.key, watchdog = self.config.watchdog, "lock acquired");

        if self.config.watchdog {
            self.watchdog
                .start(
                    Arc::clone(&self.store),
                    self.key.clone(),
                    self.token.clone(),
                    cancel,
                )
                .await;
        }
        Ok(())
    }

    /// Release the lock, stopping the watchdog first.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotHeld`] if the key is absent or holds another
    /// token (already released, expired, or taken over), or a store fault.
    pub async fn unlock(&mut self, cancel: &CancellationToken) -> Result<(), LockError> {
        self.watchdog.stop().await;

        let args = [self.token.clone()];
        let release = self.store.eval(LockScript::Release, &self.key, &args);
        let reply = cancellable(cancel, release).await?;

        if reply == 1 {
            debug!(key = %self.key, "lock released");
            Ok(())
        } else {
            Err(LockError::NotHeld(format!(
                "lock {} was not held by this owner at release time",
                self.key
            )))
        }
    }

    /// Push the lease expiry out to `ttl` from now, if still held.
    pub async fn extend(&self, ttl: Duration, cancel: &CancellationToken) -> Result<(), LockError> {
        extend_lease(self.store.as_ref(), &self.key, &self.token, ttl, cancel).await
    }

    /// Check whether the key currently holds this lock's token.
    pub async fn is_held(&self, cancel: &CancellationToken) -> Result<bool, LockError> {
        let current = cancellable(cancel, self.store.get(&self.key)).await?;
        Ok(current.as_deref() == Some(self.token.as_str()))
    }

    /// Stop lease renewal without releasing the key.
    pub async fn stop_watchdog(&mut self) {
        self.watchdog.stop().await;
    }

    async fn try_lock(&self, cancel: &CancellationToken) -> Result<(), LockError> {
        let outcome = cancellable(
            cancel,
            self.store
                .set_if_absent(&self.key, &self.token, self.config.expire),
        )
        .await?;

        if outcome.is_acquired() {
            Ok(())
        } else {
            Err(LockError::Contention(format!(
                "lock {} is held by another owner (reply: {outcome:?})",
                self.key
            )))
        }
    }

    async fn blocking_lock(&self, cancel: &CancellationToken) -> Result<(), LockError> {
        let budget = self.config.block_waiting;
        let expired = tokio::time::sleep_until(Instant::now() + budget);
        tokio::pin!(expired);
        let first_poll = Instant::now() + LOCK_POLL_INTERVAL;
        let mut ticker = tokio::time::interval_at(first_poll, LOCK_POLL_INTERVAL);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LockError::Cancelled),
                () = &mut expired => return Err(LockError::BlockTimeout(budget)),
                _ = ticker.tick() => {}
            }

            match self.try_lock(cancel).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run the extend script for `key`/`token` with a fresh `ttl`.
pub(crate) async fn extend_lease(
    store: &dyn LockStore,
    key: &str,
    token: &str,
    ttl: Duration,
    cancel: &CancellationToken,
) -> Result<(), LockError> {
    let args = [token.to_owned(), whole_seconds(ttl).to_string()];
    let reply = cancellable(cancel, store.eval(LockScript::Extend, key, &args)).await?;

    if reply == 1 {
        Ok(())
    } else {
        Err(LockError::NotHeld(format!(
            "lock {key} is no longer held by this owner"
        )))
    }
}

/// Race a store call against the caller's cancellation token.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, LockError>
where
    F: Future<Output = Result<T, LockError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(LockError::Cancelled),
        result = call => result,
    }
}
