use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use warden_lock::{LockError, LockScript, LockStore, SetOutcome};

/// Internal entry representing a key with a lease.
#[derive(Debug, Clone)]
struct LeaseEntry {
    value: String,
    expires_at: Instant,
}

impl LeaseEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory [`LockStore`] backed by a [`DashMap`].
///
/// Expiry is lazy: expired entries are evicted or ignored on the next access
/// to the same key. Clones share the same map and fault switches.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    entries: Arc<DashMap<String, LeaseEntry>>,
    offline: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl MemoryLockStore {
    /// Create a new, empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a connection error (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Remaining lease on `key`, if it is present and unexpired.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries.get(key).and_then(|entry| {
            let now = Instant::now();
            (entry.expires_at > now).then(|| entry.expires_at - now)
        })
    }

    /// Remove `key` regardless of its owner, as an operator would.
    pub fn force_delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the configured latency and offline switch.
    async fn round_trip(&self) -> Result<(), LockError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(LockError::Connection("memory store is offline".into()));
        }
        Ok(())
    }

    fn release(&self, key: &str, token: &str) -> i64 {
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.value == token);
        i64::from(removed.is_some())
    }

    fn extend(&self, key: &str, token: &str, ttl: Duration) -> i64 {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() && entry.value == token => {
                entry.expires_at = Instant::now() + ttl;
                1
            }
            _ => 0,
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<SetOutcome, LockError> {
        self.round_trip().await?;
        if ttl.is_zero() {
            return Err(LockError::Backend("invalid expire time in 'set' command".into()));
        }

        // Remove expired entries lazily.
        self.entries.remove_if(key, |_, entry| entry.is_expired());

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(_) => Ok(SetOutcome::AlreadyHeld),
            Entry::Vacant(vacant) => {
                vacant.insert(LeaseEntry {
                    value: value.to_owned(),
                    expires_at: Instant::now() + ttl,
                });
                Ok(SetOutcome::Acquired)
            }
        }
    }

    async fn eval(
        &self,
        script: LockScript,
        key: &str,
        args: &[String],
    ) -> Result<i64, LockError> {
        self.round_trip().await?;
        if args.len() < script.arity() {
            return Err(LockError::Backend(format!(
                "{script} script expects {} arguments, got {}",
                script.arity(),
                args.len()
            )));
        }

        let token = args[0].as_str();
        match script {
            LockScript::Release => Ok(self.release(key, token)),
            LockScript::Extend => {
                let secs: u64 = args[1].parse().map_err(|_| {
                    LockError::Backend("value is not an integer or out of range".into())
                })?;
                Ok(self.extend(key, token, Duration::from_secs(secs)))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        self.round_trip().await?;
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }
}
