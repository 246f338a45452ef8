use std::time::Duration;

use serde::Deserialize;

/// Lease TTL used when no explicit expiry is configured. Such locks run in
/// watchdog mode.
pub const DEFAULT_LOCK_EXPIRE: Duration = Duration::from_secs(30);

/// Poll budget for blocking locks that do not set one.
pub const DEFAULT_BLOCK_WAITING: Duration = Duration::from_secs(5);

/// Options for a single-node lock, as supplied by the caller.
///
/// Deserializable so it can be embedded in a host application's TOML
/// configuration:
///
/// ```toml
/// expire_seconds = 10
/// block = true
/// block_waiting_seconds = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    /// Lease TTL in seconds. `0` enables watchdog mode.
    pub expire_seconds: u64,
    /// Poll until acquired instead of failing fast.
    pub block: bool,
    /// Poll budget in seconds when blocking. `0` means the default of 5.
    pub block_waiting_seconds: u64,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit lease TTL, which disables the watchdog.
    #[must_use]
    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire_seconds = whole_seconds(expire);
        self
    }

    /// Enable or disable blocking acquisition.
    #[must_use]
    pub fn with_block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Set the blocking poll budget. Implies blocking mode.
    #[must_use]
    pub fn with_block_waiting(mut self, waiting: Duration) -> Self {
        self.block = true;
        self.block_waiting_seconds = whole_seconds(waiting);
        self
    }

    /// Fill in defaults and derive watchdog mode.
    pub fn resolve(&self) -> LockConfig {
        let block_waiting = if self.block && self.block_waiting_seconds == 0 {
            DEFAULT_BLOCK_WAITING
        } else {
            Duration::from_secs(self.block_waiting_seconds)
        };

        let (expire, watchdog) = if self.expire_seconds > 0 {
            (Duration::from_secs(self.expire_seconds), false)
        } else {
            (DEFAULT_LOCK_EXPIRE, true)
        };

        LockConfig {
            expire,
            block: self.block,
            block_waiting,
            watchdog,
        }
    }
}

/// Immutable, resolved configuration of one lock instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Lease TTL written on acquisition.
    pub expire: Duration,
    /// Whether `lock` polls on contention.
    pub block: bool,
    /// Total poll budget for blocking acquisition.
    pub block_waiting: Duration,
    /// Whether a watchdog renews the lease while held.
    pub watchdog: bool,
}

/// Options for a quorum lock spanning several independent stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedLockOptions {
    /// Overall lease duration in milliseconds. `0` puts every node lock in
    /// watchdog mode and skips the timing-budget check.
    pub expire_ms: u64,
    /// Maximum latency, in milliseconds, for one node's acquisition to count.
    pub node_timeout_ms: u64,
    /// Release nodes already acquired when the quorum is not reached.
    pub release_on_failure: bool,
}

impl RedLockOptions {
    pub fn new(expire: Duration, node_timeout: Duration) -> Self {
        Self {
            expire_ms: millis(expire),
            node_timeout_ms: millis(node_timeout),
            release_on_failure: false,
        }
    }

    #[must_use]
    pub fn with_release_on_failure(mut self, release: bool) -> Self {
        self.release_on_failure = release;
        self
    }

    pub fn expire(&self) -> Duration {
        Duration::from_millis(self.expire_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// Options for the lock placed on each node. Sub-second leases round up
    /// to a whole second since the store expires keys at second granularity.
    pub fn node_lock_options(&self) -> LockOptions {
        let mut options = LockOptions::new();
        if self.expire_ms > 0 {
            options.expire_seconds = self.expire_ms.div_ceil(1000);
        }
        options
    }
}

/// Whole seconds, rounding any fraction up.
pub fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
