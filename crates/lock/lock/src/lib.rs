//! Lease-based distributed locking over a key-value store.
//!
//! The protocol needs only two atomic store capabilities, captured by
//! [`LockStore`]: set-if-absent with expiry, and token-checked server-side
//! scripts for release and extension. On top of that this crate provides:
//!
//! - [`StoreLock`]: a single-node lease lock with fail-fast or polling
//!   acquisition and token-checked release.
//! - [`Watchdog`]: background renewal for locks taken without a fixed TTL.
//! - [`RedLock`]: a quorum lock over independent stores.
//!
//! Backends live in sibling crates (`warden-lock-redis`,
//! `warden-lock-memory`) and are validated with
//! [`testing::run_store_conformance_tests`].

pub mod error;
pub mod key;
pub mod lock;
pub mod options;
pub mod redlock;
pub mod store;
pub mod testing;
pub mod watchdog;

pub use error::LockError;
pub use key::{LOCK_KEY_PREFIX, lock_key, new_token};
pub use lock::{LOCK_POLL_INTERVAL, StoreLock};
pub use options::{LockConfig, LockOptions, RedLockOptions};
pub use redlock::{MIN_REDLOCK_NODES, RedLock};
pub use store::{LockScript, LockStore, SetOutcome};
pub use watchdog::{WATCHDOG_MARGIN, WATCHDOG_TICK, Watchdog};

pub use tokio_util::sync::CancellationToken;
