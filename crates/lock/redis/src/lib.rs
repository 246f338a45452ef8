//! Redis lock store backend for `warden-lock`.
//!
//! [`RedisLockStore`] implements [`LockStore`] on a single Redis instance:
//!
//! - **Acquisition**: `SET key token EX seconds NX`. Only an `OK` reply counts
//!   as acquired.
//! - **Release / extension**: Lua scripts that compare the stored token before
//!   deleting or re-expiring the key.
//! - **Connection pooling**: `deadpool-redis`, one checkout per call.
//!
//! For a quorum lock over independent instances use [`red_lock`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_lock::{CancellationToken, LockOptions, StoreLock};
//! use warden_lock_redis::{RedisConfig, RedisLockStore};
//!
//! let store = Arc::new(RedisLockStore::new(&RedisConfig::new("redis://localhost:6379"))?);
//! let mut lock = StoreLock::new("nightly-report", store, &LockOptions::new());
//! let cancel = CancellationToken::new();
//! lock.lock(&cancel).await?;
//! // Critical section, renewed by the watchdog...
//! lock.unlock(&cancel).await?;
//! ```

mod config;
pub mod scripts;
mod store;

use std::sync::Arc;

use warden_lock::{LockError, LockStore, RedLock, RedLockOptions};

pub use config::RedisConfig;
pub use store::RedisLockStore;

/// Build a quorum lock for `resource` with one pooled store per node config.
///
/// # Errors
///
/// Returns [`LockError::Connection`] if a pool cannot be created, or
/// [`LockError::InvalidConfig`] if the node list or timing budget is invalid.
pub fn red_lock(
    resource: &str,
    options: RedLockOptions,
    nodes: &[RedisConfig],
) -> Result<RedLock, LockError> {
    let stores = nodes
        .iter()
        .map(|node| {
            RedisLockStore::new(node).map(|store| Arc::new(store) as Arc<dyn LockStore>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    RedLock::new(resource, options, stores)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn nodes(n: usize) -> Vec<RedisConfig> {
        (0..n)
            .map(|i| RedisConfig::new(format!("redis://127.0.0.1:{}", 6379 + i)))
            .collect()
    }

    #[test]
    fn builds_red_lock_from_node_configs() {
        let options = RedLockOptions::new(Duration::from_secs(3), Duration::from_millis(100));
        let lock = red_lock("res", options, &nodes(5)).expect("valid cluster");
        assert_eq!(lock.nodes(), 5);
        assert_eq!(lock.quorum(), 3);
    }

    #[test]
    fn rejects_two_nodes() {
        let options = RedLockOptions::new(Duration::from_secs(3), Duration::from_millis(100));
        assert!(matches!(
            red_lock("res", options, &nodes(2)),
            Err(LockError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_node_timeout_over_budget() {
        let options = RedLockOptions::new(Duration::from_millis(200), Duration::from_millis(100));
        assert!(matches!(
            red_lock("res", options, &nodes(3)),
            Err(LockError::InvalidConfig(_))
        ));
    }
}
