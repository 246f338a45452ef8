//! End-to-end lock tests against live Redis.
//!
//! Run with `--features integration`. `REDIS_URL` selects the server; the
//! quorum test spreads its nodes over logical databases 0-2 of that server.
#![cfg(feature = "integration")]

use std::time::Duration;

use warden_lock::{CancellationToken, LockError, LockOptions, RedLockOptions, StoreLock};
use warden_lock_redis::{RedisConfig, RedisLockStore, red_lock};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn resource() -> String {
    format!("it-{}", uuid::Uuid::new_v4())
}

fn store() -> std::sync::Arc<RedisLockStore> {
    std::sync::Arc::new(RedisLockStore::new(&RedisConfig::new(redis_url())).expect("pool"))
}

#[tokio::test]
async fn mutual_exclusion_and_token_isolation() {
    let cancel = CancellationToken::new();
    let name = resource();
    let options = LockOptions::new().with_expire(Duration::from_secs(10));
    let mut holder = StoreLock::new(&name, store(), &options);
    let mut other = StoreLock::new(&name, store(), &options);

    holder.lock(&cancel).await.expect("uncontested");
    assert!(matches!(
        other.lock(&cancel).await,
        Err(LockError::Contention(_))
    ));
    assert!(matches!(
        other.unlock(&cancel).await,
        Err(LockError::NotHeld(_))
    ));
    assert!(holder.is_held(&cancel).await.expect("get"));

    holder.unlock(&cancel).await.expect("owner releases");
    assert!(!holder.is_held(&cancel).await.expect("get"));
}

#[tokio::test]
async fn lease_expires_without_unlock() {
    let cancel = CancellationToken::new();
    let name = resource();
    let options = LockOptions::new().with_expire(Duration::from_secs(1));
    let mut crashed = StoreLock::new(&name, store(), &options);
    let mut next = StoreLock::new(&name, store(), &options);

    crashed.lock(&cancel).await.expect("uncontested");
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    next.lock(&cancel).await.expect("lease lapsed");
    next.unlock(&cancel).await.expect("release");
}

#[tokio::test]
async fn blocking_lock_times_out() {
    let cancel = CancellationToken::new();
    let name = resource();
    let mut holder = StoreLock::new(
        &name,
        store(),
        &LockOptions::new().with_expire(Duration::from_secs(10)),
    );
    let mut waiter = StoreLock::new(
        &name,
        store(),
        &LockOptions::new().with_block_waiting(Duration::from_secs(1)),
    );

    holder.lock(&cancel).await.expect("uncontested");
    let start = std::time::Instant::now();
    assert!(matches!(
        waiter.lock(&cancel).await,
        Err(LockError::BlockTimeout(_))
    ));
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_secs(2));
    holder.unlock(&cancel).await.expect("release");
}

#[tokio::test]
async fn quorum_lock_across_databases() {
    let cancel = CancellationToken::new();
    let base = redis_url();
    let base = base.trim_end_matches('/');
    let nodes: Vec<RedisConfig> = (0..3)
        .map(|db| RedisConfig::new(format!("{base}/{db}")))
        .collect();
    let options = RedLockOptions::new(Duration::from_secs(5), Duration::from_millis(500));

    let name = resource();
    let mut first = red_lock(&name, options.clone(), &nodes).expect("valid cluster");
    let mut second = red_lock(&name, options, &nodes).expect("valid cluster");

    first.lock(&cancel).await.expect("all nodes reachable");
    assert!(matches!(
        second.lock(&cancel).await,
        Err(LockError::QuorumInsufficient { .. })
    ));
    first.unlock(&cancel).await.expect("release all");
    second.lock(&cancel).await.expect("free after release");
    second.unlock(&cancel).await.expect("release all");
}
