use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, RedisError, Script, Value};
use tracing::debug;

use warden_lock::options::whole_seconds;
use warden_lock::{LockError, LockScript, LockStore, SetOutcome};

use crate::config::RedisConfig;
use crate::scripts;

/// Redis-backed implementation of [`LockStore`].
///
/// Uses a `deadpool-redis` connection pool. Every call checks a connection
/// out and returns it when done, so no connection is held while a blocking
/// lock waits between polls.
pub struct RedisLockStore {
    pool: Pool,
}

impl RedisLockStore {
    /// Create a new `RedisLockStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, LockError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.pool_wait_timeout()))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| LockError::Connection(e.to_string()))?
            .map_err(|e| LockError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, LockError> {
        self.pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))
    }
}

/// Classify a command error: lost or refused connections are connection
/// faults, everything else is a backend fault.
fn map_redis_error(e: &RedisError) -> LockError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        LockError::Connection(e.to_string())
    } else {
        LockError::Backend(e.to_string())
    }
}

/// Interpret the reply of `SET key value EX ttl NX`.
fn set_outcome(reply: &Value) -> SetOutcome {
    match reply {
        Value::Okay => SetOutcome::Acquired,
        Value::SimpleString(status) if status.eq_ignore_ascii_case("ok") => SetOutcome::Acquired,
        Value::Nil => SetOutcome::AlreadyHeld,
        other => SetOutcome::Unrecognized(format!("{other:?}")),
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<SetOutcome, LockError> {
        let ttl_secs = whole_seconds(ttl).max(1);
        let mut conn = self.conn().await?;

        let reply: Value = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;

        let outcome = set_outcome(&reply);
        if let SetOutcome::Unrecognized(raw) = &outcome {
            debug!(key = %key, reply = %raw, "unexpected SET NX reply, treating as held");
        }
        Ok(outcome)
    }

    async fn eval(
        &self,
        script: LockScript,
        key: &str,
        args: &[String],
    ) -> Result<i64, LockError> {
        let mut conn = self.conn().await?;

        let lua = Script::new(scripts::source(script));
        let mut invocation = lua.key(key);
        for arg in args {
            invocation.arg(arg);
        }

        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(|e| map_redis_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_replies_acquire() {
        assert_eq!(set_outcome(&Value::Okay), SetOutcome::Acquired);
        assert_eq!(
            set_outcome(&Value::SimpleString("OK".into())),
            SetOutcome::Acquired
        );
    }

    #[test]
    fn nil_reply_means_held() {
        assert_eq!(set_outcome(&Value::Nil), SetOutcome::AlreadyHeld);
    }

    #[test]
    fn other_replies_are_not_success() {
        let outcome = set_outcome(&Value::SimpleString("QUEUED".into()));
        assert!(matches!(outcome, SetOutcome::Unrecognized(_)));
        assert!(!set_outcome(&Value::Int(1)).is_acquired());
    }

    #[test]
    fn error_classification() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(map_redis_error(&io), LockError::Connection(_)));

        let script = RedisError::from((redis::ErrorKind::ResponseError, "ERR syntax"));
        assert!(matches!(map_redis_error(&script), LockError::Backend(_)));
    }

    #[tokio::test]
    async fn pool_builds_without_connecting() {
        let store = RedisLockStore::new(&RedisConfig::new("redis://127.0.0.1:1"));
        assert!(store.is_ok(), "pool creation is lazy");
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            RedisLockStore::new(&RedisConfig::new("not a url")),
            Err(LockError::Connection(_))
        ));
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use warden_lock::testing::run_store_conformance_tests;

    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig::new(
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        )
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = RedisLockStore::new(&test_config()).expect("pool creation should succeed");
        // Conformance keys are fixed; clear leftovers from earlier runs.
        let mut conn = store.conn().await.expect("redis reachable");
        let keys: Vec<String> = conn
            .keys(format!("{}conformance-*", warden_lock::LOCK_KEY_PREFIX))
            .await
            .expect("KEYS succeeds");
        for key in keys {
            let _: () = conn.del(key).await.expect("DEL succeeds");
        }
        drop(conn);

        run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }
}
