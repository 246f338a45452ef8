use std::time::Duration;

use serde::Deserialize;

/// Connection settings for one Redis node.
///
/// Deserializable from TOML; a quorum lock takes a list of these:
///
/// ```toml
/// [[nodes]]
/// url = "redis://10.0.0.1:6379"
/// pool_size = 20
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://:password@127.0.0.1:6379/0`).
    pub url: String,

    /// Maximum number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// How long a caller waits for a free pooled connection, in milliseconds.
    pub connection_timeout_ms: u64,

    /// Wait for a free connection when the pool is exhausted. When `false`
    /// an exhausted pool fails the call immediately.
    pub wait_for_connection: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            pool_size: 10,
            connection_timeout_ms: 5_000,
            wait_for_connection: true,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build a config from a network kind (`tcp` or `unix`), an address and
    /// an optional password.
    pub fn from_address(network: &str, address: &str, password: Option<&str>) -> Self {
        let password = password.filter(|p| !p.is_empty());
        let url = match (network, password) {
            ("unix", Some(pass)) => format!("redis+unix://{address}?pass={pass}"),
            ("unix", None) => format!("redis+unix://{address}"),
            (_, Some(pass)) => format!("redis://:{pass}@{address}"),
            (_, None) => format!("redis://{address}"),
        };
        Self::new(url)
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_wait_for_connection(mut self, wait: bool) -> Self {
        self.wait_for_connection = wait;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Pool wait timeout: the configured timeout, or zero (fail immediately)
    /// when waiting is disabled.
    pub fn pool_wait_timeout(&self) -> Duration {
        if self.wait_for_connection {
            self.connection_timeout()
        } else {
            Duration::ZERO
        }
    }
}
