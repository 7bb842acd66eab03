//! Configuration for the routing core.
//!
//! Timeouts and retry policy, loadable from a YAML file with per-field
//! defaults so a partial file (or none at all) still yields a usable config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Routing timeouts and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// How long a `Connecting` state waits for the stack to report audio up
    /// before recomputing the actual state.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Delay before a failed connect attempt is retried.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Additional attempts after the initial connect, not total attempts.
    /// Failures past the cap are absorbed silently.
    #[serde(default = "default_max_connection_retries")]
    pub max_connection_retries: u8,

    /// Bounded wait for the synchronous connected-or-pending query. A timed
    /// out query resolves to "not connected".
    #[serde(default = "default_query_wait_ms")]
    pub query_wait_ms: u64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_connection_retries: default_max_connection_retries(),
            query_wait_ms: default_query_wait_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_max_connection_retries() -> u8 {
    2
}

fn default_query_wait_ms() -> u64 {
    1_000
}

impl RouteConfig {
    /// Load configuration from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RouteConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn query_wait(&self) -> Duration {
        Duration::from_millis(self.query_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouteConfig::default();
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.retry_backoff_ms, 2_000);
        assert_eq!(config.max_connection_retries, 2);
        assert_eq!(config.query_wait_ms, 1_000);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: RouteConfig = serde_yaml::from_str("connect_timeout_ms: 750\n").unwrap();
        assert_eq!(config.connect_timeout_ms, 750);
        assert_eq!(config.retry_backoff_ms, 2_000);
        assert_eq!(config.max_connection_retries, 2);
    }

    #[test]
    fn test_durations() {
        let config = RouteConfig {
            connect_timeout_ms: 100,
            retry_backoff_ms: 50,
            max_connection_retries: 1,
            query_wait_ms: 25,
        };
        assert_eq!(config.connect_timeout(), Duration::from_millis(100));
        assert_eq!(config.retry_backoff(), Duration::from_millis(50));
        assert_eq!(config.query_wait(), Duration::from_millis(25));
    }
}
