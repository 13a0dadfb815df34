use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Configuration for the [`ReadCache`](crate::ReadCache).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on the summed size of cached values.
    pub max_bytes: usize,
    /// How long a fetched value stays live.
    pub ttl_ms: u64,
    /// Bound on each backend fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 3 * 1024 * 1024,
            ttl_ms: 60 * 60 * 1000,
            fetch_timeout_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Reject settings under which the cache could never serve a value.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl_ms == 0 {
            return Err(CacheError::InvalidConfig("ttl_ms must be positive".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "fetch_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
