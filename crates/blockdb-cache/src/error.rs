use std::time::Duration;

use thiserror::Error;

/// A backend fetch did not complete within the configured bound.
///
/// Every caller waiting on the fetch receives this error converted into the
/// cache's error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fetch for {key} timed out after {after:?}")]
pub struct FetchTimeout {
    pub key: String,
    pub after: Duration,
}

/// Invalid cache configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid cache config: {0}")]
    InvalidConfig(String),
}
