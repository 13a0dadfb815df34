use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use blockdb_cache::{CacheError, FetchTimeout};
use blockdb_types::TypeError;

/// Errors surfaced by every blockdb database.
///
/// Cloneable so a single backend result can be handed to every caller
/// waiting on the same fetch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    /// A digest component was not exactly 32 bytes.
    #[error("malformed digest: expected {expected} bytes, got {actual}")]
    MalformedDigest { expected: usize, actual: usize },

    /// The key matched none of the known layouts.
    #[error("key classification failed: {0}")]
    Classification(String),

    /// The address encoder could not represent the input.
    #[error("address encoding failed: {0}")]
    Encoding(String),

    /// No value is stored under the key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A batch buffer overflowed and dropped its least recent entry. The
    /// operation that returned this was still buffered.
    #[error("batch {kind} buffer evicted pending entry for key {key}")]
    EvictionWarning { kind: &'static str, key: String },

    /// The backing store failed.
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// The operation has no implementation on this backend.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// A backend fetch exceeded its time bound.
    #[error("fetch for {key} timed out after {after:?}")]
    Timeout { key: String, after: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Wrap a driver error.
    pub fn backend<E>(backend: &'static str, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        KvError::Backend {
            backend,
            source: Arc::new(err),
        }
    }

    /// Informational errors leave the operation applied.
    pub fn is_warning(&self) -> bool {
        matches!(self, KvError::EvictionWarning { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound(_))
    }
}

impl From<TypeError> for KvError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::MalformedDigest { expected, actual } => {
                KvError::MalformedDigest { expected, actual }
            }
            TypeError::Unclassifiable { .. } | TypeError::InvalidHex(_) => {
                KvError::Classification(err.to_string())
            }
            TypeError::Encoding(msg) => KvError::Encoding(msg),
            TypeError::UnknownCodec(_) => KvError::Config(err.to_string()),
        }
    }
}

impl From<FetchTimeout> for KvError {
    fn from(err: FetchTimeout) -> Self {
        KvError::Timeout {
            key: err.key,
            after: err.after,
        }
    }
}

impl From<CacheError> for KvError {
    fn from(err: CacheError) -> Self {
        KvError::Config(err.to_string())
    }
}

/// Result alias for database operations.
pub type KvResult<T> = Result<T, KvError>;
