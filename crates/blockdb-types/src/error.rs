use thiserror::Error;

/// Errors produced while parsing keys and deriving content addresses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("malformed digest: expected {expected} bytes, got {actual}")]
    MalformedDigest { expected: usize, actual: usize },

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("unclassifiable key {key}: split into {parts} parts")]
    Unclassifiable { key: String, parts: usize },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("unknown codec: {0}")]
    UnknownCodec(String),
}
