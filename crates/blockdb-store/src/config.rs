use blockdb_cache::CacheConfig;
use blockdb_types::Codec;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, KvResult};

/// Settings shared by every blockdb database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum pending puts, and separately deletes, per batch.
    pub batch_capacity: usize,
    /// Content-type tag for digest-addressed blocks.
    pub codec: Codec,
    pub cache: CacheConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_capacity: 1024,
            codec: Codec::EthStateTrie,
            cache: CacheConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn validate(&self) -> KvResult<()> {
        if self.batch_capacity == 0 {
            return Err(KvError::Config("batch_capacity must be positive".into()));
        }
        self.cache.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> KvResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| KvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = StoreConfig::default();
        assert_eq!(c.batch_capacity, 1024);
        assert_eq!(c.codec, Codec::EthStateTrie);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parse_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            batch_capacity = 16
            codec = "eth-storage-trie"

            [cache]
            max_bytes = 1024
            "#,
        )
        .unwrap();
        assert_eq!(c.batch_capacity, 16);
        assert_eq!(c.codec, Codec::EthStorageTrie);
        assert_eq!(c.cache.max_bytes, 1024);
        assert_eq!(c.cache.fetch_timeout_ms, 500);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            StoreConfig::from_toml_str("batch_capacity = 0"),
            Err(KvError::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_codec() {
        assert!(matches!(
            StoreConfig::from_toml_str(r#"codec = "eth-nope""#),
            Err(KvError::Config(_))
        ));
    }
}
