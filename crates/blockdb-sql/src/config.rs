use std::time::Duration;

use blockdb_store::{KvError, KvResult, StoreConfig};
use serde::{Deserialize, Serialize};

/// Connection settings for the relational database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// `sqlite:<path>` or `postgres://...`.
    pub url: String,
    pub max_connections: u32,
    /// PostgreSQL `statement_timeout`, or the SQLite busy timeout.
    pub statement_timeout_ms: Option<u64>,
    /// Keys fetched per iterator page.
    pub iterator_page_size: usize,
    pub store: StoreConfig,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://blockdb.sqlite".to_string(),
            max_connections: 10,
            statement_timeout_ms: None,
            iterator_page_size: 256,
            store: StoreConfig::default(),
        }
    }
}

impl SqlConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_iterator_page_size(mut self, page_size: usize) -> Self {
        self.iterator_page_size = page_size;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// Whether `url` names a PostgreSQL server.
    pub fn is_postgres(&self) -> bool {
        self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")
    }

    pub fn validate(&self) -> KvResult<()> {
        if !self.is_postgres() && !self.url.starts_with("sqlite:") {
            return Err(KvError::Config(format!(
                "unsupported database url: {}",
                self.url
            )));
        }
        if self.max_connections == 0 {
            return Err(KvError::Config("max_connections must be positive".into()));
        }
        if self.iterator_page_size == 0 {
            return Err(KvError::Config("iterator_page_size must be positive".into()));
        }
        self.store.validate()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> KvResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| KvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
