use async_trait::async_trait;
use blockdb_store::{KvResult, WriteBuffer};
use blockdb_types::ContentAddress;
use bytes::Bytes;

/// Connection-pool counters reported through `stat`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, idle or in use.
    pub open: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolStats {
    pub fn in_use(&self) -> u32 {
        self.open.saturating_sub(self.idle)
    }
}

/// Relational storage for blocks and their preimage index.
///
/// Two tables back every implementation: `blocks(key, data)` holds values
/// under their derived address, and `preimages(original_key, key)` maps
/// each client key to that address. Every write keeps the two in step
/// inside a single transaction.
#[async_trait]
pub trait RelationalBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the tables if they do not exist.
    async fn migrate(&self) -> KvResult<()>;

    async fn has(&self, address: &ContentAddress) -> KvResult<bool>;

    async fn get(&self, address: &ContentAddress) -> KvResult<Option<Bytes>>;

    /// Upsert the block and its preimage record together.
    async fn put(&self, key: &[u8], address: &ContentAddress, value: &[u8]) -> KvResult<()>;

    /// Drop the block at `address` along with every preimage pointing at it.
    async fn delete(&self, key: &[u8], address: &ContentAddress) -> KvResult<()>;

    /// Apply every buffered put, then every buffered delete, in one
    /// transaction.
    async fn apply(&self, buffer: &WriteBuffer) -> KvResult<()>;

    /// Up to `limit` indexed keys `>= from`, ascending.
    async fn scan_keys(&self, from: &[u8], limit: usize) -> KvResult<Vec<Vec<u8>>>;

    /// Size of the database in bytes.
    async fn database_size(&self) -> KvResult<u64>;

    fn pool_stats(&self) -> PoolStats;

    async fn close(&self);
}
