use async_trait::async_trait;
use blockdb_types::{ClassifiedKey, ContentAddress};
use bytes::Bytes;

use crate::error::{KvError, KvResult};

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// Content-addressed block service.
///
/// Implementations must satisfy these invariants:
/// - A block is stored under the address the caller supplies; the service
///   does not recompute it.
/// - `fetch` of an absent block is `Ok(None)`, never an error.
/// - All I/O errors are propagated as [`KvError::Backend`].
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Retrieve a block, possibly from the network.
    async fn fetch(&self, address: &ContentAddress) -> KvResult<Option<Bytes>>;

    /// Whether the block is held locally.
    async fn exists(&self, address: &ContentAddress) -> KvResult<bool>;

    async fn store(&self, address: &ContentAddress, data: Bytes) -> KvResult<()>;

    /// Drop a block. Returns `true` if it was present.
    async fn remove(&self, address: &ContentAddress) -> KvResult<bool>;

    /// Store many blocks in one call.
    ///
    /// Default implementation calls `store()` for each block and stops at the
    /// first failure. Services with a native batch add should override.
    async fn store_batch(&self, blocks: Vec<(ContentAddress, Bytes)>) -> KvResult<()> {
        for (address, data) in blocks {
            self.store(&address, data).await?;
        }
        Ok(())
    }

    /// Whether the block exchange is connected to the network.
    fn is_online(&self) -> bool;

    async fn close(&self) -> KvResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Database facade
// ---------------------------------------------------------------------------

#[async_trait]
pub trait KeyValueReader: Send + Sync {
    /// Probe the backend for `key`.
    async fn has(&self, key: &[u8]) -> KvResult<bool>;

    /// Fetch the value for `key`, or [`KvError::NotFound`].
    async fn get(&self, key: &[u8]) -> KvResult<Bytes>;
}

#[async_trait]
pub trait KeyValueWriter: Send + Sync {
    async fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()>;

    async fn delete(&self, key: &[u8]) -> KvResult<()>;
}

/// A write-only buffer of puts and deletes committed together by `write`.
#[async_trait]
pub trait Batch: Send + Sync {
    /// Buffer a put. May return [`KvError::EvictionWarning`] after buffering.
    fn put(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.put_classified(&ClassifiedKey::classify(key)?, value)
    }

    /// Buffer a delete. May return [`KvError::EvictionWarning`] after buffering.
    fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.delete_classified(&ClassifiedKey::classify(key)?)
    }

    /// Buffer a put under the address `key` derives to as classified.
    fn put_classified(&mut self, key: &ClassifiedKey<'_>, value: &[u8]) -> KvResult<()>;

    fn delete_classified(&mut self, key: &ClassifiedKey<'_>) -> KvResult<()>;

    /// Bytes of value data buffered since the last reset.
    fn value_size(&self) -> usize;

    /// Flush buffered puts, then deletes. The buffer is kept afterwards.
    async fn write(&mut self) -> KvResult<()>;

    fn reset(&mut self);

    /// Re-apply the buffered puts, then deletes, against `writer`.
    async fn replay(&self, writer: &dyn KeyValueWriter) -> KvResult<()>;
}

pub trait Batcher: Send + Sync {
    fn new_batch(&self) -> KvResult<Box<dyn Batch>>;
}

/// Position of a [`KvIterator`].
#[derive(Debug, Clone)]
pub enum IteratorState {
    /// Created; `next` has not been called.
    Pending,
    Positioned(Vec<u8>),
    Exhausted,
    Errored(KvError),
}

/// Forward cursor over keys in byte order.
#[async_trait]
pub trait KvIterator: Send {
    /// Advance. Returns `false` once exhausted or failed; `error` tells
    /// which.
    async fn next(&mut self) -> bool;

    fn error(&self) -> Option<&KvError>;

    /// Key at the current position.
    fn key(&self) -> Option<&[u8]>;

    /// Value at the current position, fetched on every call. Before the
    /// first `next` or after exhaustion this is [`KvError::Unsupported`].
    async fn value(&mut self) -> KvResult<Bytes>;

    /// Drop held resources. Idempotent.
    fn release(&mut self);
}

pub trait Iteratee: Send + Sync {
    /// Iterate keys beginning with `prefix`, starting at `prefix ++ start`.
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> KvResult<Box<dyn KvIterator>>;
}

#[async_trait]
pub trait Stater: Send + Sync {
    /// Report a backend property by name.
    async fn stat(&self, property: &str) -> KvResult<String>;
}

#[async_trait]
pub trait Compacter: Send + Sync {
    async fn compact(&self, _start: &[u8], _limit: &[u8]) -> KvResult<()> {
        Err(KvError::Unsupported("compact"))
    }
}

pub trait Snapshotter: Send + Sync {
    fn new_snapshot(&self) -> KvResult<Box<dyn KeyValueReader>> {
        Err(KvError::Unsupported("new_snapshot"))
    }
}

/// Append-only archive of frozen chain segments. blockdb keeps no archive
/// tier, so every default answers [`KvError::Unsupported`].
#[async_trait]
pub trait AncientStore: Send + Sync {
    async fn has_ancient(&self, _kind: &str, _number: u64) -> KvResult<bool> {
        Err(KvError::Unsupported("has_ancient"))
    }

    async fn ancient(&self, _kind: &str, _number: u64) -> KvResult<Bytes> {
        Err(KvError::Unsupported("ancient"))
    }

    async fn ancient_range(
        &self,
        _kind: &str,
        _start: u64,
        _count: u64,
        _max_bytes: u64,
    ) -> KvResult<Vec<Bytes>> {
        Err(KvError::Unsupported("ancient_range"))
    }

    async fn ancients(&self) -> KvResult<u64> {
        Err(KvError::Unsupported("ancients"))
    }

    async fn tail(&self) -> KvResult<u64> {
        Err(KvError::Unsupported("tail"))
    }

    async fn ancient_size(&self, _kind: &str) -> KvResult<u64> {
        Err(KvError::Unsupported("ancient_size"))
    }

    async fn truncate_head(&self, _items: u64) -> KvResult<u64> {
        Err(KvError::Unsupported("truncate_head"))
    }

    async fn truncate_tail(&self, _items: u64) -> KvResult<u64> {
        Err(KvError::Unsupported("truncate_tail"))
    }

    async fn sync(&self) -> KvResult<()> {
        Err(KvError::Unsupported("sync"))
    }

    async fn ancient_datadir(&self) -> KvResult<String> {
        Err(KvError::Unsupported("ancient_datadir"))
    }
}

/// Everything a client needs from a key-value store.
pub trait KeyValueStore:
    KeyValueReader + KeyValueWriter + Batcher + Iteratee + Stater + Compacter + Snapshotter
{
}

impl<T> KeyValueStore for T where
    T: KeyValueReader + KeyValueWriter + Batcher + Iteratee + Stater + Compacter + Snapshotter
{
}

/// A [`KeyValueStore`] with an archive tier and a lifecycle.
#[async_trait]
pub trait Database: KeyValueStore + AncientStore {
    /// Release the backend connection.
    async fn close(&self) -> KvResult<()>;
}
