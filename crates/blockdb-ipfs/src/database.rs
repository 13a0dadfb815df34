use std::sync::Arc;

use async_trait::async_trait;
use blockdb_cache::ReadCache;
use blockdb_store::{
    cache_property, AncientStore, Batch, Batcher, BlockCache, BlockStore, Compacter, Database,
    Iteratee, KeyValueReader, KeyValueWriter, KvError, KvIterator, KvResult, Snapshotter, Stater,
    StoreConfig, WriteBuffer,
};
use blockdb_types::{AddressScheme, CidScheme, ClassifiedKey, ContentAddress};
use bytes::Bytes;
use tracing::debug;

use crate::batch::BlockServiceBatch;

/// Key-value database over a content-addressed block service.
///
/// Keys are translated to CIDv1 addresses; the block service never sees the
/// original key. Reads go through a shared [`BlockCache`] and may reach the
/// network when the block is not held locally. `has` only probes the local
/// blockstore.
///
/// Ordered iteration is impossible here because addresses do not preserve
/// key order, so [`Iteratee::new_iterator`] fails with
/// [`KvError::Unsupported`].
pub struct BlockServiceDatabase {
    service: Arc<dyn BlockStore>,
    scheme: Arc<CidScheme>,
    cache: Arc<BlockCache>,
    config: StoreConfig,
}

impl BlockServiceDatabase {
    /// Create a database with its own read cache.
    pub fn new(service: Arc<dyn BlockStore>, config: StoreConfig) -> KvResult<Self> {
        let cache = Arc::new(ReadCache::new(config.cache.clone()));
        Self::with_cache(service, config, cache)
    }

    /// Create a database sharing `cache` with other handles.
    pub fn with_cache(
        service: Arc<dyn BlockStore>,
        config: StoreConfig,
        cache: Arc<BlockCache>,
    ) -> KvResult<Self> {
        config.validate()?;
        Ok(Self {
            service,
            scheme: Arc::new(CidScheme::keccak(config.codec)),
            cache,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    /// The CID string `key` is stored under.
    pub fn address(&self, key: &[u8]) -> KvResult<ContentAddress> {
        Ok(self.scheme.derive_key(key)?)
    }

    // Typed entry points. These derive from the caller's classification and
    // never run the key heuristic.

    pub async fn has_classified(&self, key: &ClassifiedKey<'_>) -> KvResult<bool> {
        let address = self.scheme.derive(key)?;
        self.service.exists(&address).await
    }

    pub async fn get_classified(&self, key: &ClassifiedKey<'_>) -> KvResult<Bytes> {
        let address = self.scheme.derive(key)?;
        let service = &self.service;
        let target = &address;
        let raw = key.raw();
        self.cache
            .get(&address, move || async move {
                match service.fetch(target).await? {
                    Some(value) => Ok(value),
                    None => {
                        debug!(address = %target, "block not found");
                        Err(KvError::NotFound(hex::encode(raw)))
                    }
                }
            })
            .await
    }

    /// Stores the block without touching the read cache, so a previously
    /// cached value for the same address stays visible until it expires.
    pub async fn put_classified(&self, key: &ClassifiedKey<'_>, value: &[u8]) -> KvResult<()> {
        let address = self.scheme.derive(key)?;
        self.service
            .store(&address, Bytes::copy_from_slice(value))
            .await
    }

    pub async fn delete_classified(&self, key: &ClassifiedKey<'_>) -> KvResult<()> {
        let address = self.scheme.derive(key)?;
        self.service.remove(&address).await?;
        self.cache.invalidate(&address);
        Ok(())
    }
}

impl std::fmt::Debug for BlockServiceDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockServiceDatabase")
            .field("codec", &self.config.codec)
            .field("online", &self.service.is_online())
            .finish()
    }
}

#[async_trait]
impl KeyValueReader for BlockServiceDatabase {
    async fn has(&self, key: &[u8]) -> KvResult<bool> {
        self.has_classified(&ClassifiedKey::classify(key)?).await
    }

    async fn get(&self, key: &[u8]) -> KvResult<Bytes> {
        self.get_classified(&ClassifiedKey::classify(key)?).await
    }
}

#[async_trait]
impl KeyValueWriter for BlockServiceDatabase {
    async fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.put_classified(&ClassifiedKey::classify(key)?, value).await
    }

    async fn delete(&self, key: &[u8]) -> KvResult<()> {
        self.delete_classified(&ClassifiedKey::classify(key)?).await
    }
}

impl Batcher for BlockServiceDatabase {
    fn new_batch(&self) -> KvResult<Box<dyn Batch>> {
        let scheme: Arc<dyn AddressScheme> = self.scheme.clone();
        let buffer = WriteBuffer::new(scheme, self.config.batch_capacity)?;
        Ok(Box::new(BlockServiceBatch::new(
            Arc::clone(&self.service),
            Arc::clone(&self.cache),
            buffer,
        )))
    }
}

impl Iteratee for BlockServiceDatabase {
    fn new_iterator(&self, _prefix: &[u8], _start: &[u8]) -> KvResult<Box<dyn KvIterator>> {
        Err(KvError::Unsupported(
            "ordered iteration over a content-addressed block service",
        ))
    }
}

#[async_trait]
impl Stater for BlockServiceDatabase {
    async fn stat(&self, property: &str) -> KvResult<String> {
        match property {
            "exchange" | "online" => Ok(self.service.is_online().to_string()),
            other => cache_property(&self.cache.stats(), other)
                .ok_or_else(|| KvError::Config(format!("unknown database property: {other}"))),
        }
    }
}

impl Compacter for BlockServiceDatabase {}

impl Snapshotter for BlockServiceDatabase {}

impl AncientStore for BlockServiceDatabase {}

#[async_trait]
impl Database for BlockServiceDatabase {
    async fn close(&self) -> KvResult<()> {
        self.service.close().await
    }
}
