use std::sync::Arc;

use async_trait::async_trait;
use blockdb_cache::ReadCache;
use blockdb_store::{
    cache_property, AncientStore, Batch, Batcher, BlockCache, Compacter, Database, Iteratee,
    KeyValueReader, KeyValueWriter, KvError, KvIterator, KvResult, Snapshotter, Stater,
    WriteBuffer,
};
use blockdb_types::{AddressScheme, BlockstoreKeyScheme, ClassifiedKey, ContentAddress};
use bytes::Bytes;
use tracing::{debug, info};

use crate::backend::RelationalBackend;
use crate::batch::SqlBatch;
use crate::config::SqlConfig;
use crate::iterator::SqlIterator;
use crate::postgres::PostgresBackend;
use crate::sqlite::SqliteBackend;

/// Key-value database over a relational block table.
///
/// Values live in `blocks` under their blockstore key (`/blocks/` plus the
/// base32 multihash); `preimages` maps each client key to that address and
/// gives ordered iteration. Reads go through a shared [`BlockCache`].
pub struct SqlDatabase {
    backend: Arc<dyn RelationalBackend>,
    scheme: Arc<BlockstoreKeyScheme>,
    cache: Arc<BlockCache>,
    config: SqlConfig,
}

impl SqlDatabase {
    /// Connect to the database `config.url` names and bootstrap the schema.
    pub async fn connect(config: SqlConfig) -> KvResult<Self> {
        config.validate()?;
        let backend: Arc<dyn RelationalBackend> = if config.is_postgres() {
            Arc::new(
                PostgresBackend::from_url(
                    &config.url,
                    config.max_connections,
                    config.statement_timeout_ms,
                )
                .await?,
            )
        } else {
            Arc::new(
                SqliteBackend::from_url(
                    &config.url,
                    config.max_connections,
                    config.statement_timeout(),
                )
                .await?,
            )
        };
        info!(backend = backend.name(), "relational database ready");
        Self::with_backend(backend, config)
    }

    /// Wrap an already-migrated backend with its own read cache.
    pub fn with_backend(backend: Arc<dyn RelationalBackend>, config: SqlConfig) -> KvResult<Self> {
        let cache = Arc::new(ReadCache::new(config.store.cache.clone()));
        Self::with_cache(backend, config, cache)
    }

    /// Wrap a backend, sharing `cache` with other handles.
    pub fn with_cache(
        backend: Arc<dyn RelationalBackend>,
        config: SqlConfig,
        cache: Arc<BlockCache>,
    ) -> KvResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            scheme: Arc::new(BlockstoreKeyScheme::default()),
            cache,
            config,
        })
    }

    pub fn config(&self) -> &SqlConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<dyn RelationalBackend> {
        &self.backend
    }

    /// The blockstore key `key` is stored under.
    pub fn address(&self, key: &[u8]) -> KvResult<ContentAddress> {
        Ok(self.scheme.derive_key(key)?)
    }

    // Typed entry points, addressed from the caller's classification.

    pub async fn has_classified(&self, key: &ClassifiedKey<'_>) -> KvResult<bool> {
        let address = self.scheme.derive(key)?;
        self.backend.has(&address).await
    }

    pub async fn get_classified(&self, key: &ClassifiedKey<'_>) -> KvResult<Bytes> {
        let address = self.scheme.derive(key)?;
        let backend = &self.backend;
        let target = &address;
        let raw = key.raw();
        self.cache
            .get(&address, move || async move {
                match backend.get(target).await? {
                    Some(value) => Ok(value),
                    None => {
                        debug!(address = %target, "block not found");
                        Err(KvError::NotFound(hex::encode(raw)))
                    }
                }
            })
            .await
    }

    /// Writes the block and its preimage record in one transaction. The
    /// read cache is not touched.
    pub async fn put_classified(&self, key: &ClassifiedKey<'_>, value: &[u8]) -> KvResult<()> {
        let address = self.scheme.derive(key)?;
        self.backend.put(key.raw(), &address, value).await
    }

    /// Removes the block and every client key that maps to it.
    pub async fn delete_classified(&self, key: &ClassifiedKey<'_>) -> KvResult<()> {
        let address = self.scheme.derive(key)?;
        self.backend.delete(key.raw(), &address).await?;
        self.cache.invalidate(&address);
        Ok(())
    }
}

impl std::fmt::Debug for SqlDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlDatabase")
            .field("backend", &self.backend.name())
            .field("pool", &self.backend.pool_stats())
            .finish()
    }
}

#[async_trait]
impl KeyValueReader for SqlDatabase {
    async fn has(&self, key: &[u8]) -> KvResult<bool> {
        self.has_classified(&ClassifiedKey::classify(key)?).await
    }

    async fn get(&self, key: &[u8]) -> KvResult<Bytes> {
        self.get_classified(&ClassifiedKey::classify(key)?).await
    }
}

#[async_trait]
impl KeyValueWriter for SqlDatabase {
    async fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.put_classified(&ClassifiedKey::classify(key)?, value).await
    }

    async fn delete(&self, key: &[u8]) -> KvResult<()> {
        self.delete_classified(&ClassifiedKey::classify(key)?).await
    }
}

impl Batcher for SqlDatabase {
    fn new_batch(&self) -> KvResult<Box<dyn Batch>> {
        let scheme: Arc<dyn AddressScheme> = self.scheme.clone();
        let buffer = WriteBuffer::new(scheme, self.config.store.batch_capacity)?;
        Ok(Box::new(SqlBatch::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.cache),
            buffer,
        )))
    }
}

impl Iteratee for SqlDatabase {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> KvResult<Box<dyn KvIterator>> {
        let scheme: Arc<dyn AddressScheme> = self.scheme.clone();
        Ok(Box::new(SqlIterator::new(
            Arc::clone(&self.backend),
            scheme,
            prefix,
            start,
            self.config.iterator_page_size,
        )))
    }
}

#[async_trait]
impl Stater for SqlDatabase {
    /// Pool and size properties are matched case-insensitively.
    async fn stat(&self, property: &str) -> KvResult<String> {
        let pool = self.backend.pool_stats();
        match property.to_ascii_lowercase().as_str() {
            "size" => Ok(self.backend.database_size().await?.to_string()),
            "idle" => Ok(pool.idle.to_string()),
            "inuse" => Ok(pool.in_use().to_string()),
            "openconnections" => Ok(pool.open.to_string()),
            "maxopenconnections" => Ok(pool.max.to_string()),
            "maxidleclosed" => Err(KvError::Unsupported("maxidleclosed")),
            "maxlifetimeclosed" => Err(KvError::Unsupported("maxlifetimeclosed")),
            "waitcount" => Err(KvError::Unsupported("waitcount")),
            "waitduration" => Err(KvError::Unsupported("waitduration")),
            _ => cache_property(&self.cache.stats(), property)
                .ok_or_else(|| KvError::Config(format!("unknown database property: {property}"))),
        }
    }
}

impl Compacter for SqlDatabase {}

impl Snapshotter for SqlDatabase {}

impl AncientStore for SqlDatabase {}

#[async_trait]
impl Database for SqlDatabase {
    async fn close(&self) -> KvResult<()> {
        self.backend.close().await;
        info!(backend = self.backend.name(), "relational database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockdb_cache::CacheConfig;
    use blockdb_store::{BlockStore, InMemoryBlockStore, KeyValueStore, StoreConfig};
    use blockdb_types::key::{HEADER_PREFIX, KEY_DELINEATION, NUMBER_DELINEATION};
    use blockdb_types::{blockstore_key, Digest};
    use std::time::Duration;

    fn digest_key(seed: &[u8]) -> Vec<u8> {
        blake3::hash(seed).as_bytes().to_vec()
    }

    fn header_key(number: u64, hash: &[u8]) -> Vec<u8> {
        let mut key = HEADER_PREFIX.to_vec();
        key.extend_from_slice(KEY_DELINEATION);
        key.extend_from_slice(&number.to_be_bytes());
        key.extend_from_slice(NUMBER_DELINEATION);
        key.extend_from_slice(hash);
        key
    }

    async fn open(config: SqlConfig) -> (tempfile::TempDir, SqlDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("blockdb.sqlite").display());
        let db = SqlDatabase::connect(SqlConfig { url, ..config }).await.unwrap();
        (dir, db)
    }

    async fn open_default() -> (tempfile::TempDir, SqlDatabase) {
        open(SqlConfig::default().with_max_connections(1)).await
    }

    // -----------------------------------------------------------------------
    // Reads and writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_then_get_and_has() {
        let (_dir, db) = open_default().await;
        let key = digest_key(b"node");
        db.put(&key, b"rlp-bytes").await.unwrap();

        assert!(db.has(&key).await.unwrap());
        assert_eq!(db.get(&key).await.unwrap(), Bytes::from_static(b"rlp-bytes"));

        let address = blockstore_key(&Digest::from_slice(&key).unwrap()).unwrap();
        assert_eq!(db.address(&key).unwrap(), address);
        assert!(address.as_str().starts_with("/blocks/"));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, db) = open_default().await;
        let err = db.get(&digest_key(b"absent")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!db.has(&digest_key(b"absent")).await.unwrap());
    }

    #[tokio::test]
    async fn literal_keys_are_updatable() {
        let (_dir, db) = open_default().await;
        db.put(b"LastBlock", b"\x01").await.unwrap();
        db.put(b"LastBlock", b"\x02").await.unwrap();
        db.cache().clear();
        assert_eq!(db.get(b"LastBlock").await.unwrap(), Bytes::from_static(b"\x02"));
    }

    #[tokio::test]
    async fn header_and_digest_keys_share_one_block() {
        let (_dir, db) = open_default().await;
        let hash = digest_key(b"header");
        let header = header_key(7, &hash);

        db.put(&header, b"header-rlp").await.unwrap();
        db.put(&hash, b"header-rlp").await.unwrap();
        assert_eq!(db.get(&hash).await.unwrap(), Bytes::from_static(b"header-rlp"));

        db.delete(&hash).await.unwrap();
        assert!(db.get(&hash).await.unwrap_err().is_not_found());
        assert!(!db.has(&header).await.unwrap());
        assert!(db.get(&header).await.unwrap_err().is_not_found());

        let mut iter = db.new_iterator(b"", b"").unwrap();
        assert!(!iter.next().await);
        assert!(iter.error().is_none());
    }

    #[tokio::test]
    async fn shared_address_delete_matches_block_service() {
        use blockdb_ipfs::BlockServiceDatabase;

        let (_dir, db) = open_default().await;
        let service = BlockServiceDatabase::new(
            Arc::new(InMemoryBlockStore::new()),
            StoreConfig::default(),
        )
        .unwrap();
        let hash = digest_key(b"parity");
        let header = header_key(9, &hash);

        for store in [&db as &dyn KeyValueStore, &service] {
            store.put(&header, b"h").await.unwrap();
            store.put(&hash, b"h").await.unwrap();
            store.delete(&header).await.unwrap();
            assert!(!store.has(&hash).await.unwrap());
            assert!(store.get(&hash).await.unwrap_err().is_not_found());
        }
    }

    #[tokio::test]
    async fn classified_literal_is_stored_verbatim() {
        let (_dir, db) = open_default().await;
        let raw = [0x11u8; 32];
        let literal = ClassifiedKey::literal(&raw);
        db.put_classified(&literal, b"config").await.unwrap();

        assert!(db.has_classified(&literal).await.unwrap());
        assert_eq!(db.get_classified(&literal).await.unwrap(), Bytes::from_static(b"config"));
        assert!(!db.has(&raw).await.unwrap());
        assert_eq!(
            db.backend().get(&ContentAddress::new(hex::encode(raw))).await.unwrap(),
            Some(Bytes::from_static(b"config"))
        );

        db.delete_classified(&literal).await.unwrap();
        assert!(!db.has_classified(&literal).await.unwrap());
    }

    #[tokio::test]
    async fn classified_digest_ignores_embedded_delimiter() {
        let (_dir, db) = open_default().await;
        let mut bytes = [0x42u8; 32];
        bytes[10..15].copy_from_slice(b"-fix-");
        let digest = Digest::from_array(bytes);
        let hashed = ClassifiedKey::hashed(&digest);
        db.put_classified(&hashed, b"node").await.unwrap();

        let expected = blockstore_key(&digest).unwrap();
        assert_eq!(
            db.backend().get(&expected).await.unwrap(),
            Some(Bytes::from_static(b"node"))
        );
        assert_ne!(db.address(&bytes).unwrap(), expected);
        assert!(!db.has(&bytes).await.unwrap());
        assert_eq!(db.get_classified(&hashed).await.unwrap(), Bytes::from_static(b"node"));
    }

    #[tokio::test]
    async fn batch_accepts_classified_keys() {
        let (_dir, db) = open_default().await;
        let digest = Digest::from_array([0x24; 32]);
        let raw = [0x33u8; 32];

        let mut batch = db.new_batch().unwrap();
        batch.put_classified(&ClassifiedKey::hashed(&digest), b"a").unwrap();
        batch.put_classified(&ClassifiedKey::literal(&raw), b"b").unwrap();
        batch.write().await.unwrap();

        assert!(db.has_classified(&ClassifiedKey::hashed(&digest)).await.unwrap());
        assert!(db.has_classified(&ClassifiedKey::literal(&raw)).await.unwrap());
        assert!(!db.has(&raw).await.unwrap());

        let mut batch = db.new_batch().unwrap();
        batch.delete_classified(&ClassifiedKey::literal(&raw)).unwrap();
        batch.write().await.unwrap();
        assert!(!db.has_classified(&ClassifiedKey::literal(&raw)).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_keys_are_rejected() {
        let (_dir, db) = open_default().await;
        assert!(matches!(
            db.put(&[3u8; 40], b"v").await,
            Err(KvError::MalformedDigest { .. })
        ));
        assert!(matches!(
            db.get(b"a-fix-b-fix-c-fix-d").await,
            Err(KvError::Classification(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Read cache
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_invalidates_cached_value() {
        let (_dir, db) = open_default().await;
        let key = digest_key(b"doomed");
        db.put(&key, b"v1").await.unwrap();
        db.get(&key).await.unwrap();

        db.delete(&key).await.unwrap();
        assert!(db.get(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn put_leaves_cached_value_in_place() {
        let (_dir, db) = open_default().await;
        let key = digest_key(b"mutable");
        db.put(&key, b"v1").await.unwrap();
        assert_eq!(db.get(&key).await.unwrap(), Bytes::from_static(b"v1"));

        db.put(&key, b"v2").await.unwrap();
        assert_eq!(db.get(&key).await.unwrap(), Bytes::from_static(b"v1"));
        assert_eq!(db.stat("cache.hits").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn shared_cache_across_backends() {
        let cache: Arc<BlockCache> = Arc::new(ReadCache::new(
            CacheConfig::new().with_ttl(Duration::from_secs(60)),
        ));
        let (_dir, db) = open_default().await;
        let other = SqlDatabase::with_cache(
            Arc::clone(db.backend()),
            db.config().clone(),
            Arc::clone(&cache),
        )
        .unwrap();
        let again =
            SqlDatabase::with_cache(Arc::clone(db.backend()), db.config().clone(), cache).unwrap();

        let key = digest_key(b"shared");
        other.put(&key, b"v").await.unwrap();
        other.get(&key).await.unwrap();
        again.get(&key).await.unwrap();
        assert_eq!(again.stat("cache.loads").await.unwrap(), "1");
        assert_eq!(again.stat("cache.hits").await.unwrap(), "1");
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn batch_commits_puts_and_deletes_together() {
        let (_dir, db) = open_default().await;
        let stale = digest_key(b"stale");
        db.put(&stale, b"old").await.unwrap();
        db.get(&stale).await.unwrap();

        let mut batch = db.new_batch().unwrap();
        let k1 = digest_key(b"k1");
        batch.put(&k1, b"one").unwrap();
        batch.put(b"LastBlock", b"\x05").unwrap();
        batch.delete(&stale).unwrap();
        batch.write().await.unwrap();

        assert_eq!(db.get(&k1).await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(db.get(b"LastBlock").await.unwrap(), Bytes::from_static(b"\x05"));
        assert!(db.get(&stale).await.unwrap_err().is_not_found());
        assert_eq!(batch.value_size(), 4);
    }

    #[tokio::test]
    async fn failed_batch_keeps_its_buffer() {
        let (_dir, db) = open_default().await;
        let kept = digest_key(b"kept");
        db.put(&kept, b"kept").await.unwrap();

        let mut batch = db.new_batch().unwrap();
        batch.put(&digest_key(b"new"), b"new").unwrap();
        batch.delete(&kept).unwrap();

        db.close().await.unwrap();
        assert!(batch.write().await.is_err());
        assert_eq!(batch.value_size(), 3);
    }

    #[tokio::test]
    async fn batch_overflow_warns() {
        let (_dir, db) = open(
            SqlConfig::default()
                .with_max_connections(1)
                .with_store(StoreConfig::default().with_batch_capacity(2)),
        )
        .await;
        let keys: Vec<Vec<u8>> = (0u8..3).map(|i| digest_key(&[i])).collect();

        let mut batch = db.new_batch().unwrap();
        batch.put(&keys[0], b"a").unwrap();
        batch.put(&keys[1], b"b").unwrap();
        assert!(batch.put(&keys[2], b"c").unwrap_err().is_warning());

        batch.write().await.unwrap();
        assert!(!db.has(&keys[0]).await.unwrap());
        assert!(db.has(&keys[1]).await.unwrap());
        assert!(db.has(&keys[2]).await.unwrap());
    }

    /// Writes into a block store under the relational blockstore keys.
    struct BlockWriter(Arc<InMemoryBlockStore>);

    #[async_trait]
    impl KeyValueWriter for BlockWriter {
        async fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
            let address = BlockstoreKeyScheme::default().derive_key(key)?;
            self.0.store(&address, Bytes::copy_from_slice(value)).await
        }

        async fn delete(&self, key: &[u8]) -> KvResult<()> {
            let address = BlockstoreKeyScheme::default().derive_key(key)?;
            self.0.remove(&address).await.map(|_| ())
        }
    }

    #[tokio::test]
    async fn replay_copies_a_batch_into_a_block_store() {
        let (_dir, db) = open_default().await;
        let service = Arc::new(InMemoryBlockStore::new());
        let target = BlockWriter(service.clone());

        let mut batch = db.new_batch().unwrap();
        batch.put(b"LastBlock", b"\x01").unwrap();
        batch.replay(&target).await.unwrap();
        assert_eq!(service.len(), 1);
        assert!(!db.has(b"LastBlock").await.unwrap());
    }

    // -----------------------------------------------------------------------
    // Iteration
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn iterates_keys_in_byte_order() {
        let (_dir, db) = open(
            SqlConfig::default()
                .with_max_connections(1)
                .with_iterator_page_size(2),
        )
        .await;
        for key in [b"acct-3".as_slice(), b"acct-1", b"code-1", b"acct-2"] {
            db.put(key, key).await.unwrap();
        }

        let mut iter = db.new_iterator(b"acct-", b"2").unwrap();
        let mut seen = Vec::new();
        while iter.next().await {
            seen.push((iter.key().unwrap().to_vec(), iter.value().await.unwrap()));
        }
        assert!(iter.error().is_none());
        assert_eq!(
            seen,
            vec![
                (b"acct-2".to_vec(), Bytes::from_static(b"acct-2")),
                (b"acct-3".to_vec(), Bytes::from_static(b"acct-3")),
            ]
        );
        iter.release();
    }

    #[tokio::test]
    async fn deleted_keys_leave_the_index() {
        let (_dir, db) = open_default().await;
        db.put(b"a", b"1").await.unwrap();
        db.put(b"b", b"2").await.unwrap();
        db.delete(b"a").await.unwrap();

        let mut iter = db.new_iterator(b"", b"").unwrap();
        assert!(iter.next().await);
        assert_eq!(iter.key(), Some(b"b".as_slice()));
        assert!(!iter.next().await);
    }

    // -----------------------------------------------------------------------
    // Stats and stubs
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pool_and_size_stats() {
        let (_dir, db) = open_default().await;
        assert!(db.stat("size").await.unwrap().parse::<u64>().unwrap() > 0);
        assert_eq!(db.stat("MaxOpenConnections").await.unwrap(), "1");
        assert!(db.stat("openconnections").await.unwrap().parse::<u32>().unwrap() <= 1);
        db.stat("idle").await.unwrap().parse::<u32>().unwrap();
        db.stat("inuse").await.unwrap().parse::<u32>().unwrap();
    }

    #[tokio::test]
    async fn untracked_pool_stats_are_unsupported() {
        let (_dir, db) = open_default().await;
        for property in ["maxidleclosed", "maxlifetimeclosed", "waitcount", "WaitDuration"] {
            assert!(matches!(db.stat(property).await, Err(KvError::Unsupported(_))));
        }
        assert!(matches!(db.stat("leveldb.stats").await, Err(KvError::Config(_))));
        assert_eq!(db.stat("cache.misses").await.unwrap(), "0");
    }

    #[tokio::test]
    async fn archive_and_compaction_are_unsupported() {
        let (_dir, db) = open_default().await;
        assert!(matches!(db.compact(b"", b"").await, Err(KvError::Unsupported("compact"))));
        assert!(matches!(db.tail().await, Err(KvError::Unsupported(_))));
        assert!(matches!(db.ancient("bodies", 1).await, Err(KvError::Unsupported(_))));
        assert!(matches!(db.sync().await, Err(KvError::Unsupported(_))));
        assert!(matches!(db.new_snapshot(), Err(KvError::Unsupported(_))));
    }

    #[tokio::test]
    async fn connect_rejects_bad_config() {
        let err = SqlDatabase::connect(SqlConfig::new("mysql://nope")).await.unwrap_err();
        assert!(matches!(err, KvError::Config(_)));
    }
}
