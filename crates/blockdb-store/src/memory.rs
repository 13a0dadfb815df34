use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use blockdb_types::ContentAddress;
use bytes::Bytes;

use crate::error::{KvError, KvResult};
use crate::traits::BlockStore;

/// Failure raised by [`InMemoryBlockStore`] fault injection.
#[derive(Debug, thiserror::Error)]
#[error("injected fault: {0}")]
pub struct InjectedFault(pub String);

/// Per-operation call counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetches: u64,
    pub exists: u64,
    pub stores: u64,
    pub removes: u64,
    pub batches: u64,
}

#[derive(Default)]
struct Counters {
    fetches: AtomicU64,
    exists: AtomicU64,
    stores: AtomicU64,
    removes: AtomicU64,
    batches: AtomicU64,
}

#[derive(Default)]
struct Faults {
    all: Option<String>,
    addresses: HashSet<ContentAddress>,
}

/// In-memory, HashMap-based block service.
///
/// Intended for tests and embedding. Blocks are held behind a `RwLock`.
/// Call counters, an optional artificial fetch latency, and fault injection
/// let tests observe coalescing and exercise failure paths.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<ContentAddress, Bytes>>,
    counters: Counters,
    latency: RwLock<Option<Duration>>,
    faults: RwLock<Faults>,
    online: AtomicBool,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            latency: RwLock::new(None),
            faults: RwLock::new(Faults::default()),
            online: AtomicBool::new(true),
        }
    }

    /// Delay every `fetch` by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().expect("lock poisoned") = latency;
    }

    /// Fail every operation with `message` until cleared.
    pub fn set_error(&self, message: Option<&str>) {
        self.faults.write().expect("lock poisoned").all = message.map(str::to_string);
    }

    /// Fail every operation that touches `address`.
    pub fn fail_on(&self, address: ContentAddress) {
        self.faults
            .write()
            .expect("lock poisoned")
            .addresses
            .insert(address);
    }

    pub fn clear_faults(&self) {
        *self.faults.write().expect("lock poisoned") = Faults::default();
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            exists: self.counters.exists.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            removes: self.counters.removes.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Read a block directly, bypassing counters, latency and faults.
    pub fn peek(&self, address: &ContentAddress) -> Option<Bytes> {
        self.blocks
            .read()
            .expect("lock poisoned")
            .get(address)
            .cloned()
    }

    fn check(&self, address: &ContentAddress) -> KvResult<()> {
        let faults = self.faults.read().expect("lock poisoned");
        if let Some(message) = &faults.all {
            return Err(KvError::backend("memory", InjectedFault(message.clone())));
        }
        if faults.addresses.contains(address) {
            return Err(KvError::backend(
                "memory",
                InjectedFault(format!("address {address}")),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn fetch(&self, address: &ContentAddress) -> KvResult<Option<Bytes>> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read().expect("lock poisoned");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check(address)?;
        Ok(self.peek(address))
    }

    async fn exists(&self, address: &ContentAddress) -> KvResult<bool> {
        self.counters.exists.fetch_add(1, Ordering::SeqCst);
        self.check(address)?;
        Ok(self
            .blocks
            .read()
            .expect("lock poisoned")
            .contains_key(address))
    }

    async fn store(&self, address: &ContentAddress, data: Bytes) -> KvResult<()> {
        self.counters.stores.fetch_add(1, Ordering::SeqCst);
        self.check(address)?;
        self.blocks
            .write()
            .expect("lock poisoned")
            .insert(address.clone(), data);
        Ok(())
    }

    async fn remove(&self, address: &ContentAddress) -> KvResult<bool> {
        self.counters.removes.fetch_add(1, Ordering::SeqCst);
        self.check(address)?;
        Ok(self
            .blocks
            .write()
            .expect("lock poisoned")
            .remove(address)
            .is_some())
    }

    /// All-or-nothing: every address is checked before any block is stored.
    async fn store_batch(&self, blocks: Vec<(ContentAddress, Bytes)>) -> KvResult<()> {
        self.counters.batches.fetch_add(1, Ordering::SeqCst);
        for (address, _) in &blocks {
            self.check(address)?;
        }
        let mut map = self.blocks.write().expect("lock poisoned");
        map.extend(blocks);
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    async fn close(&self) -> KvResult<()> {
        let faults = self.faults.read().expect("lock poisoned");
        match &faults.all {
            Some(message) => Err(KvError::backend("memory", InjectedFault(message.clone()))),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("block_count", &self.len())
            .field("online", &self.is_online())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> ContentAddress {
        ContentAddress::new(s)
    }

    #[tokio::test]
    async fn store_fetch_remove() {
        let store = InMemoryBlockStore::new();
        store.store(&addr("a"), Bytes::from_static(b"1")).await.unwrap();
        assert!(store.exists(&addr("a")).await.unwrap());
        assert_eq!(
            store.fetch(&addr("a")).await.unwrap(),
            Some(Bytes::from_static(b"1"))
        );
        assert!(store.remove(&addr("a")).await.unwrap());
        assert!(!store.remove(&addr("a")).await.unwrap());
        assert_eq!(store.fetch(&addr("a")).await.unwrap(), None);

        let calls = store.calls();
        assert_eq!(calls.stores, 1);
        assert_eq!(calls.fetches, 2);
        assert_eq!(calls.removes, 2);
    }

    #[tokio::test]
    async fn global_fault_fails_everything() {
        let store = InMemoryBlockStore::new();
        store.set_error(Some("offline disk"));
        let err = store.fetch(&addr("a")).await.unwrap_err();
        assert!(err.to_string().contains("offline disk"));
        assert!(store.close().await.is_err());

        store.clear_faults();
        assert!(store.close().await.is_ok());
    }

    #[tokio::test]
    async fn batch_with_faulty_address_stores_nothing() {
        let store = InMemoryBlockStore::new();
        store.fail_on(addr("bad"));
        let result = store
            .store_batch(vec![
                (addr("good"), Bytes::from_static(b"g")),
                (addr("bad"), Bytes::from_static(b"b")),
            ])
            .await;
        assert!(matches!(result, Err(KvError::Backend { backend: "memory", .. })));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_fetch() {
        let store = InMemoryBlockStore::new().with_latency(Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        store.fetch(&addr("a")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn online_toggle() {
        let store = InMemoryBlockStore::new();
        assert!(store.is_online());
        store.set_online(false);
        assert!(!store.is_online());
    }
}
