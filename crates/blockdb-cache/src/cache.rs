use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::FetchTimeout;

type Slot<E> = Option<Result<Bytes, E>>;
type Flight<E> = Arc<watch::Sender<Slot<E>>>;

/// Snapshot of cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a live entry.
    pub hits: u64,
    /// Lookups that found no live entry.
    pub misses: u64,
    /// Backend fetches started.
    pub loads: u64,
    /// Lookups that waited on another caller's fetch.
    pub coalesced: u64,
    /// Entries dropped to stay under the size bound.
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

struct Entry {
    value: Bytes,
    expires_at: Instant,
    tick: u64,
}

struct Inner<K, E> {
    entries: HashMap<K, Entry>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    bytes: usize,
    inflight: HashMap<K, Flight<E>>,
}

impl<K: Eq + Hash + Clone, E> Inner<K, E> {
    fn lookup(&mut self, key: &K, now: Instant) -> Option<Bytes> {
        let entry = self.entries.get_mut(key)?;
        if entry.expires_at <= now {
            self.remove(key);
            return None;
        }
        self.recency.remove(&entry.tick);
        self.next_tick += 1;
        entry.tick = self.next_tick;
        self.recency.insert(entry.tick, key.clone());
        Some(entry.value.clone())
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                self.bytes -= entry.value.len();
                true
            }
            None => false,
        }
    }

    /// Insert and return the number of entries evicted to make room.
    fn insert(&mut self, key: K, value: Bytes, expires_at: Instant, max_bytes: usize) -> u64 {
        self.remove(&key);
        let mut evicted = 0;
        while self.bytes + value.len() > max_bytes {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.bytes -= entry.value.len();
                evicted += 1;
            }
        }
        self.next_tick += 1;
        self.bytes += value.len();
        self.recency.insert(self.next_tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                tick: self.next_tick,
            },
        );
        evicted
    }

    fn is_current(&self, key: &K, flight: &Flight<E>) -> bool {
        self.inflight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
    }
}

/// Expiring, size-bounded read cache with single-flight loading.
///
/// At most one backend fetch runs per key at a time. Callers that miss while
/// a fetch is in progress wait for it and receive a clone of its result,
/// success or error. Only successful results are cached; errors and
/// timeouts are delivered to the waiters and then forgotten.
///
/// If the caller driving a fetch is cancelled, one of its waiters starts a
/// new fetch with its own loader.
pub struct ReadCache<K, E> {
    config: CacheConfig,
    inner: Mutex<Inner<K, E>>,
    counters: Counters,
}

enum Role<E> {
    Lead(Flight<E>),
    Wait(watch::Receiver<Slot<E>>),
}

impl<K, E> ReadCache<K, E>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
    E: Clone + Send + Sync + From<FetchTimeout>,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                bytes: 0,
                inflight: HashMap::new(),
            }),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, E>> {
        self.inner.lock().expect("cache lock poisoned")
    }

    /// Return the live value for `key`, loading it with `fetch` on a miss.
    pub async fn get<F, Fut>(&self, key: &K, fetch: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let mut counted = false;
        loop {
            let role = {
                let mut inner = self.lock();
                if let Some(value) = inner.lookup(key, Instant::now()) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                if !counted {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    counted = true;
                }
                match inner.inflight.get(key) {
                    Some(flight) => Role::Wait(flight.subscribe()),
                    None => {
                        let flight: Flight<E> = Arc::new(watch::channel(None).0);
                        inner.inflight.insert(key.clone(), Arc::clone(&flight));
                        Role::Lead(flight)
                    }
                }
            };

            match role {
                Role::Lead(flight) => return self.lead(key, flight, fetch).await,
                Role::Wait(mut rx) => {
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    loop {
                        let published = rx.borrow_and_update().clone();
                        if let Some(result) = published {
                            return result;
                        }
                        if rx.changed().await.is_err() {
                            debug!(key = %key, "fetch leader went away; retrying");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn lead<F, Fut>(&self, key: &K, flight: Flight<E>, fetch: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let guard = FlightGuard {
            cache: self,
            key,
            flight: &flight,
            armed: true,
        };
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        let bound = self.config.fetch_timeout();
        let result = match tokio::time::timeout(bound, fetch()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key = %key, timeout_ms = bound.as_millis() as u64, "backend fetch timed out");
                Err(E::from(FetchTimeout {
                    key: key.to_string(),
                    after: bound,
                }))
            }
        };

        {
            let mut inner = self.lock();
            if inner.is_current(key, &flight) {
                inner.inflight.remove(key);
                if let Ok(value) = &result {
                    if value.len() > self.config.max_bytes {
                        debug!(key = %key, size = value.len(), "value exceeds cache size; not cached");
                    } else {
                        let expires_at = Instant::now() + self.config.ttl();
                        let evicted =
                            inner.insert(key.clone(), value.clone(), expires_at, self.config.max_bytes);
                        self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
                    }
                }
            } else {
                debug!(key = %key, "fetch detached by invalidation; result not cached");
            }
        }
        guard.disarm();

        flight.send_replace(Some(result.clone()));
        result
    }

    /// Drop the entry for `key` and detach any fetch in progress, so its
    /// result is delivered to existing waiters but never cached.
    pub fn invalidate(&self, key: &K) {
        let mut inner = self.lock();
        let removed = inner.remove(key);
        let detached = inner.inflight.remove(key).is_some();
        if removed || detached {
            debug!(key = %key, removed, detached, "cache entry invalidated");
        }
    }

    /// Peek at a live entry without touching counters or recency.
    pub fn peek(&self, key: &K) -> Option<Bytes> {
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.recency.clear();
        inner.bytes = 0;
        inner.inflight.clear();
    }

    /// Number of entries held, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed size of held values.
    pub fn size_bytes(&self) -> usize {
        self.lock().bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K, E> fmt::Debug for ReadCache<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Unregisters an in-flight fetch whose leader is dropped before finishing.
struct FlightGuard<'a, K, E>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
    E: Clone + Send + Sync + From<FetchTimeout>,
{
    cache: &'a ReadCache<K, E>,
    key: &'a K,
    flight: &'a Flight<E>,
    armed: bool,
}

impl<K, E> FlightGuard<'_, K, E>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
    E: Clone + Send + Sync + From<FetchTimeout>,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, E> Drop for FlightGuard<'_, K, E>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
    E: Clone + Send + Sync + From<FetchTimeout>,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.cache.lock();
        if inner.is_current(self.key, self.flight) {
            inner.inflight.remove(self.key);
        }
        debug!(key = %self.key, "fetch cancelled before completion");
    }
}
