use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::error::{KvError, KvResult};

/// Count-bounded map that evicts its least recently used entry.
///
/// Inserting into a full map returns the evicted pair so the caller can
/// report the overflow. Iteration runs from least to most recently used.
#[derive(Debug, Clone)]
pub struct BoundedLru<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedLru<K, V> {
    pub fn new(capacity: usize) -> KvResult<Self> {
        if capacity == 0 {
            return Err(KvError::Config("LRU capacity must be positive".into()));
        }
        Ok(Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            tick: 0,
        })
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Insert or replace `key`, marking it most recent.
    ///
    /// Returns the entry evicted to make room, if any. Replacing an existing
    /// key never evicts.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        if let Some((slot, old_tick)) = self.entries.get_mut(&key) {
            *slot = value;
            self.order.remove(&*old_tick);
            *old_tick = tick;
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_oldest()
        } else {
            None
        };
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
        evicted
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key).map(|(value, _)| (key, value))
    }

    /// Look up `key` and mark it most recent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let (value, old_tick) = self.entries.get_mut(key)?;
        if let Some(k) = self.order.remove(&*old_tick) {
            self.order.insert(tick, k);
        }
        *old_tick = tick;
        Some(value)
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (value, tick) = self.entries.remove(key)?;
        self.order.remove(&tick);
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|(value, _)| (key, value)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.order.values()
    }
}
