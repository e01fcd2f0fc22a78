//! Map Cache Module
//!
//! The simplest engine: the key store plus an insertion-order record, with no
//! expiry index. Expired items are noticed when read or by a full sweep, so it
//! suits caches where few items carry a TTL.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{
    CacheStats, CachedItem, Clock, ExpiringCache, Fifo, KeyStore, MemoryStore, SystemClock, Ttl,
};
use crate::error::{CacheError, Result};

// == Map Cache ==
#[derive(Debug)]
pub struct MapCache<K, V, S = MemoryStore<K, V>> {
    store: S,
    /// (key, version) per put, oldest first. Entries whose version no longer
    /// matches the store are stale and skipped.
    insert_order: Fifo<(K, u64)>,
    max_size: usize,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
    last_version: u64,
    _value: std::marker::PhantomData<fn() -> V>,
}

impl<K, V> MapCache<K, V, MemoryStore<K, V>>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    // == Constructor ==
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Result<Self> {
        Self::with_parts(max_size, default_ttl, MemoryStore::new(), Arc::new(SystemClock))
    }

    pub fn with_clock(
        max_size: usize,
        default_ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_parts(max_size, default_ttl, MemoryStore::new(), clock)
    }
}

impl<K, V, S> MapCache<K, V, S>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    S: KeyStore<K, V>,
{
    /// Creates a cache over any conforming key store.
    pub fn with_parts(
        max_size: usize,
        default_ttl: Option<Duration>,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max size must be a positive integer".to_string(),
            ));
        }
        if default_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(CacheError::InvalidConfig(
                "default ttl must be positive when set".to_string(),
            ));
        }

        Ok(Self {
            store,
            insert_order: Fifo::new(),
            max_size,
            default_ttl,
            clock,
            stats: CacheStats::new(),
            last_version: 0,
            _value: std::marker::PhantomData,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Length of the insertion-order record, stale entries included.
    pub fn order_len(&self) -> usize {
        self.insert_order.len()
    }

    fn compact_order(&mut self) {
        let store = &self.store;
        self.insert_order.retain(|(key, version)| {
            store
                .get(key)
                .is_some_and(|item| item.version == *version)
        });
        trace!(len = self.insert_order.len(), "compacted insertion order");
    }
}

impl<K, V, S> ExpiringCache<K, V> for MapCache<K, V, S>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    S: KeyStore<K, V>,
{
    // == Get ==
    fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();
        match self.store.get(key) {
            Some(item) if item.is_expired(now) => {
                self.store.delete(key);
                self.stats.record_expirations(1);
                self.stats.record_miss();
                None
            }
            Some(item) => {
                let value = item.value.clone();
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Put ==
    /// Stores the item; a new key at capacity first evicts the oldest item.
    ///
    /// An overwrite moves the key to the back of the insertion order.
    fn put(&mut self, key: K, value: V, ttl: Ttl) -> Result<()> {
        let ttl = ttl.resolve(self.default_ttl)?;

        if !self.store.has(&key) && self.store.size() >= self.max_size {
            self.evict_one();
        }

        let now = self.clock.now_ms();
        self.last_version += 1;
        let version = self.last_version;
        let ttl_ms = ttl.map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));

        self.store
            .set(key.clone(), CachedItem::new(value, now, ttl_ms, version));
        self.insert_order.push((key, version));

        if self.insert_order.len() > 2 * self.store.size() {
            self.compact_order();
        }
        Ok(())
    }

    fn delete(&mut self, key: &K) -> bool {
        self.store.delete(key)
    }

    fn clear(&mut self) {
        self.store.clear();
        self.insert_order.clear();
    }

    fn size(&self) -> usize {
        self.store.size()
    }

    // == Clear Expired Items ==
    /// Full scan of the store. O(n).
    fn clear_expired_items(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<K> = self
            .store
            .entries()
            .filter(|(_, item)| item.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.store.delete(key);
        }

        self.stats.record_expirations(expired.len());
        if !expired.is_empty() {
            debug!(removed = expired.len(), "cleared expired items");
        }
        expired.len()
    }

    // == Evict One ==
    /// Evicts the oldest inserted live item, expired or not.
    fn evict_one(&mut self) -> Option<K> {
        while let Some((key, version)) = self.insert_order.pop() {
            let live = self
                .store
                .get(&key)
                .is_some_and(|item| item.version == version);
            if live {
                self.store.delete(&key);
                self.stats.record_eviction();
                debug!(?key, "evicted oldest item");
                return Some(key);
            }
        }
        None
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.store.size());
        stats
    }
}
