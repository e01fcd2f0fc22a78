//! Sharded Queue Cache Module
//!
//! Alternate engine for workloads that only ever use a handful of fixed TTLs.
//! Each configured TTL gets its own FIFO bucket with its own capacity. Inside a
//! bucket every entry has the same TTL, so insertion order is expiry order and
//! the front is always the next to expire: no heap, O(1) per operation.
//!
//! Queue entries are never removed eagerly. Overwrites and deletes only touch
//! the key store, and the stale queue entries left behind are recognised and
//! skipped when they reach the front.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{
    CacheStats, CachedItem, Clock, ExpiringCache, ExpiryIndex, Fifo, Handle, KeyStore,
    MemoryStore, SystemClock, Ttl,
};
use crate::config::{validate_queue_configs, validate_queue_default_ttl, QueueConfig};
use crate::error::{CacheError, Result};

// == Bucket ==
#[derive(Debug)]
struct Bucket<K> {
    /// TTL of every entry in this bucket, None = never expires
    ttl: Option<Duration>,
    queue: Fifo<ExpiryIndex<K>>,
}

// == Sharded Queue Cache ==
#[derive(Debug)]
pub struct ShardedQueueCache<K, V, S = MemoryStore<K, V>> {
    store: S,
    buckets: Vec<Bucket<K>>,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
    last_handle: u64,
    _value: std::marker::PhantomData<fn() -> V>,
}

impl<K, V> ShardedQueueCache<K, V, MemoryStore<K, V>>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    // == Constructor ==
    /// Creates a cache with one bucket per queue config, over a [`MemoryStore`].
    pub fn new(queues: &[QueueConfig], default_ttl: Option<Duration>) -> Result<Self> {
        Self::with_parts(queues, default_ttl, MemoryStore::new(), Arc::new(SystemClock))
    }

    pub fn with_clock(
        queues: &[QueueConfig],
        default_ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_parts(queues, default_ttl, MemoryStore::new(), clock)
    }
}

impl<K, V, S> ShardedQueueCache<K, V, S>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    S: KeyStore<K, V>,
{
    /// Creates a cache over any conforming key store.
    ///
    /// Fails with [`CacheError::InvalidConfig`] on an empty bucket list, a
    /// duplicate TTL, a zero TTL or capacity, or a default TTL that names no
    /// bucket.
    pub fn with_parts(
        queues: &[QueueConfig],
        default_ttl: Option<Duration>,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_queue_configs(queues)?;
        validate_queue_default_ttl(queues, default_ttl)?;

        let buckets = queues
            .iter()
            .map(|config| Bucket {
                ttl: config.ttl(),
                queue: match config.capacity {
                    Some(capacity) => Fifo::bounded(capacity),
                    None => Fifo::new(),
                },
            })
            .collect();

        Ok(Self {
            store,
            buckets,
            default_ttl,
            clock,
            stats: CacheStats::new(),
            last_handle: 0,
            _value: std::marker::PhantomData,
        })
    }

    /// Queue length per bucket, in configuration order, stale entries included.
    pub fn bucket_lens(&self) -> Vec<(Option<Duration>, usize)> {
        self.buckets
            .iter()
            .map(|bucket| (bucket.ttl, bucket.queue.len()))
            .collect()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn bucket_for(&self, ttl: Option<Duration>) -> Result<usize> {
        self.buckets
            .iter()
            .position(|bucket| bucket.ttl == ttl)
            .ok_or_else(|| match ttl {
                Some(ttl) => CacheError::InvalidTtl(format!(
                    "no queue configured for a ttl of {}s",
                    ttl.as_secs()
                )),
                None => CacheError::InvalidTtl(
                    "no queue configured for items that never expire".to_string(),
                ),
            })
    }

    fn is_live(&self, index: &ExpiryIndex<K>) -> bool {
        self.store
            .get(index.key())
            .is_some_and(|item| item.version == index.handle().0)
    }

    /// Pops expired fronts until one really expired item has been removed.
    fn remove_one_expired(&mut self, now: u64) -> Option<K> {
        for bucket in self.buckets.iter_mut() {
            while bucket.queue.peek().is_some_and(|front| front.has_expired(now)) {
                let Some(index) = bucket.queue.pop() else {
                    break;
                };
                if self
                    .store
                    .get(index.key())
                    .is_some_and(|item| item.is_expired(now))
                {
                    self.store.delete(index.key());
                    self.stats.record_expirations(1);
                    return Some(index.into_key());
                }
            }
        }
        None
    }
}

impl<K, V, S> ExpiringCache<K, V> for ShardedQueueCache<K, V, S>
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
    /// Pushes a new index to the bucket matching `ttl`.
    ///
    /// A full bucket drops its own front first; other buckets are untouched.
    fn put(&mut self, key: K, value: V, ttl: Ttl) -> Result<()> {
        let ttl = ttl.resolve(self.default_ttl)?;
        let bucket = self.bucket_for(ttl)?;

        let now = self.clock.now_ms();
        self.last_handle += 1;
        let handle = Handle(self.last_handle);
        let index = ExpiryIndex::from_ttl(key.clone(), handle, ttl, now);

        self.store.set(
            key,
            CachedItem {
                value,
                inserted_at: now,
                expires_at: index.expiry().as_millis(),
                version: handle.0,
            },
        );

        if let Some(front) = self.buckets[bucket].queue.push(index) {
            if self.is_live(&front) {
                self.store.delete(front.key());
                self.stats.record_eviction();
                debug!(key = ?front.key(), bucket, "bucket full, evicted front");
            } else {
                trace!(key = ?front.key(), bucket, "bucket full, dropped stale front");
            }
        }

        // Overwrites and deletes leave stale entries behind; without a capacity
        // nothing else would ever drop them.
        if self.buckets[bucket].queue.len() > 2 * self.store.size() {
            let store = &self.store;
            let queue = &mut self.buckets[bucket].queue;
            let before = queue.len();
            queue.retain(|index| {
                store
                    .get(index.key())
                    .is_some_and(|item| item.version == index.handle().0)
            });
            debug!(bucket, before, after = queue.len(), "compacted bucket");
        }
        Ok(())
    }

    // == Delete ==
    /// Removes the stored item only; its queue entry goes stale.
    fn delete(&mut self, key: &K) -> bool {
        self.store.delete(key)
    }

    fn clear(&mut self) {
        self.store.clear();
        for bucket in self.buckets.iter_mut() {
            bucket.queue.clear();
        }
    }

    fn size(&self) -> usize {
        self.store.size()
    }

    // == Clear Expired Items ==
    /// O(number of expired entries), no logarithmic factor.
    ///
    /// A popped key is deleted only when the stored item is itself expired, so
    /// a key re-put under another TTL survives its old bucket's entry.
    fn clear_expired_items(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;

        for bucket in self.buckets.iter_mut() {
            while bucket.queue.peek().is_some_and(|front| front.has_expired(now)) {
                let Some(index) = bucket.queue.pop() else {
                    break;
                };
                if self
                    .store
                    .get(index.key())
                    .is_some_and(|item| item.is_expired(now))
                {
                    self.store.delete(index.key());
                    removed += 1;
                }
            }
        }

        self.stats.record_expirations(removed);
        if removed > 0 {
            debug!(removed, "cleared expired items");
        }
        removed
    }

    // == Evict One ==
    /// Reclaims an expired item first; otherwise evicts the oldest live item
    /// across all buckets.
    fn evict_one(&mut self) -> Option<K> {
        let now = self.clock.now_ms();
        if let Some(key) = self.remove_one_expired(now) {
            return Some(key);
        }

        loop {
            let oldest = self
                .buckets
                .iter()
                .enumerate()
                .filter_map(|(i, bucket)| bucket.queue.peek().map(|front| (front.handle(), i)))
                .min()?;
            let index = self.buckets[oldest.1].queue.pop()?;
            if self.is_live(&index) {
                self.store.delete(index.key());
                self.stats.record_eviction();
                return Some(index.into_key());
            }
        }
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.store.size());
        stats
    }
}
