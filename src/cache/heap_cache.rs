//! Heap Cache Module
//!
//! Primary engine. Finite-TTL items are ordered in a [`StableHandleMinHeap`],
//! never-expiring items in an insertion-ordered [`Fifo`], and every live key
//! maps to its current [`ExpiryIndex`] so that overwrite and delete can drop
//! the old ordering entry without searching for it.
//!
//! Key store removal is immediate; the ordering structures only lose entries
//! through `delete`, `clear_expired_items`, `evict_one` or `rebuild_index`.
//! Any entry whose handle no longer matches the stored item's version is
//! stale and is discarded when it surfaces.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::cache::{
    CacheStats, CachedItem, Clock, ExpiringCache, Expiry, ExpiryIndex, Fifo, Handle, KeyStore,
    MemoryStore, StableHandleMinHeap, SystemClock, Ttl,
};
use crate::error::{CacheError, Result};

// == Heap Cache ==
#[derive(Debug)]
pub struct HeapCache<K, V, S = MemoryStore<K, V>> {
    store: S,
    /// Live key -> its current index
    lookup: HashMap<K, ExpiryIndex<K>>,
    /// Finite-TTL indices, soonest expiry first
    heap: StableHandleMinHeap<K>,
    /// Never-expiring indices, oldest first
    never_expiring: Fifo<ExpiryIndex<K>>,
    /// Finite-TTL indices in insertion order, stale entries dropped lazily
    finite_order: Fifo<ExpiryIndex<K>>,
    max_size: usize,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
    last_handle: u64,
    _value: std::marker::PhantomData<fn() -> V>,
}

impl<K, V> HeapCache<K, V, MemoryStore<K, V>>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    // == Constructor ==
    /// Creates a cache over a [`MemoryStore`] using the system clock.
    ///
    /// # Arguments
    /// * `max_size` - Maximum number of items, must be positive
    /// * `default_ttl` - TTL applied by `Ttl::Default`, None = never expire
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Result<Self> {
        Self::with_parts(max_size, default_ttl, MemoryStore::new(), Arc::new(SystemClock))
    }

    /// Creates a cache over a [`MemoryStore`] reading time from `clock`.
    pub fn with_clock(
        max_size: usize,
        default_ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_parts(max_size, default_ttl, MemoryStore::new(), clock)
    }
}

impl<K, V, S> HeapCache<K, V, S>
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
            lookup: HashMap::new(),
            heap: StableHandleMinHeap::new(max_size),
            never_expiring: Fifo::new(),
            finite_order: Fifo::new(),
            max_size,
            default_ttl,
            clock,
            stats: CacheStats::new(),
            last_handle: 0,
            _value: std::marker::PhantomData,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Number of entries held by the heap and the never-expiring queue, stale
    /// ones included. The insertion-order record of finite items is not counted.
    pub fn index_len(&self) -> usize {
        self.heap.len() + self.never_expiring.len()
    }

    /// Read-only view of the key store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the key store, bypassing the ordering structures.
    ///
    /// Entries changed here leave stale indices behind; they are discarded
    /// when they surface.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // == Rebuild Index ==
    /// Rebuilds the ordering structures from the indices that still match a
    /// live stored item. O(n log n).
    pub fn rebuild_index(&mut self) {
        let before = self.index_len();
        let finite = self.heap.drain();
        let never: Vec<ExpiryIndex<K>> = self.never_expiring.drain().collect();
        let order: Vec<ExpiryIndex<K>> = self.finite_order.drain().collect();

        let mut heap = StableHandleMinHeap::new(self.max_size);
        let mut never_expiring = Fifo::new();
        let mut finite_order = Fifo::new();

        for index in finite {
            if self.is_live(&index) {
                if let Err(err) = heap.insert(index) {
                    warn!(%err, "dropping index during rebuild");
                }
            }
        }
        for index in never {
            if self.is_live(&index) {
                never_expiring.push(index);
            }
        }
        for index in order {
            if self.is_live(&index) {
                finite_order.push(index);
            }
        }

        let store = &self.store;
        self.lookup.retain(|key, index| {
            store
                .get(key)
                .is_some_and(|item| item.version == index.handle().0)
        });

        self.heap = heap;
        self.never_expiring = never_expiring;
        self.finite_order = finite_order;
        debug!(before, after = self.index_len(), "rebuilt expiry index");
    }

    // == Internal Helpers ==
    fn next_handle(&mut self) -> Handle {
        self.last_handle += 1;
        Handle(self.last_handle)
    }

    /// True if `index` still describes the item stored under its key.
    fn is_live(&self, index: &ExpiryIndex<K>) -> bool {
        self.store
            .get(index.key())
            .is_some_and(|item| item.version == index.handle().0)
    }

    fn index_too_big(&self) -> bool {
        let longest = self
            .heap
            .len()
            .max(self.never_expiring.len())
            .max(self.finite_order.len());
        longest > 2 * self.store.size()
    }

    /// Drops the key's live index from the lookup and the ordering structures.
    fn forget(&mut self, key: &K) {
        if let Some(index) = self.lookup.remove(key) {
            match index.expiry() {
                Expiry::At(_) => {
                    self.heap.delete_by_handle(index.handle());
                }
                Expiry::Never => {
                    let handle = index.handle();
                    self.never_expiring
                        .remove_first(|queued| queued.handle() == handle);
                }
            }
        }
    }

    /// Removes a popped index's item if it is still live.
    fn remove_if_live(&mut self, index: &ExpiryIndex<K>) -> bool {
        if !self.is_live(index) {
            trace!(key = ?index.key(), "discarding stale index");
            return false;
        }
        self.store.delete(index.key());
        self.lookup.remove(index.key());
        true
    }

    /// Pops expired heap entries until one live item has been removed.
    fn remove_one_expired(&mut self, now: u64) -> Option<K> {
        loop {
            match self.heap.peek_min() {
                Some(min) if min.has_expired(now) => {}
                _ => return None,
            }
            let index = self.heap.pop_min()?;
            if self.remove_if_live(&index) {
                self.stats.record_expirations(1);
                return Some(index.into_key());
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.heap.assert_invariants();
        for (key, index) in &self.lookup {
            assert_eq!(index.key(), key);
            let item = self.store.get(key).expect("lookup entry without stored item");
            assert_eq!(item.version, index.handle().0, "lookup index is stale");
            match index.expiry() {
                Expiry::At(_) => assert!(self.heap.contains(index.handle())),
                Expiry::Never => assert!(self
                    .never_expiring
                    .iter()
                    .any(|queued| queued.handle() == index.handle())),
            }
        }
        assert!(self.lookup.len() <= self.store.size());
        assert!(self.store.size() <= self.max_size);
    }
}

impl<K, V, S> ExpiringCache<K, V> for HeapCache<K, V, S>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    S: KeyStore<K, V>,
{
    // == Get ==
    fn get(&mut self, key: &K) -> Option<V> {
        let Some((handle, expiry)) = self.lookup.get(key).map(|i| (i.handle(), i.expiry())) else {
            self.stats.record_miss();
            return None;
        };

        if expiry.has_expired(self.clock.now_ms()) {
            self.delete(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        match self.store.get(key) {
            Some(item) if item.version == handle.0 => {
                let value = item.value.clone();
                self.stats.record_hit();
                Some(value)
            }
            _ => {
                // The store lost or replaced the item without going through us
                self.forget(key);
                self.stats.record_miss();
                None
            }
        }
    }

    // == Put ==
    fn put(&mut self, key: K, value: V, ttl: Ttl) -> Result<()> {
        let ttl = ttl.resolve(self.default_ttl)?;

        // At most one live index per key
        self.delete(&key);

        if self.store.size() >= self.max_size {
            self.evict_one();
        }

        let now = self.clock.now_ms();
        let handle = self.next_handle();
        let index = ExpiryIndex::from_ttl(key.clone(), handle, ttl, now);

        if index.expiry() != Expiry::Never && self.heap.len() >= self.heap.capacity() {
            // Only stale entries can fill the heap while the store has room
            self.rebuild_index();
        }

        self.store.set(
            key.clone(),
            CachedItem {
                value,
                inserted_at: now,
                expires_at: index.expiry().as_millis(),
                version: handle.0,
            },
        );

        match index.expiry() {
            Expiry::At(_) => {
                self.heap.insert(index.clone())?;
                self.finite_order.push(index.clone());
            }
            Expiry::Never => {
                self.never_expiring.push(index.clone());
            }
        }
        self.lookup.insert(key, index);

        if self.index_too_big() {
            self.rebuild_index();
        }
        Ok(())
    }

    // == Delete ==
    fn delete(&mut self, key: &K) -> bool {
        let existed = self.store.delete(key);
        self.forget(key);
        existed
    }

    // == Clear ==
    fn clear(&mut self) {
        self.store.clear();
        self.lookup.clear();
        self.heap.clear();
        self.never_expiring.clear();
        self.finite_order.clear();
    }

    fn size(&self) -> usize {
        self.store.size()
    }

    // == Clear Expired Items ==
    /// O(k log n) for k expired entries.
    fn clear_expired_items(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        while self.remove_one_expired(now).is_some() {
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "cleared expired items");
        }
        removed
    }

    // == Evict One ==
    /// Reclaims an expired item first; otherwise evicts the oldest
    /// never-expiring item, and only then the oldest finite item.
    fn evict_one(&mut self) -> Option<K> {
        let now = self.clock.now_ms();
        if let Some(key) = self.remove_one_expired(now) {
            debug!(?key, "evicted expired item");
            return Some(key);
        }

        while let Some(index) = self.never_expiring.pop() {
            if self.remove_if_live(&index) {
                self.stats.record_eviction();
                debug!(key = ?index.key(), "evicted oldest never-expiring item");
                return Some(index.into_key());
            }
        }

        while let Some(index) = self.finite_order.pop() {
            if self.remove_if_live(&index) {
                self.heap.delete_by_handle(index.handle());
                self.stats.record_eviction();
                debug!(key = ?index.key(), "evicted oldest finite item");
                return Some(index.into_key());
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
