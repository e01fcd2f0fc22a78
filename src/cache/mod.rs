//! Cache Module
//!
//! Provides in-process key-value caching with TTL expiry and capacity-bounded
//! eviction. Three engines implement the same [`ExpiringCache`] capability:
//!
//! - [`MapCache`]: the key store alone, lazy expiry, insertion-order overflow
//! - [`HeapCache`]: arbitrary TTLs, O(log n) expiry tracking with a min-heap
//! - [`ShardedQueueCache`]: a small closed set of TTLs, O(1) per operation

mod clock;
mod entry;
mod heap_cache;
mod index;
mod map_cache;
mod min_heap;
mod queue;
mod sharded;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::{CacheOptions, CacheType};
use crate::error::{CacheError, Result};

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CachedItem;
pub use heap_cache::HeapCache;
pub use index::{Expiry, ExpiryIndex, Handle};
pub use map_cache::MapCache;
pub use min_heap::StableHandleMinHeap;
pub use queue::Fifo;
pub use sharded::ShardedQueueCache;
pub use stats::CacheStats;
pub use store::{KeyStore, MemoryStore};

// == TTL Argument ==
/// TTL requested for one `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the engine's default TTL (which may itself be "never")
    #[default]
    Default,
    /// Never expire, regardless of the default
    Never,
    /// Expire after this duration
    After(Duration),
}

impl Ttl {
    pub fn secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }

    /// Resolves the final TTL against the engine default. None = never.
    ///
    /// A zero duration is rejected.
    pub fn resolve(self, default_ttl: Option<Duration>) -> Result<Option<Duration>> {
        match self {
            Ttl::After(ttl) if ttl.is_zero() => Err(CacheError::InvalidArgument(
                "ttl must be a positive duration".to_string(),
            )),
            Ttl::After(ttl) => Ok(Some(ttl)),
            Ttl::Never => Ok(None),
            Ttl::Default => Ok(default_ttl),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

// == Expiring Cache Capability ==
/// Operations shared by every engine.
///
/// Engines are single-threaded: every call runs to completion and takes
/// `&mut self`. Hosts sharing one cache between tasks wrap it, see
/// [`SharedCache`].
pub trait ExpiringCache<K, V> {
    /// Returns a clone of the live value, or None on a miss.
    ///
    /// An expired item is deleted and reported as a miss.
    fn get(&mut self, key: &K) -> Option<V>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&mut self, key: K, value: V, ttl: Ttl) -> Result<()>;

    /// Removes the key, returning true if it was stored.
    fn delete(&mut self, key: &K) -> bool;

    fn clear(&mut self);

    /// Number of stored items (expired items not yet removed included).
    fn size(&self) -> usize;

    /// Removes every expired item, returning how many were removed.
    fn clear_expired_items(&mut self) -> usize;

    /// Removes one item to make room. The heap and queue engines prefer an
    /// expired item; the map engine takes the oldest inserted one.
    fn evict_one(&mut self) -> Option<K>;

    fn stats(&self) -> CacheStats;
}

/// A boxed engine chosen at construction time.
pub type DynCache<K, V> = Box<dyn ExpiringCache<K, V> + Send + Sync>;

/// An engine shared between tasks behind an async read-write lock.
pub type SharedCache<K, V> = Arc<RwLock<DynCache<K, V>>>;

/// Wraps an engine for sharing between tasks.
pub fn share<K, V>(cache: DynCache<K, V>) -> SharedCache<K, V> {
    Arc::new(RwLock::new(cache))
}

// == Factory ==
/// Builds the engine selected by `options` over a [`MemoryStore`] and the
/// system clock.
pub fn build_cache<K, V>(options: &CacheOptions) -> Result<DynCache<K, V>>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    build_cache_with(options, MemoryStore::new(), Arc::new(SystemClock))
}

/// Builds the engine selected by `options` over the given store and clock.
pub fn build_cache_with<K, V, S>(
    options: &CacheOptions,
    store: S,
    clock: Arc<dyn Clock>,
) -> Result<DynCache<K, V>>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: KeyStore<K, V> + Send + Sync + 'static,
{
    options.validate()?;

    let cache: DynCache<K, V> = match options.cache_type {
        CacheType::Map => Box::new(MapCache::with_parts(
            options.max_size,
            options.default_ttl(),
            store,
            clock,
        )?),
        CacheType::Heap => Box::new(HeapCache::with_parts(
            options.max_size,
            options.default_ttl(),
            store,
            clock,
        )?),
        CacheType::Queues => Box::new(ShardedQueueCache::with_parts(
            &options.queues,
            options.default_ttl(),
            store,
            clock,
        )?),
    };
    Ok(cache)
}
