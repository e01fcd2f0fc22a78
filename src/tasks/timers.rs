//! Scheduled Expiry
//!
//! Per-item timers on top of a shared cache. Every `put` with a finite TTL arms
//! a tokio task that fires when the item is due and runs a cleanup pass, so the
//! cache stays at its minimum size without anyone calling `get`. Overwriting or
//! deleting the key aborts the pending timer.
//!
//! Suited to caches holding few items with TTLs; for large caches the periodic
//! [`spawn_cleanup_task`](crate::tasks::spawn_cleanup_task) is cheaper.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::cache::{
    build_cache_with, share, CacheStats, Clock, KeyStore, MemoryStore, SharedCache, SystemClock,
    Ttl,
};
use crate::config::CacheOptions;
use crate::error::Result;

#[derive(Debug)]
struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

type TimerTable<K> = Arc<Mutex<HashMap<K, Timer>>>;

fn lock<K>(timers: &TimerTable<K>) -> MutexGuard<'_, HashMap<K, Timer>> {
    // A panic while holding the table cannot leave it half-updated
    match timers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// == Scheduled Cache ==
pub struct ScheduledCache<K, V> {
    cache: SharedCache<K, V>,
    timers: TimerTable<K>,
    /// Mirrors the engine default so that `Ttl::Default` can be scheduled
    default_ttl: Option<Duration>,
    next_id: AtomicU64,
}

impl<K, V> ScheduledCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Wraps `cache`. `default_ttl` must match the engine's own default.
    pub fn new(cache: SharedCache<K, V>, default_ttl: Option<Duration>) -> Self {
        Self {
            cache,
            timers: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
            next_id: AtomicU64::new(0),
        }
    }

    /// Builds the engine selected by `options` and wraps it.
    pub fn from_options(options: &CacheOptions) -> Result<Self>
    where
        K: Debug,
        V: Clone,
    {
        Self::from_parts(options, MemoryStore::new(), Arc::new(SystemClock))
    }

    /// Like [`from_options`](Self::from_options) over the given store and clock.
    pub fn from_parts<S>(options: &CacheOptions, store: S, clock: Arc<dyn Clock>) -> Result<Self>
    where
        K: Debug,
        V: Clone,
        S: KeyStore<K, V> + Send + Sync + 'static,
    {
        let cache = build_cache_with(options, store, clock)?;
        Ok(Self::new(share(cache), options.default_ttl()))
    }

    /// The underlying shared cache.
    pub fn inner(&self) -> &SharedCache<K, V> {
        &self.cache
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.cache.write().await.get(key)
    }

    /// Stores the value and re-arms the key's timer.
    pub async fn put(&self, key: K, value: V, ttl: Ttl) -> Result<()> {
        let delay = match ttl {
            Ttl::After(ttl) => Some(ttl),
            Ttl::Never => None,
            Ttl::Default => self.default_ttl,
        };

        let mut cache = self.cache.write().await;
        cache.put(key.clone(), value, ttl)?;

        // Swap timers before releasing the cache, so that of two racing puts
        // of one key the timer of the put that landed last survives.
        self.cancel(&key);
        if let Some(delay) = delay {
            self.schedule(key, delay);
        }
        drop(cache);
        Ok(())
    }

    pub async fn delete(&self, key: &K) -> bool {
        self.cancel(key);
        self.cache.write().await.delete(key)
    }

    pub async fn clear(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
        self.cache.write().await.clear();
    }

    pub async fn size(&self) -> usize {
        self.cache.read().await.size()
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.read().await.stats()
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        lock(&self.timers).len()
    }

    fn cancel(&self, key: &K) {
        if let Some(timer) = lock(&self.timers).remove(key) {
            timer.handle.abort();
        }
    }

    fn schedule(&self, key: K, delay: Duration) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::clone(&self.cache);
        let timers = Arc::clone(&self.timers);
        let task_key = key.clone();

        // Hold the table while spawning so the timer cannot finish and
        // unregister itself before it is registered.
        let mut table = lock(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let removed = cache.write().await.clear_expired_items();
            trace!(removed, "item timer fired");

            let mut table = lock(&timers);
            if table.get(&task_key).is_some_and(|timer| timer.id == id) {
                table.remove(&task_key);
            }
        });
        table.insert(key, Timer { id, handle });
    }
}

impl<K, V> Drop for ScheduledCache<K, V> {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}
