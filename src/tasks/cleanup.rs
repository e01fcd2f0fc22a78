//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache items.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedCache;

/// Spawns a background task that periodically clears expired cache items.
///
/// The task runs in an infinite loop, sleeping for `interval` between runs and
/// taking the write lock only for the duration of one `clear_expired_items`.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = share(build_cache::<String, String>(&options)?);
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<K, V>(cache: SharedCache<K, V>, interval: Duration) -> JoinHandle<()>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(?interval, "Starting TTL cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.clear_expired_items()
            };

            if removed > 0 {
                info!("TTL cleanup: removed {} expired items", removed);
            } else {
                debug!("TTL cleanup: no expired items found");
            }
        }
    })
}
