//! Expiry Cache - An in-process key-value cache
//!
//! Provides per-item TTL expiry and capacity-bounded eviction for embedding in
//! a host process: no network, no persistence.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{build_cache, share, ExpiringCache, SharedCache, Ttl};
pub use config::CacheOptions;
pub use error::{CacheError, Result};
pub use tasks::{spawn_cleanup_task, ScheduledCache};
