//! Expiry Cache soak runner
//!
//! Builds the cache selected by the environment, starts the background cleanup
//! task and drives a synthetic put/get/delete workload against it, logging
//! statistics as it goes.
//!
//! # Environment Variables
//! See [`CacheOptions::from_env`], plus:
//! - `WORKLOAD_OPS` - Number of operations to run (default: 100000)
//! - `WORKLOAD_SEED` - Seed of the key/TTL generator (default: 42)

use std::env;
use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expiry_cache::cache::{CacheStats, DynCache};
use expiry_cache::config::{CacheType, TimeoutMode};
use expiry_cache::{
    build_cache, share, spawn_cleanup_task, CacheOptions, ScheduledCache, SharedCache, Ttl,
};

/// Operations between two progress log lines.
const REPORT_EVERY: u64 = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expiry_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = CacheOptions::from_env().context("invalid cache configuration")?;
    info!(
        "Configuration loaded: cache_type={:?}, timeout_mode={:?}, max_size={}, default_ttl={:?}, queues={}, cleanup_interval={}s",
        options.cache_type,
        options.timeout_mode,
        options.max_size,
        options.default_ttl_secs,
        options.queues.len(),
        options.cleanup_interval_secs
    );

    let ops: u64 = env::var("WORKLOAD_OPS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100_000);
    let seed: u64 = env::var("WORKLOAD_SEED")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(42);

    let engine: DynCache<String, String> = build_cache(&options)?;
    let cache = share(engine);
    let cleanup_handle = spawn_cleanup_task(cache.clone(), options.cleanup_interval());
    let target = match options.timeout_mode {
        TimeoutMode::OnGetOnly => Target::Shared(cache.clone()),
        TimeoutMode::IndividualTimeout => {
            Target::Scheduled(ScheduledCache::new(cache.clone(), options.default_ttl()))
        }
    };

    tokio::select! {
        result = run_workload(&target, &options, ops, seed) => result?,
        _ = signal::ctrl_c() => warn!("Received Ctrl+C, stopping workload"),
    }

    cleanup_handle.abort();
    drop(target);

    let stats = cache.read().await.stats();
    info!(
        "Final stats: {}",
        serde_json::to_string(&stats).context("serializing stats")?
    );
    Ok(())
}

/// Where the workload sends its operations.
enum Target {
    Shared(SharedCache<String, String>),
    /// Same cache, with a timer per item
    Scheduled(ScheduledCache<String, String>),
}

impl Target {
    async fn put(&self, key: String, value: String, ttl: Ttl) -> expiry_cache::Result<()> {
        match self {
            Target::Shared(cache) => cache.write().await.put(key, value, ttl),
            Target::Scheduled(cache) => cache.put(key, value, ttl).await,
        }
    }

    async fn get(&self, key: &String) -> Option<String> {
        match self {
            Target::Shared(cache) => cache.write().await.get(key),
            Target::Scheduled(cache) => cache.get(key).await,
        }
    }

    async fn delete(&self, key: &String) -> bool {
        match self {
            Target::Shared(cache) => cache.write().await.delete(key),
            Target::Scheduled(cache) => cache.delete(key).await,
        }
    }

    async fn stats(&self) -> CacheStats {
        match self {
            Target::Shared(cache) => cache.read().await.stats(),
            Target::Scheduled(cache) => cache.stats().await,
        }
    }
}

/// Runs `ops` mixed operations: 50% put, 40% get, 10% delete.
async fn run_workload(
    target: &Target,
    options: &CacheOptions,
    ops: u64,
    seed: u64,
) -> anyhow::Result<()> {
    let ttls = workload_ttls(options);
    let key_space = (options.max_size as u64).saturating_mul(2).max(1);
    let mut rng = StdRng::seed_from_u64(seed);

    for op in 1..=ops {
        let key = format!("key-{}", rng.gen_range(0..key_space));
        match rng.gen_range(0..10) {
            0..=4 => {
                let ttl = ttls[rng.gen_range(0..ttls.len())];
                target.put(key, format!("value-{op}"), ttl).await?;
            }
            5..=8 => {
                target.get(&key).await;
            }
            _ => {
                target.delete(&key).await;
            }
        }

        if op % REPORT_EVERY == 0 {
            let stats = target.stats().await;
            info!(
                "{} ops: entries={}, hit_rate={:.3}, evictions={}, expirations={}",
                op,
                stats.total_entries,
                stats.hit_rate(),
                stats.evictions,
                stats.expirations
            );
            // Let the cleanup task in between batches
            tokio::task::yield_now().await;
        }
    }
    Ok(())
}

/// TTLs the workload may request from the configured engine.
fn workload_ttls(options: &CacheOptions) -> Vec<Ttl> {
    match options.cache_type {
        CacheType::Map | CacheType::Heap => vec![
            Ttl::Default,
            Ttl::Never,
            Ttl::After(Duration::from_millis(500)),
            Ttl::secs(2),
            Ttl::secs(30),
        ],
        CacheType::Queues => options
            .queues
            .iter()
            .map(|queue| queue.ttl().map_or(Ttl::Never, Ttl::After))
            .collect(),
    }
}
