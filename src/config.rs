//! Configuration Module
//!
//! Cache construction parameters, loaded from environment variables or JSON
//! and validated before any engine is built.

use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

// == Cache Type ==
/// Which engine to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Plain key store, lazy expiry on read, insertion-order overflow
    Map,
    /// Min-heap engine, arbitrary TTLs
    #[default]
    Heap,
    /// One FIFO bucket per configured TTL
    Queues,
}

impl FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "map" => Ok(CacheType::Map),
            "heap" => Ok(CacheType::Heap),
            "queues" => Ok(CacheType::Queues),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown cache type '{}'",
                other
            ))),
        }
    }
}

// == Timeout Mode ==
/// How expired items leave the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutMode {
    /// Expired items are removed when read, by `clear_expired_items`, or by
    /// the periodic cleanup task
    #[default]
    OnGetOnly,
    /// Additionally, every item with a TTL gets its own timer.
    /// Meant for caches holding few items.
    IndividualTimeout,
}

impl FromStr for TimeoutMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_get_only" => Ok(TimeoutMode::OnGetOnly),
            "individual_timeout" => Ok(TimeoutMode::IndividualTimeout),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown timeout mode '{}'",
                other
            ))),
        }
    }
}

// == Queue Config ==
/// One bucket of the sharded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// TTL in seconds of every item in the bucket, None = never expires
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    /// Maximum queue length, None = unbounded
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl QueueConfig {
    pub fn new(ttl_secs: Option<u64>, capacity: Option<usize>) -> Self {
        Self { ttl_secs, capacity }
    }

    /// The sentinel bucket for items that never expire.
    pub fn never(capacity: Option<usize>) -> Self {
        Self::new(None, capacity)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Checks a bucket list: non-empty, positive values, pairwise-unique TTLs.
pub fn validate_queue_configs(queues: &[QueueConfig]) -> Result<()> {
    if queues.is_empty() {
        return Err(CacheError::InvalidConfig(
            "no queue config is supplied".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for queue in queues {
        if queue.ttl_secs == Some(0) {
            return Err(CacheError::InvalidConfig(
                "queue ttl must be a positive integer".to_string(),
            ));
        }
        if queue.capacity == Some(0) {
            return Err(CacheError::InvalidConfig(
                "queue capacity must be a positive integer".to_string(),
            ));
        }
        if !seen.insert(queue.ttl_secs) {
            return Err(CacheError::InvalidConfig(
                "require unique ttl for each queue".to_string(),
            ));
        }
    }
    Ok(())
}

/// Checks that a default TTL, when set, is positive and names a configured
/// bucket. Without it every `Ttl::Default` put would be rejected.
pub fn validate_queue_default_ttl(queues: &[QueueConfig], default_ttl: Option<Duration>) -> Result<()> {
    let Some(ttl) = default_ttl else {
        return Ok(());
    };
    if ttl.is_zero() {
        return Err(CacheError::InvalidConfig(
            "default ttl must be positive when set".to_string(),
        ));
    }
    if !queues.iter().any(|queue| queue.ttl() == Some(ttl)) {
        return Err(CacheError::InvalidConfig(format!(
            "no queue configured for the default ttl of {}s",
            ttl.as_secs()
        )));
    }
    Ok(())
}

/// Parses `ttl:capacity` pairs separated by commas.
///
/// `never` names the bucket for non-expiring items and an omitted capacity
/// means unbounded, e.g. `60:1000,3600:500,never`.
pub fn parse_queue_buckets(spec: &str) -> Result<Vec<QueueConfig>> {
    let invalid = |part: &str| CacheError::InvalidConfig(format!("invalid queue bucket '{}'", part));

    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| -> Result<QueueConfig> {
            let (ttl, capacity) = match part.split_once(':') {
                Some((ttl, capacity)) => (ttl.trim(), Some(capacity.trim())),
                None => (part, None),
            };
            let ttl_secs = if ttl.eq_ignore_ascii_case("never") {
                None
            } else {
                Some(ttl.parse::<u64>().map_err(|_| invalid(part))?)
            };
            let capacity = match capacity {
                Some(c) if !c.is_empty() => Some(c.parse::<usize>().map_err(|_| invalid(part))?),
                _ => None,
            };
            Ok(QueueConfig::new(ttl_secs, capacity))
        })
        .collect()
}

// == Cache Options ==
/// Cache construction parameters.
///
/// All values can be configured via environment variables or JSON with
/// sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of items the cache can hold
    pub max_size: usize,
    /// Default TTL in seconds for `Ttl::Default`, None = never expire
    pub default_ttl_secs: Option<u64>,
    /// Engine selection
    pub cache_type: CacheType,
    /// Buckets of the sharded engine
    pub queues: Vec<QueueConfig>,
    /// Background cleanup task interval in seconds
    pub cleanup_interval_secs: u64,
    /// Whether items get individual expiry timers
    pub timeout_mode: TimeoutMode,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: None,
            cache_type: CacheType::Heap,
            queues: Vec::new(),
            cleanup_interval_secs: 1,
            timeout_mode: TimeoutMode::OnGetOnly,
        }
    }
}

impl CacheOptions {
    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE` - Maximum cache items (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: never expire)
    /// - `CACHE_TYPE` - `map`, `heap` or `queues` (default: heap)
    /// - `QUEUE_BUCKETS` - Buckets for `queues`, see [`parse_queue_buckets`]
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `TIMEOUT_MODE` - `on_get_only` or `individual_timeout` (default: on_get_only)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let options = Self {
            max_size: env::var("MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_size),
            default_ttl_secs: env::var("DEFAULT_TTL").ok().and_then(|v| v.parse().ok()),
            cache_type: match env::var("CACHE_TYPE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.cache_type,
            },
            queues: match env::var("QUEUE_BUCKETS") {
                Ok(v) => parse_queue_buckets(&v)?,
                Err(_) => defaults.queues,
            },
            cleanup_interval_secs: env::var("CLEANUP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cleanup_interval_secs),
            timeout_mode: match env::var("TIMEOUT_MODE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.timeout_mode,
            },
        };
        options.validate()?;
        Ok(options)
    }

    /// Parses and validates options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|err| CacheError::InvalidConfig(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    // == Validate ==
    /// Rejects malformed options with [`CacheError::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max size must be a positive integer".to_string(),
            ));
        }
        if self.default_ttl_secs == Some(0) {
            return Err(CacheError::InvalidConfig(
                "default ttl must be a positive integer when set".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup interval must be a positive integer".to_string(),
            ));
        }
        if self.cache_type == CacheType::Queues {
            validate_queue_configs(&self.queues)?;
            validate_queue_default_ttl(&self.queues, self.default_ttl())?;
        }
        Ok(())
    }
}
