//! Expiry Index Module
//!
//! The ordering entries kept in the heap and the queues. An index names a key
//! and the instant it expires; the cached value itself lives in the key store.

use std::cmp::Ordering;
use std::time::Duration;

// == Expiry ==
/// When an item expires.
///
/// Variant order matters: every finite instant sorts before `Never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expiry {
    /// Unix milliseconds
    At(u64),
    Never,
}

impl Expiry {
    pub fn has_expired(&self, now_ms: u64) -> bool {
        match self {
            Expiry::At(at) => now_ms >= *at,
            Expiry::Never => false,
        }
    }

    pub fn as_millis(&self) -> Option<u64> {
        match self {
            Expiry::At(at) => Some(*at),
            Expiry::Never => None,
        }
    }
}

impl From<Option<u64>> for Expiry {
    fn from(expires_at: Option<u64>) -> Self {
        expires_at.map_or(Expiry::Never, Expiry::At)
    }
}

// == Handle ==
/// Stable identity of one index, assigned once per `put`.
///
/// The same number is stored as the version of the cached item written by that
/// put, which is how a popped index recognises itself as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u64);

// == Expiry Index ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryIndex<K> {
    key: K,
    expiry: Expiry,
    handle: Handle,
}

impl<K> ExpiryIndex<K> {
    pub fn new(key: K, expiry: Expiry, handle: Handle) -> Self {
        Self {
            key,
            expiry,
            handle,
        }
    }

    /// Builds an index expiring `ttl` after `now_ms`, or never when `ttl` is None.
    pub fn from_ttl(key: K, handle: Handle, ttl: Option<Duration>, now_ms: u64) -> Self {
        let expiry = match ttl {
            Some(ttl) if !ttl.is_zero() => {
                let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                Expiry::At(now_ms.saturating_add(ttl_ms))
            }
            _ => Expiry::Never,
        };
        Self::new(key, expiry, handle)
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_key(self) -> K {
        self.key
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn has_expired(&self, now_ms: u64) -> bool {
        self.expiry.has_expired(now_ms)
    }

    /// Orders by expiry ascending; `Never` is greater than any instant.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.expiry.cmp(&other.expiry)
    }
}
