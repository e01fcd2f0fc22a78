//! Cached Item Module
//!
//! Defines the structure stored in the key store for each key.

// == Cached Item ==
/// A value together with its timing metadata.
///
/// Owned by the key store, one per key, replaced wholesale on overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedItem<V> {
    /// The stored value
    pub value: V,
    /// Insertion timestamp (Unix milliseconds)
    pub inserted_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Version marker shared with the ordering index created by the same put
    pub version: u64,
}

impl<V> CachedItem<V> {
    // == Constructor ==
    /// Creates a new item inserted at `now_ms`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `now_ms` - Insertion time
    /// * `ttl_ms` - Optional TTL in milliseconds
    /// * `version` - Version marker of the matching index
    pub fn new(value: V, now_ms: u64, ttl_ms: Option<u64>, version: u64) -> Self {
        Self {
            value,
            inserted_at: now_ms,
            expires_at: ttl_ms.map(|ttl| now_ms.saturating_add(ttl)),
            version,
        }
    }

    // == Is Expired ==
    /// Checks if the item has expired at `now_ms`.
    ///
    /// Boundary condition: an item is expired once the current time is greater
    /// than or equal to its expiration time.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if the item never expires.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(now_ms))
    }
}
