//! Key Store Module
//!
//! The pluggable associative storage behind both engines. Engines only talk to
//! the [`KeyStore`] contract; [`MemoryStore`] is the default implementation.
//!
//! Implementations must stay in-memory and non-blocking: every engine
//! operation is synchronous and runs to completion.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::cache::CachedItem;

// == Key Store Contract ==
pub trait KeyStore<K, V>: fmt::Debug {
    fn get(&self, key: &K) -> Option<&CachedItem<V>>;

    /// Inserts or wholly replaces the item stored under `key`.
    fn set(&mut self, key: K, item: CachedItem<V>);

    fn has(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes the item, returning true if it existed.
    fn delete(&mut self, key: &K) -> bool;

    fn clear(&mut self);

    fn size(&self) -> usize;

    /// All stored pairs. Order is unspecified unless the store preserves one.
    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &CachedItem<V>)> + '_>;
}

// == Memory Store ==
/// HashMap-backed key store.
pub struct MemoryStore<K, V> {
    entries: HashMap<K, CachedItem<V>>,
}

impl<K, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for MemoryStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<K, V> KeyStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn get(&self, key: &K) -> Option<&CachedItem<V>> {
        self.entries.get(key)
    }

    fn set(&mut self, key: K, item: CachedItem<V>) {
        self.entries.insert(key, item);
    }

    fn has(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &CachedItem<V>)> + '_> {
        Box::new(self.entries.iter())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn item(value: &'static str) -> CachedItem<&'static str> {
        CachedItem::new(value, 0, None, 1)
    }

    #[test]
    fn test_store_new() {
        let store: MemoryStore<String, &str> = MemoryStore::new();
        assert_eq!(store.size(), 0);
        assert_eq!(store.entries().count(), 0);
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::new();

        store.set("key1".to_string(), item("value1"));

        assert_eq!(store.get(&"key1".to_string()).unwrap().value, "value1");
        assert!(store.has(&"key1".to_string()));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_store_overwrite_replaces_item() {
        let mut store = MemoryStore::new();

        store.set("key1", item("value1"));
        store.set("key1", CachedItem::new("value2", 5, Some(10), 2));

        let stored = store.get(&"key1").unwrap();
        assert_eq!(stored.value, "value2");
        assert_eq!(stored.version, 2);
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = MemoryStore::new();
        store.set("key1", item("value1"));

        assert!(store.delete(&"key1"));
        assert!(!store.delete(&"key1"));
        assert!(!store.has(&"key1"));
    }

    #[test]
    fn test_store_clear_and_entries() {
        let mut store = MemoryStore::new();
        store.set("a", item("1"));
        store.set("b", item("2"));

        let mut keys: Vec<&str> = store.entries().map(|(k, _)| *k).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        store.clear();
        assert_eq!(store.size(), 0);
    }
}
