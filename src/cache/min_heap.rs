//! Stable Handle Min-Heap Module
//!
//! A fixed-capacity binary min-heap of expiry indices, ordered by expiry.
//!
//! Every resident item can be found again in O(1) through its [`Handle`]: the
//! heap keeps a handle → slot back-reference table that is rewritten on every
//! swap. That is what makes deleting an arbitrary item O(log n) instead of a
//! linear scan.

use std::collections::HashMap;

use crate::cache::index::{ExpiryIndex, Handle};
use crate::error::{CacheError, Result};

// == Stable Handle Min-Heap ==
#[derive(Debug)]
pub struct StableHandleMinHeap<K> {
    /// Dense slot array, pre-sized to capacity. Slots `0..len` are occupied.
    slots: Vec<Option<ExpiryIndex<K>>>,
    /// Number of occupied slots
    len: usize,
    /// Back-references: handle -> current slot
    positions: HashMap<Handle, usize>,
}

impl<K> StableHandleMinHeap<K> {
    // == Constructor ==
    /// Creates an empty heap that can hold `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            len: 0,
            positions: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the item with this handle is resident.
    pub fn contains(&self, handle: Handle) -> bool {
        self.positions.contains_key(&handle)
    }

    /// Current slot of a resident item.
    pub fn slot_of(&self, handle: Handle) -> Option<usize> {
        self.positions.get(&handle).copied()
    }

    // == Insert ==
    /// Appends the item and sifts it up. O(log n).
    ///
    /// Returns [`CacheError::Full`] when every slot is occupied.
    pub fn insert(&mut self, item: ExpiryIndex<K>) -> Result<()> {
        if self.len == self.slots.len() {
            return Err(CacheError::Full(self.slots.len()));
        }
        debug_assert!(
            !self.positions.contains_key(&item.handle()),
            "handle {:?} inserted twice",
            item.handle()
        );

        let slot = self.len;
        self.positions.insert(item.handle(), slot);
        self.slots[slot] = Some(item);
        self.len += 1;
        self.sift_up(slot);
        Ok(())
    }

    // == Peek Min ==
    /// Returns the item that expires first without removing it. O(1).
    pub fn peek_min(&self) -> Option<&ExpiryIndex<K>> {
        if self.len == 0 {
            return None;
        }
        self.slots[0].as_ref()
    }

    // == Pop Min ==
    /// Removes and returns the item that expires first. O(log n).
    ///
    /// The returned item's handle is no longer resident.
    pub fn pop_min(&mut self) -> Option<ExpiryIndex<K>> {
        if self.len == 0 {
            return None;
        }

        let last = self.len - 1;
        self.swap(0, last);
        let item = match self.slots[last].take() {
            Some(item) => item,
            None => panic!("heap slot {} is empty inside the live range 0..{}", last, self.len),
        };
        self.len = last;
        self.positions.remove(&item.handle());

        if self.len > 1 {
            self.sift_down(0);
        }
        Some(item)
    }

    // == Delete By Handle ==
    /// Removes the resident item with this handle. O(log n).
    ///
    /// Returns None (and changes nothing) when the handle is not resident, so
    /// deleting the same item twice is harmless.
    pub fn delete_by_handle(&mut self, handle: Handle) -> Option<ExpiryIndex<K>> {
        let slot = self.slot_of(handle)?;
        assert!(
            slot < self.len,
            "handle {:?} points at slot {} outside the live range 0..{}",
            handle,
            slot,
            self.len
        );

        // Poison and pop: the item is treated as smaller than everything else,
        // so it climbs to the root unconditionally. Its stored expiry is left
        // untouched, the detached item comes back with its true value.
        self.bubble_to_root(slot);
        self.pop_min()
    }

    // == Clear ==
    /// Empties the heap. Every handle becomes non-resident.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().take(self.len) {
            *slot = None;
        }
        self.len = 0;
        self.positions.clear();
    }

    // == Drain ==
    /// Removes every resident item, in slot order.
    pub fn drain(&mut self) -> Vec<ExpiryIndex<K>> {
        let items = self
            .slots
            .iter_mut()
            .take(self.len)
            .filter_map(Option::take)
            .collect();
        self.len = 0;
        self.positions.clear();
        items
    }

    /// Iterates resident items in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &ExpiryIndex<K>> {
        self.slots.iter().take(self.len).flatten()
    }

    // == Internal Helpers ==
    fn item(&self, slot: usize) -> &ExpiryIndex<K> {
        match self.slots[slot].as_ref() {
            Some(item) => item,
            None => panic!(
                "heap slot {} is empty inside the live range 0..{}",
                slot, self.len
            ),
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.slots.swap(a, b);
        let handle_a = self.item(a).handle();
        let handle_b = self.item(b).handle();
        self.positions.insert(handle_a, a);
        self.positions.insert(handle_b, b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.item(parent).expiry() > self.item(slot).expiry() {
                self.swap(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;

            if left < self.len && self.item(left).expiry() < self.item(smallest).expiry() {
                smallest = left;
            }
            if right < self.len && self.item(right).expiry() < self.item(smallest).expiry() {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    fn bubble_to_root(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            self.swap(slot, parent);
            slot = parent;
        }
    }

    /// Panics if the heap property or a back-reference is broken.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert_eq!(self.positions.len(), self.len, "back-reference count");
        for slot in 0..self.len {
            let item = self.item(slot);
            assert_eq!(
                self.positions.get(&item.handle()),
                Some(&slot),
                "back-reference of {:?}",
                item.handle()
            );
            if slot > 0 {
                let parent = (slot - 1) / 2;
                assert!(
                    self.item(parent).expiry() <= item.expiry(),
                    "heap property broken at slot {}",
                    slot
                );
            }
        }
        for slot in self.len..self.slots.len() {
            assert!(self.slots[slot].is_none(), "slot {} should be empty", slot);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::index::Expiry;

    fn idx(key: &'static str, at: u64, handle: u64) -> ExpiryIndex<&'static str> {
        ExpiryIndex::new(key, Expiry::At(at), Handle(handle))
    }

    #[test]
    fn test_heap_new() {
        let heap: StableHandleMinHeap<&str> = StableHandleMinHeap::new(4);
        assert!(heap.is_empty());
        assert_eq!(heap.capacity(), 4);
        assert!(heap.peek_min().is_none());
    }

    #[test]
    fn test_insert_and_pop_in_order() {
        let mut heap = StableHandleMinHeap::new(8);
        for (i, at) in [50, 10, 40, 20, 30].into_iter().enumerate() {
            heap.insert(idx("k", at, i as u64)).unwrap();
            heap.assert_invariants();
        }

        assert_eq!(heap.peek_min().unwrap().expiry(), Expiry::At(10));

        let order: Vec<Expiry> = std::iter::from_fn(|| heap.pop_min())
            .map(|item| item.expiry())
            .collect();
        assert_eq!(
            order,
            vec![
                Expiry::At(10),
                Expiry::At(20),
                Expiry::At(30),
                Expiry::At(40),
                Expiry::At(50)
            ]
        );
        assert!(heap.pop_min().is_none());
    }

    #[test]
    fn test_insert_when_full() {
        let mut heap = StableHandleMinHeap::new(2);
        heap.insert(idx("a", 1, 1)).unwrap();
        heap.insert(idx("b", 2, 2)).unwrap();

        let result = heap.insert(idx("c", 3, 3));
        assert_eq!(result, Err(CacheError::Full(2)));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_never_sorts_last() {
        let mut heap = StableHandleMinHeap::new(4);
        heap.insert(ExpiryIndex::new("n", Expiry::Never, Handle(1))).unwrap();
        heap.insert(idx("a", 500, 2)).unwrap();

        assert_eq!(heap.pop_min().unwrap().key(), &"a");
        assert_eq!(heap.pop_min().unwrap().key(), &"n");
    }

    #[test]
    fn test_pop_clears_handle() {
        let mut heap = StableHandleMinHeap::new(4);
        heap.insert(idx("a", 1, 7)).unwrap();
        assert!(heap.contains(Handle(7)));

        let popped = heap.pop_min().unwrap();
        assert_eq!(popped.handle(), Handle(7));
        assert!(!heap.contains(Handle(7)));
    }

    #[test]
    fn test_delete_by_handle_middle() {
        let mut heap = StableHandleMinHeap::new(8);
        for h in 0..7u64 {
            heap.insert(idx("k", (h + 1) * 10, h)).unwrap();
        }

        let deleted = heap.delete_by_handle(Handle(4)).unwrap();
        heap.assert_invariants();

        // Detached item keeps its true expiry
        assert_eq!(deleted.expiry(), Expiry::At(50));
        assert_eq!(heap.len(), 6);
        assert!(!heap.contains(Handle(4)));
        assert!(heap.iter().all(|item| item.handle() != Handle(4)));
    }

    #[test]
    fn test_delete_by_handle_root() {
        let mut heap = StableHandleMinHeap::new(4);
        heap.insert(idx("a", 10, 1)).unwrap();
        heap.insert(idx("b", 20, 2)).unwrap();

        let deleted = heap.delete_by_handle(Handle(1)).unwrap();
        assert_eq!(deleted.key(), &"a");
        assert_eq!(heap.peek_min().unwrap().key(), &"b");
        heap.assert_invariants();
    }

    #[test]
    fn test_delete_twice_is_noop() {
        let mut heap = StableHandleMinHeap::new(4);
        heap.insert(idx("a", 10, 1)).unwrap();
        heap.insert(idx("b", 20, 2)).unwrap();

        assert!(heap.delete_by_handle(Handle(2)).is_some());
        assert!(heap.delete_by_handle(Handle(2)).is_none());
        assert!(heap.delete_by_handle(Handle(99)).is_none());
        assert_eq!(heap.len(), 1);
        heap.assert_invariants();
    }

    #[test]
    fn test_clear() {
        let mut heap = StableHandleMinHeap::new(4);
        heap.insert(idx("a", 10, 1)).unwrap();
        heap.insert(idx("b", 20, 2)).unwrap();

        heap.clear();
        assert!(heap.is_empty());
        assert!(!heap.contains(Handle(1)));
        heap.assert_invariants();

        // Reusable after clear
        heap.insert(idx("c", 5, 3)).unwrap();
        assert_eq!(heap.peek_min().unwrap().key(), &"c");
    }

    #[test]
    fn test_drain_returns_everything() {
        let mut heap = StableHandleMinHeap::new(4);
        heap.insert(idx("a", 30, 1)).unwrap();
        heap.insert(idx("b", 10, 2)).unwrap();
        heap.insert(idx("c", 20, 3)).unwrap();

        let mut keys: Vec<&str> = heap.drain().into_iter().map(|i| *i.key()).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(heap.is_empty());
        heap.assert_invariants();
    }

    #[test]
    fn test_equal_expiries_delete_non_root() {
        let mut heap = StableHandleMinHeap::new(8);
        for h in 0..5u64 {
            heap.insert(idx("k", 100, h)).unwrap();
        }

        let deleted = heap.delete_by_handle(Handle(3)).unwrap();
        assert_eq!(deleted.handle(), Handle(3));
        heap.assert_invariants();
        assert_eq!(heap.len(), 4);
    }
}
