//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the heap and engine invariants under random
//! operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    Clock, ExpiringCache, Expiry, ExpiryIndex, Handle, HeapCache, KeyStore, ManualClock,
    ShardedQueueCache, StableHandleMinHeap, Ttl,
};
use crate::config::QueueConfig;

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 16;
const T0: u64 = 1_000_000;

// == Strategies ==
/// Small key space so that overwrites and deletes of live keys are common
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h]{1,2}".prop_map(|s| s)
}

fn ttl_strategy() -> impl Strategy<Value = Ttl> {
    prop_oneof![
        Just(Ttl::Never),
        Just(Ttl::Default),
        (1u64..120).prop_map(Ttl::secs),
    ]
}

#[derive(Debug, Clone)]
enum HeapOp {
    Insert(u64),
    Pop,
    Delete(usize),
}

fn heap_op_strategy() -> impl Strategy<Value = HeapOp> {
    prop_oneof![
        3 => (0u64..1_000).prop_map(HeapOp::Insert),
        1 => Just(HeapOp::Pop),
        2 => (0usize..64).prop_map(HeapOp::Delete),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: u32, ttl: Ttl },
    Get { key: String },
    Delete { key: String },
    Advance { secs: u64 },
    ClearExpired,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (key_strategy(), any::<u32>(), ttl_strategy())
            .prop_map(|(key, value, ttl)| CacheOp::Put { key, value, ttl }),
        2 => key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => key_strategy().prop_map(|key| CacheOp::Delete { key }),
        1 => (1u64..60).prop_map(|secs| CacheOp::Advance { secs }),
        1 => Just(CacheOp::ClearExpired),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Heap property and back-references hold after any sequence of
    // insert / pop / delete-by-handle, and pops come out in expiry order.
    #[test]
    fn prop_heap_invariants(ops in prop::collection::vec(heap_op_strategy(), 1..150)) {
        let mut heap = StableHandleMinHeap::new(32);
        let mut resident: Vec<Handle> = Vec::new();
        let mut next = 0u64;

        for op in ops {
            match op {
                HeapOp::Insert(at) => {
                    next += 1;
                    let inserted = heap.insert(ExpiryIndex::new((), Expiry::At(at), Handle(next)));
                    if resident.len() < 32 {
                        prop_assert!(inserted.is_ok());
                        resident.push(Handle(next));
                    } else {
                        prop_assert!(inserted.is_err());
                    }
                }
                HeapOp::Pop => {
                    let min = heap.peek_min().map(|item| item.expiry());
                    let popped = heap.pop_min();
                    prop_assert_eq!(popped.as_ref().map(|item| item.expiry()), min);
                    if let Some(item) = popped {
                        prop_assert!(heap.iter().all(|rest| rest.expiry() >= item.expiry()));
                        resident.retain(|h| *h != item.handle());
                    }
                }
                HeapOp::Delete(pick) => {
                    if resident.is_empty() {
                        continue;
                    }
                    let handle = resident.remove(pick % resident.len());
                    let deleted = heap.delete_by_handle(handle);
                    prop_assert_eq!(deleted.map(|item| item.handle()), Some(handle));
                    // Second delete from another code path is harmless
                    prop_assert!(heap.delete_by_handle(handle).is_none());
                }
            }
            heap.assert_invariants();
            prop_assert_eq!(heap.len(), resident.len());
        }
    }

    // The heap engine agrees with a naive model, never exceeds capacity and
    // keeps exactly one live index per stored key.
    #[test]
    fn prop_heap_cache_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..120)) {
        let clock = ManualClock::new(T0);
        let mut cache: HeapCache<String, u32> = HeapCache::with_clock(
            TEST_MAX_SIZE,
            Some(Duration::from_secs(30)),
            Arc::new(clock.clone()),
        ).unwrap();
        // key -> (value, expires_at)
        let mut model: HashMap<String, (u32, Option<u64>)> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Put { key, value, ttl } => {
                    let ttl_ms = match ttl {
                        Ttl::After(d) => Some(d.as_millis() as u64),
                        Ttl::Default => Some(30_000),
                        Ttl::Never => None,
                    };
                    cache.put(key.clone(), value, ttl).unwrap();
                    model.insert(key, (value, ttl_ms.map(|ms| clock.now_ms() + ms)));
                    // Evictions are checked against the store, not predicted
                    model.retain(|k, _| cache.store().has(k));
                }
                CacheOp::Get { key } => {
                    let now = clock.now_ms();
                    let expected = model
                        .get(&key)
                        .filter(|(_, exp)| exp.map_or(true, |at| now < at))
                        .map(|(v, _)| *v);
                    prop_assert_eq!(cache.get(&key), expected);
                    if expected.is_none() {
                        model.remove(&key);
                    }
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(cache.delete(&key), model.remove(&key).is_some());
                }
                CacheOp::Advance { secs } => clock.advance_secs(secs),
                CacheOp::ClearExpired => {
                    let now = clock.now_ms();
                    let expired = model
                        .values()
                        .filter(|(_, exp)| exp.is_some_and(|at| now >= at))
                        .count();
                    prop_assert_eq!(cache.clear_expired_items(), expired);
                    model.retain(|_, (_, exp)| exp.map_or(true, |at| now < at));
                }
            }

            prop_assert!(cache.size() <= TEST_MAX_SIZE);
            prop_assert_eq!(cache.size(), model.len());
            cache.assert_consistent();
        }
    }

    // Capacity: max_size + n distinct never-expiring keys keep the newest.
    #[test]
    fn prop_capacity_keeps_newest(max_size in 1usize..20, extra in 1usize..20) {
        let mut cache: HeapCache<usize, usize> = HeapCache::new(max_size, None).unwrap();
        let total = max_size + extra;
        for i in 0..total {
            cache.put(i, i, Ttl::Never).unwrap();
        }

        prop_assert_eq!(cache.size(), max_size);
        for i in 0..extra {
            prop_assert_eq!(cache.get(&i), None);
        }
        for i in extra..total {
            prop_assert_eq!(cache.get(&i), Some(i));
        }
    }

    // Rebuilding twice changes nothing observable.
    #[test]
    fn prop_rebuild_idempotent(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let clock = ManualClock::new(T0);
        let mut cache: HeapCache<String, u32> =
            HeapCache::with_clock(TEST_MAX_SIZE, None, Arc::new(clock.clone())).unwrap();
        for op in ops {
            match op {
                CacheOp::Put { key, value, ttl } => cache.put(key, value, ttl).unwrap(),
                CacheOp::Delete { key } => {
                    cache.delete(&key);
                }
                CacheOp::Advance { secs } => clock.advance_secs(secs),
                _ => {}
            }
        }

        cache.rebuild_index();
        let once: Vec<(String, u32)> = sorted_entries(cache.store());
        let index_len = cache.index_len();

        cache.rebuild_index();
        prop_assert_eq!(sorted_entries(cache.store()), once);
        prop_assert_eq!(cache.index_len(), index_len);
        cache.assert_consistent();
    }

    // Every bucket respects its own capacity; a key put under a new TTL
    // survives the expiry of its old bucket entry.
    #[test]
    fn prop_sharded_buckets_bounded(
        puts in prop::collection::vec((key_strategy(), 0usize..3), 1..100),
        advance in 0u64..200
    ) {
        let clock = ManualClock::new(T0);
        let queues = [
            QueueConfig::new(Some(10), Some(4)),
            QueueConfig::new(Some(100), Some(6)),
            QueueConfig::never(Some(5)),
        ];
        let ttls = [Ttl::secs(10), Ttl::secs(100), Ttl::Never];
        let mut cache: ShardedQueueCache<String, usize> =
            ShardedQueueCache::with_clock(&queues, None, Arc::new(clock.clone())).unwrap();
        let mut last: HashMap<String, usize> = HashMap::new();

        for (key, bucket) in puts {
            cache.put(key.clone(), bucket, ttls[bucket]).unwrap();
            last.insert(key, bucket);

            for ((_, len), config) in cache.bucket_lens().iter().zip(queues.iter()) {
                prop_assert!(*len <= config.capacity.unwrap());
            }
            prop_assert!(cache.size() <= 15);
        }

        clock.advance_secs(advance);
        cache.clear_expired_items();

        // Whatever survived holds the value of its latest put
        for (key, item) in cache.store().entries() {
            prop_assert_eq!(item.value, last[key]);
            prop_assert!(!item.is_expired(clock.now_ms()));
        }
    }
}

fn sorted_entries<S: KeyStore<String, u32>>(store: &S) -> Vec<(String, u32)> {
    let mut entries: Vec<(String, u32)> = store
        .entries()
        .map(|(k, item)| (k.clone(), item.value))
        .collect();
    entries.sort();
    entries
}
