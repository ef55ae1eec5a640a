#![cfg(feature = "rbtree")]
//! Property-based tests for PersistentRedBlackMap.
//!
//! Random interleavings of inserts and deletes are replayed against a
//! `BTreeMap` model; after every step the color invariants, black-height
//! balance and the cached size must hold.

use evertree::persistent::{OrderedMap, PersistentRedBlackMap};
use proptest::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// Strategies for Generating Test Data
// =============================================================================

#[derive(Debug, Clone)]
enum Operation {
    Insert(u64, u64),
    Delete(u64),
}

/// Either a narrow key space, so deletes hit often, or the full `u64` range.
fn key() -> impl Strategy<Value = u64> {
    prop_oneof![0..128_u64, any::<u64>()]
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => (key(), any::<u64>()).prop_map(|(key, value)| Operation::Insert(key, value)),
        2 => key().prop_map(Operation::Delete),
    ]
}

fn arbitrary_red_black_map(
    max_size: usize,
) -> impl Strategy<Value = PersistentRedBlackMap<u64, u64>> {
    prop::collection::vec((key(), any::<u64>()), 0..max_size)
        .prop_map(|entries| entries.into_iter().collect::<PersistentRedBlackMap<u64, u64>>())
}

// =============================================================================
// Insert and Delete Laws
// =============================================================================

proptest! {
    /// Law: get after insert returns the inserted value.
    #[test]
    fn prop_get_insert_law(map in arbitrary_red_black_map(60), key in key(), value: u64) {
        let updated = map.insert(key, value);
        prop_assert_eq!(updated.get(&key), Some(&value));
        prop_assert_eq!(updated.check_invariants(), Ok(()));
    }

    /// Law: size grows by one exactly when the key is new.
    #[test]
    fn prop_insert_size_law(map in arbitrary_red_black_map(60), key in key(), value: u64) {
        let expected = map.size() + u64::from(!map.contains_key(&key));
        prop_assert_eq!(map.insert(key, value).size(), expected);
    }

    /// Law: delete reports presence, removes the key and keeps the rest.
    #[test]
    fn prop_delete_law(map in arbitrary_red_black_map(60), key in key()) {
        let (smaller, removed) = map.delete(&key);
        prop_assert_eq!(removed, map.contains_key(&key));
        prop_assert!(!smaller.contains_key(&key));
        prop_assert_eq!(smaller.size(), map.size() - u64::from(removed));
        prop_assert!(smaller.iter().all(|(other, value)| map.get(other) == Some(value)));
        prop_assert_eq!(smaller.check_invariants(), Ok(()));
    }

    /// Law: deleting twice is the same as deleting once.
    #[test]
    fn prop_delete_idempotent(map in arbitrary_red_black_map(60), key in key()) {
        let once = map.remove(&key);
        let (twice, removed_again) = once.delete(&key);
        prop_assert!(!removed_again);
        prop_assert_eq!(once, twice);
    }
}

// =============================================================================
// Randomized Interleavings
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Color, black-height, ordering and size hold after every operation.
    #[test]
    fn prop_invariants_hold_after_each_step(
        operations in prop::collection::vec(operation(), 0..300)
    ) {
        let mut map = PersistentRedBlackMap::new();
        let mut model = BTreeMap::new();
        for operation in operations {
            match operation {
                Operation::Insert(key, value) => {
                    let fresh = !model.contains_key(&key);
                    let next = map.insert(key, value);
                    prop_assert_eq!(next.size(), map.size() + u64::from(fresh));
                    model.insert(key, value);
                    map = next;
                }
                Operation::Delete(key) => {
                    let (next, removed) = map.delete(&key);
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                    map = next;
                }
            }
            prop_assert_eq!(map.check_invariants(), Ok(()));
            prop_assert_eq!(map.size(), model.len() as u64);
        }
        prop_assert!(map.iter().eq(model.iter()));
    }

    /// Both maps agree with each other through the shared contract.
    #[cfg(feature = "avl")]
    #[test]
    fn prop_avl_and_red_black_agree(operations in prop::collection::vec(operation(), 0..200)) {
        use evertree::persistent::PersistentAvlMap;

        let mut avl: PersistentAvlMap<u64, u64> = OrderedMap::empty();
        let mut red_black: PersistentRedBlackMap<u64, u64> = OrderedMap::empty();
        for operation in operations {
            match operation {
                Operation::Insert(key, value) => {
                    avl = OrderedMap::insert(&avl, key, value);
                    red_black = OrderedMap::insert(&red_black, key, value);
                }
                Operation::Delete(key) => {
                    let (next_avl, avl_removed) = OrderedMap::delete(&avl, &key);
                    let (next_red_black, red_black_removed) = OrderedMap::delete(&red_black, &key);
                    prop_assert_eq!(avl_removed, red_black_removed);
                    avl = next_avl;
                    red_black = next_red_black;
                }
            }
            prop_assert_eq!(OrderedMap::size(&avl), OrderedMap::size(&red_black));
            prop_assert_eq!(avl.check_invariants(), Ok(()));
        }
        prop_assert!(avl.iter().eq(red_black.iter()));
    }

    /// Every earlier version keeps its contents after later edits.
    #[test]
    fn prop_old_versions_unchanged(operations in prop::collection::vec(operation(), 0..100)) {
        let mut versions = vec![PersistentRedBlackMap::new()];
        let mut snapshots: Vec<Vec<(u64, u64)>> = vec![Vec::new()];
        for operation in operations {
            let current = versions.last().cloned().unwrap_or_default();
            let next = match operation {
                Operation::Insert(key, value) => current.insert(key, value),
                Operation::Delete(key) => current.remove(&key),
            };
            snapshots.push(next.iter().map(|(key, value)| (*key, *value)).collect());
            versions.push(next);
        }

        for (map, snapshot) in versions.iter().zip(&snapshots) {
            let entries: Vec<(u64, u64)> = map.iter().map(|(key, value)| (*key, *value)).collect();
            prop_assert_eq!(&entries, snapshot);
            prop_assert_eq!(map.check_invariants(), Ok(()));
        }
    }
}
