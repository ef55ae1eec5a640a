//! Persistent (immutable) ordered maps.
//!
//! This module provides two self-balancing binary search trees that use
//! structural sharing to minimize copying:
//!
//! - [`PersistentAvlMap`]: height-balanced (AVL) ordered map
//! - [`PersistentRedBlackMap`]: color-balanced (Red-Black) ordered map
//!
//! Both implement [`OrderedMap`], the common contract for a persistent
//! ordered map, and both can validate their own shape with
//! `check_invariants`, reporting an [`InvariantViolation`].
//!
//! # Structural Sharing
//!
//! Nodes are never mutated once they are reachable from a map. Inserting
//! or deleting copies only the nodes on the path from the root to the
//! change; every other subtree is shared between the old and the new map.
//!
//! # Examples
//!
//! ## `PersistentAvlMap`
//!
//! ```rust
//! use evertree::persistent::PersistentAvlMap;
//!
//! let map: PersistentAvlMap<i32, i32> = (1..=7).map(|key| (key, key * 10)).collect();
//! assert_eq!(map.height(), 3);
//! assert_eq!(map.get(&4), Some(&40));
//!
//! // Structural sharing: the original map is preserved
//! let (smaller, removed) = map.delete(&4);
//! assert!(removed);
//! assert_eq!(map.len(), 7);     // Original unchanged
//! assert_eq!(smaller.len(), 6); // New version
//! ```
//!
//! ## `PersistentRedBlackMap`
//!
//! ```rust
//! use evertree::persistent::PersistentRedBlackMap;
//!
//! let map = PersistentRedBlackMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in sorted order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert(1, "ONE");
//! assert_eq!(map.get(&1), Some(&"one"));  // Original unchanged
//! assert_eq!(updated.get(&1), Some(&"ONE")); // New version
//!
//! // Range queries
//! let range: Vec<(&i32, &&str)> = map.range(1..=2).collect();
//! assert_eq!(range.len(), 2); // 1 and 2
//! assert!(map.check_invariants().is_ok());
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod invariant;
mod node;
mod ordered_map;

#[cfg(feature = "avl")]
mod avltree;
#[cfg(feature = "rbtree")]
mod rbtree;

pub use invariant::InvariantViolation;
pub use ordered_map::OrderedMap;

#[cfg(feature = "avl")]
pub use avltree::PersistentAvlMap;
#[cfg(feature = "avl")]
pub use avltree::PersistentAvlMapIntoIterator;
#[cfg(feature = "avl")]
pub use avltree::PersistentAvlMapIterator;
#[cfg(feature = "avl")]
pub use avltree::PersistentAvlMapRangeIterator;

#[cfg(feature = "rbtree")]
pub use rbtree::PersistentRedBlackMap;
#[cfg(feature = "rbtree")]
pub use rbtree::PersistentRedBlackMapIntoIterator;
#[cfg(feature = "rbtree")]
pub use rbtree::PersistentRedBlackMapIterator;
#[cfg(feature = "rbtree")]
pub use rbtree::PersistentRedBlackMapRangeIterator;

// =============================================================================
// Tests
// =============================================================================
