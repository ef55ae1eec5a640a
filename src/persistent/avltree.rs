//! Persistent (immutable) ordered map based on an AVL tree.
//!
//! This module provides [`PersistentAvlMap`], an immutable ordered map
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentAvlMap` is a height-balanced binary search tree. Every node
//! records the height of its subtree, and after each edit the nodes on the
//! edited path are rotated until the heights of every node's two subtrees
//! differ by at most one.
//!
//! - O(log N) get
//! - O(log N) insert
//! - O(log N) delete
//! - O(log N) min/max
//! - O(log N + k) range queries where k is the number of results
//! - O(1) len and `is_empty`
//!
//! All operations return new maps without modifying the original. Only the
//! nodes on the path from the root to the edit are copied; every other
//! subtree is shared by reference between the old and the new version.
//!
//! # Examples
//!
//! ```rust
//! use evertree::persistent::PersistentAvlMap;
//!
//! let map = PersistentAvlMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in sorted order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Deleting returns the new version and whether anything was removed
//! let (smaller, removed) = map.delete(&2);
//! assert!(removed);
//! assert_eq!(smaller.len(), 2);
//! assert_eq!(map.len(), 3); // Original unchanged
//! ```
//!
//! # Internal Structure
//!
//! For every node:
//! 1. `height = 1 + max(height(left), height(right))`, an empty subtree has height 0
//! 2. `balance factor = height(right) - height(left)` is in `-1..=1`

use super::ReferenceCounter;
use super::invariant::InvariantViolation;
use super::node::{self, BinaryNode, InOrder, RangeInOrder};
use super::ordered_map::OrderedMap;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::iter::FromIterator;
use std::ops::RangeBounds;

// =============================================================================
// Node Definition
// =============================================================================

type Link<K, V> = Option<ReferenceCounter<Node<K, V>>>;

/// Internal node structure for the AVL tree.
#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    height: i8,
    left: Link<K, V>,
    right: Link<K, V>,
}

/// Height of an optional subtree; the empty subtree has height 0.
fn height<K, V>(link: Option<&ReferenceCounter<Node<K, V>>>) -> i8 {
    link.map_or(0, |node| node.height)
}

impl<K, V> Node<K, V> {
    /// Creates a node over two existing subtrees, computing its height.
    fn new(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Self {
        let height = 1 + height(left.as_ref()).max(height(right.as_ref()));
        Self {
            key,
            value,
            height,
            left,
            right,
        }
    }

    const fn leaf(key: K, value: V) -> Self {
        Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        }
    }

    fn balance_factor(&self) -> i8 {
        height(self.right.as_ref()) - height(self.left.as_ref())
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Rotates right around this node.
    ///
    /// ```text
    ///       self            pivot
    ///      /    \          /     \
    ///   pivot    c  =>    a      self
    ///   /   \                    /   \
    ///  a     b                  b     c
    /// ```
    ///
    /// `a`, `b` and `c` are reused by reference. The pivot is only copied if
    /// another version still holds it.
    fn rotate_right(self) -> Self {
        let Self {
            key,
            value,
            left,
            right,
            ..
        } = self;
        let Some(pivot) = left else {
            unreachable!("avl: rotate right requires a left child");
        };
        log::trace!("avl: rotate right");
        let Self {
            key: pivot_key,
            value: pivot_value,
            left: outer,
            right: inner,
            ..
        } = ReferenceCounter::unwrap_or_clone(pivot);
        let lowered = Self::new(key, value, inner, right);
        Self::new(
            pivot_key,
            pivot_value,
            outer,
            Some(ReferenceCounter::new(lowered)),
        )
    }

    /// Rotates left around this node. Mirror image of [`rotate_right`](Self::rotate_right).
    fn rotate_left(self) -> Self {
        let Self {
            key,
            value,
            left,
            right,
            ..
        } = self;
        let Some(pivot) = right else {
            unreachable!("avl: rotate left requires a right child");
        };
        log::trace!("avl: rotate left");
        let Self {
            key: pivot_key,
            value: pivot_value,
            left: inner,
            right: outer,
            ..
        } = ReferenceCounter::unwrap_or_clone(pivot);
        let lowered = Self::new(key, value, left, inner);
        Self::new(
            pivot_key,
            pivot_value,
            Some(ReferenceCounter::new(lowered)),
            outer,
        )
    }

    /// Restores the balance of a freshly built node whose subtrees are
    /// balanced and differ in height by at most two.
    fn rebalance(self) -> Self {
        let balance_factor = self.balance_factor();
        if balance_factor <= -2 {
            let left_leans_right = self
                .left
                .as_ref()
                .is_some_and(|left| left.balance_factor() > 0);
            if left_leans_right {
                // Left-Right: turn it into Left-Left first
                let Self {
                    key,
                    value,
                    left,
                    right,
                    ..
                } = self;
                let left = left.map(|left| {
                    ReferenceCounter::new(ReferenceCounter::unwrap_or_clone(left).rotate_left())
                });
                return Self::new(key, value, left, right).rotate_right();
            }
            return self.rotate_right();
        }
        if balance_factor >= 2 {
            let right_leans_left = self
                .right
                .as_ref()
                .is_some_and(|right| right.balance_factor() < 0);
            if right_leans_left {
                // Right-Left: turn it into Right-Right first
                let Self {
                    key,
                    value,
                    left,
                    right,
                    ..
                } = self;
                let right = right.map(|right| {
                    ReferenceCounter::new(ReferenceCounter::unwrap_or_clone(right).rotate_right())
                });
                return Self::new(key, value, left, right).rotate_left();
            }
            return self.rotate_left();
        }
        self
    }
}

impl<K, V> BinaryNode for Node<K, V> {
    type Key = K;

    fn key(&self) -> &K {
        &self.key
    }

    fn left(&self) -> Option<&ReferenceCounter<Self>> {
        self.left.as_ref()
    }

    fn right(&self) -> Option<&ReferenceCounter<Self>> {
        self.right.as_ref()
    }
}

// =============================================================================
// PersistentAvlMap Definition
// =============================================================================

/// A persistent (immutable) ordered map based on an AVL tree.
///
/// `PersistentAvlMap` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns.
///
/// Keys must implement `Ord` for ordering. Keys and values must implement
/// `Clone`, because the nodes on an edited path are duplicated rather than
/// mutated.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log N)          |
/// | `insert`       | O(log N)          |
/// | `delete`       | O(log N)          |
/// | `contains_key` | O(log N)          |
/// | `min`/`max`    | O(log N)          |
/// | `range`        | O(log N + k)      |
/// | `len`/`size`   | O(1)              |
///
/// # Examples
///
/// ```rust
/// use evertree::persistent::PersistentAvlMap;
///
/// let map: PersistentAvlMap<u64, u64> = (1..=50).map(|key| (key, key)).collect();
/// assert_eq!(map.size(), 50);
/// assert_eq!(map.get(&25), Some(&25));
///
/// let (map, removed) = map.delete(&10);
/// assert!(removed);
/// assert_eq!(map.size(), 49);
/// assert_eq!(map.get(&10), None);
/// ```
#[derive(Clone)]
pub struct PersistentAvlMap<K, V> {
    /// Root node of the tree
    root: Link<K, V>,
    /// Number of entries
    length: usize,
}

impl<K, V> PersistentAvlMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map: PersistentAvlMap<i32, String> = PersistentAvlMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            length: 0,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns the number of entries in the map as a `u64`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map = PersistentAvlMap::new().insert(1, "one").insert(2, "two");
    /// assert_eq!(map.size(), 2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.length as u64
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the height of the tree; 0 for the empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map = PersistentAvlMap::new().insert(3, ()).insert(2, ()).insert(1, ());
    /// assert_eq!(map.height(), 2);
    /// ```
    #[must_use]
    pub fn height(&self) -> usize {
        height(self.root.as_ref()).unsigned_abs().into()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but the
    /// ordering on the borrowed form must match the ordering on the key type.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map = PersistentAvlMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        node::find(self.root.as_ref(), key).map(|node| &node.value)
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the entry with the minimum key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map = PersistentAvlMap::new().insert(3, "three").insert(1, "one");
    /// assert_eq!(map.min(), Some((&1, &"one")));
    /// ```
    #[must_use]
    pub fn min(&self) -> Option<(&K, &V)> {
        node::leftmost(self.root.as_ref()).map(|node| (&node.key, &node.value))
    }

    /// Returns the entry with the maximum key.
    #[must_use]
    pub fn max(&self) -> Option<(&K, &V)> {
        node::rightmost(self.root.as_ref()).map(|node| (&node.key, &node.value))
    }

    /// Returns an iterator over entries in sorted key order.
    #[must_use]
    pub fn iter(&self) -> PersistentAvlMapIterator<'_, K, V> {
        PersistentAvlMapIterator {
            traversal: InOrder::new(self.root.as_ref()),
            remaining: self.length,
        }
    }

    /// Returns an iterator over keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in key order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Returns an iterator over entries within the specified range.
    ///
    /// # Complexity
    ///
    /// O(log N + k) where k is the number of entries in the range
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map: PersistentAvlMap<i32, i32> = (1..=5).map(|key| (key, key * 10)).collect();
    /// let range: Vec<(&i32, &i32)> = map.range(2..=4).collect();
    /// assert_eq!(range, vec![(&2, &20), (&3, &30), (&4, &40)]);
    /// ```
    pub fn range<R, Q>(&self, range: R) -> PersistentAvlMapRangeIterator<'_, K, V>
    where
        R: RangeBounds<Q>,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        PersistentAvlMapRangeIterator {
            traversal: RangeInOrder::new(
                self.root.as_ref(),
                range.start_bound(),
                range.end_bound(),
            ),
        }
    }

    /// Writes the tree structure as a graphviz digraph.
    ///
    /// Each node is labelled with its key and subtree height.
    ///
    /// # Errors
    ///
    /// Returns any error produced by `writer`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map = PersistentAvlMap::new().insert(1, ()).insert(2, ());
    /// let mut dot = Vec::new();
    /// map.write_dot(&mut dot).unwrap();
    /// assert!(String::from_utf8(dot).unwrap().starts_with("digraph tree {"));
    /// ```
    pub fn write_dot<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: io::Write + ?Sized,
        K: fmt::Debug,
    {
        node::write_dot(self.root.as_ref(), writer, |node| {
            format!("label=\"{:?} (h={})\"", node.key, node.height)
        })
    }

    /// Returns the graphviz rendering of [`write_dot`](Self::write_dot) as a string.
    #[must_use]
    pub fn to_dot(&self) -> String
    where
        K: fmt::Debug,
    {
        let mut output = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_dot(&mut output);
        String::from_utf8_lossy(&output).into_owned()
    }

    /// Validates ordering, stored heights, balance factors and the cached length.
    ///
    /// A map built through the public API always passes; this exists for
    /// tests and debugging.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation>
    where
        K: Ord,
    {
        let counted = node::check_order(self.root.as_ref())?;
        if counted != self.length {
            return Err(InvariantViolation::LengthMismatch {
                recorded: self.length,
                counted,
            });
        }
        Self::check_heights(self.root.as_ref(), 0).map(|_| ())
    }

    /// Returns the recomputed height of `link`.
    fn check_heights(
        link: Option<&ReferenceCounter<Node<K, V>>>,
        depth: usize,
    ) -> Result<i8, InvariantViolation> {
        let Some(node) = link else {
            return Ok(0);
        };
        let left = Self::check_heights(node.left.as_ref(), depth + 1)?;
        let right = Self::check_heights(node.right.as_ref(), depth + 1)?;
        let computed = 1 + left.max(right);
        if node.height != computed {
            return Err(InvariantViolation::HeightMismatch {
                depth,
                stored: node.height,
                computed,
            });
        }
        let balance_factor = right - left;
        if !(-1..=1).contains(&balance_factor) {
            return Err(InvariantViolation::Unbalanced {
                depth,
                balance_factor,
            });
        }
        Ok(computed)
    }
}

impl<K: Clone + Ord, V: Clone> PersistentAvlMap<K, V> {
    /// Creates a map containing a single key-value pair.
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains the key, the value is replaced and the
    /// tree shape is left as it was.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map1 = PersistentAvlMap::new().insert(1, "one");
    /// let map2 = map1.insert(1, "ONE");
    ///
    /// assert_eq!(map1.get(&1), Some(&"one")); // Original unchanged
    /// assert_eq!(map2.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let (root, added) = Self::insert_into_node(self.root.as_ref(), key, value);
        Self {
            root: Some(root),
            length: if added { self.length + 1 } else { self.length },
        }
    }

    /// Recursive helper for insert.
    /// Returns (`new_node`, `was_added`) where `was_added` is true if a new entry was added.
    fn insert_into_node(
        link: Option<&ReferenceCounter<Node<K, V>>>,
        key: K,
        value: V,
    ) -> (ReferenceCounter<Node<K, V>>, bool) {
        let Some(node) = link else {
            return (ReferenceCounter::new(Node::leaf(key, value)), true);
        };
        match key.cmp(&node.key) {
            Ordering::Less => {
                let (left, added) = Self::insert_into_node(node.left.as_ref(), key, value);
                let copy = Node::new(
                    node.key.clone(),
                    node.value.clone(),
                    Some(left),
                    node.right.clone(),
                );
                (ReferenceCounter::new(copy.rebalance()), added)
            }
            Ordering::Greater => {
                let (right, added) = Self::insert_into_node(node.right.as_ref(), key, value);
                let copy = Node::new(
                    node.key.clone(),
                    node.value.clone(),
                    node.left.clone(),
                    Some(right),
                );
                (ReferenceCounter::new(copy.rebalance()), added)
            }
            Ordering::Equal => {
                let replaced = Node {
                    key,
                    value,
                    height: node.height,
                    left: node.left.clone(),
                    right: node.right.clone(),
                };
                (ReferenceCounter::new(replaced), false)
            }
        }
    }

    /// Removes a key from the map.
    ///
    /// Returns the new map and whether the key was present. If the key is
    /// absent the returned map shares its root with `self`.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentAvlMap;
    ///
    /// let map = PersistentAvlMap::new().insert(1, "one").insert(2, "two");
    ///
    /// let (removed, found) = map.delete(&1);
    /// assert!(found);
    /// assert_eq!(removed.get(&1), None);
    /// assert_eq!(map.len(), 2); // Original unchanged
    ///
    /// let (same, found) = removed.delete(&1);
    /// assert!(!found);
    /// assert_eq!(same.len(), 1);
    /// ```
    #[must_use]
    pub fn delete<Q>(&self, key: &Q) -> (Self, bool)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self::delete_from_node(self.root.as_ref(), key).map_or_else(
            || (self.clone(), false),
            |root| {
                let map = Self {
                    root,
                    length: self.length - 1,
                };
                (map, true)
            },
        )
    }

    /// Removes a key from the map, discarding whether it was present.
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.delete(key).0
    }

    /// Recursive helper for delete.
    /// Returns `None` when the key is absent, otherwise the rebuilt subtree.
    fn delete_from_node<Q>(
        link: Option<&ReferenceCounter<Node<K, V>>>,
        key: &Q,
    ) -> Option<Link<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = link?;
        let rebuilt = match key.cmp(node.key.borrow()) {
            Ordering::Less => {
                let left = Self::delete_from_node(node.left.as_ref(), key)?;
                Node::new(
                    node.key.clone(),
                    node.value.clone(),
                    left,
                    node.right.clone(),
                )
            }
            Ordering::Greater => {
                let right = Self::delete_from_node(node.right.as_ref(), key)?;
                Node::new(
                    node.key.clone(),
                    node.value.clone(),
                    node.left.clone(),
                    right,
                )
            }
            Ordering::Equal => match (&node.left, &node.right) {
                (Some(left), Some(right)) => {
                    log::debug!("avl delete: node has two children, promoting its predecessor");
                    let (key, value, left) = Self::remove_largest(left);
                    Node::new(key, value, left, Some(right.clone()))
                }
                (Some(child), None) | (None, Some(child)) => return Some(Some(child.clone())),
                (None, None) => return Some(None),
            },
        };
        Some(Some(ReferenceCounter::new(rebuilt.rebalance())))
    }

    /// Removes the largest entry of a subtree.
    /// Returns the removed key and value together with the remaining subtree.
    fn remove_largest(node: &ReferenceCounter<Node<K, V>>) -> (K, V, Link<K, V>) {
        match &node.right {
            Some(right) => {
                let (key, value, right) = Self::remove_largest(right);
                let copy = Node::new(
                    node.key.clone(),
                    node.value.clone(),
                    node.left.clone(),
                    right,
                );
                (key, value, Some(ReferenceCounter::new(copy.rebalance())))
            }
            None => (node.key.clone(), node.value.clone(), node.left.clone()),
        }
    }
}

impl<K: Clone + Ord, V: Clone> OrderedMap<K, V> for PersistentAvlMap<K, V> {
    fn empty() -> Self {
        Self::new()
    }

    fn size(&self) -> u64 {
        Self::size(self)
    }

    fn get(&self, key: &K) -> Option<&V> {
        Self::get(self, key)
    }

    fn insert(&self, key: K, value: V) -> Self {
        Self::insert(self, key, value)
    }

    fn delete(&self, key: &K) -> (Self, bool) {
        Self::delete(self, key)
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over key-value pairs of a [`PersistentAvlMap`].
pub struct PersistentAvlMapIterator<'a, K, V> {
    traversal: InOrder<'a, Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for PersistentAvlMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.traversal.next()?;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for PersistentAvlMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// A range iterator over key-value pairs of a [`PersistentAvlMap`].
pub struct PersistentAvlMapRangeIterator<'a, K, V> {
    traversal: RangeInOrder<'a, Node<K, V>>,
}

impl<'a, K, V> Iterator for PersistentAvlMapRangeIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.traversal
            .next()
            .map(|node| (&node.key, &node.value))
    }
}

/// An owning iterator over key-value pairs of a [`PersistentAvlMap`].
pub struct PersistentAvlMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for PersistentAvlMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for PersistentAvlMapIntoIterator<K, V> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for PersistentAvlMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Ord, V: Clone> FromIterator<(K, V)> for PersistentAvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Clone + Ord, V: Clone> Extend<(K, V)> for PersistentAvlMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            *self = self.insert(key, value);
        }
    }
}

impl<K: Clone, V: Clone> IntoIterator for PersistentAvlMap<K, V> {
    type Item = (K, V);
    type IntoIter = PersistentAvlMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentAvlMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentAvlMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentAvlMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for PersistentAvlMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for PersistentAvlMap<K, V> {}

/// Hashes the length, then each (key, value) pair in key order, so equal
/// maps hash equally regardless of the order they were built in.
impl<K: Hash, V: Hash> Hash for PersistentAvlMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentAvlMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for PersistentAvlMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

#[cfg(feature = "arc")]
static_assertions::assert_impl_all!(PersistentAvlMap<i32, String>: Send, Sync);

#[cfg(not(feature = "arc"))]
static_assertions::assert_not_impl_any!(PersistentAvlMap<i32, String>: Send, Sync);

// =============================================================================
// Rayon Support
// =============================================================================

#[cfg(feature = "rayon")]
impl<K: Sync, V: Sync> PersistentAvlMap<K, V> {
    /// Returns a parallel iterator over entries.
    ///
    /// Entries are gathered in key order, then handed to rayon.
    #[must_use]
    pub fn par_iter(&self) -> rayon::vec::IntoIter<(&K, &V)> {
        use rayon::iter::IntoParallelIterator;
        self.iter().collect::<Vec<_>>().into_par_iter()
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for PersistentAvlMap<K, V>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentAvlMapVisitor<K, V> {
    marker: std::marker::PhantomData<(K, V)>,
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for PersistentAvlMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    type Value = PersistentAvlMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut map = PersistentAvlMap::new();
        while let Some((key, value)) = access.next_entry()? {
            map = map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for PersistentAvlMap<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentAvlMapVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[should_panic(expected = "rotate right requires a left child")]
    fn test_rotate_right_without_left_child_panics() {
        let _ = Node::leaf(1, ()).rotate_right();
    }

    #[rstest]
    #[should_panic(expected = "rotate left requires a right child")]
    fn test_rotate_left_without_right_child_panics() {
        let _ = Node::leaf(1, ()).rotate_left();
    }

    fn root_of<K, V>(map: &PersistentAvlMap<K, V>) -> &Node<K, V> {
        map.root.as_deref().unwrap()
    }

    fn child<K, V>(link: &Link<K, V>) -> &Node<K, V> {
        link.as_deref().unwrap()
    }

    #[rstest]
    fn test_descending_inserts_rotate_right() {
        let map = PersistentAvlMap::new().insert(3, 3).insert(2, 2).insert(1, 1);

        let root = root_of(&map);
        assert_eq!(root.key, 2);
        assert_eq!(root.height, 2);
        assert_eq!(child(&root.left).key, 1);
        assert_eq!(child(&root.left).height, 1);
        assert_eq!(child(&root.right).key, 3);
        assert_eq!(child(&root.right).height, 1);
    }

    #[rstest]
    fn test_ascending_inserts_rotate_left() {
        let map = PersistentAvlMap::new().insert(1, 1).insert(2, 2).insert(3, 3);

        let root = root_of(&map);
        assert_eq!(root.key, 2);
        assert_eq!(child(&root.left).key, 1);
        assert_eq!(child(&root.right).key, 3);
    }

    #[rstest]
    #[case(&[3, 1, 2])]
    #[case(&[1, 3, 2])]
    fn test_zigzag_inserts_double_rotate(#[case] keys: &[i32]) {
        let map: PersistentAvlMap<i32, i32> = keys.iter().map(|&key| (key, key)).collect();

        let root = root_of(&map);
        assert_eq!(root.key, 2);
        assert_eq!(root.height, 2);
        assert_eq!(child(&root.left).key, 1);
        assert_eq!(child(&root.right).key, 3);
    }

    #[rstest]
    fn test_replace_keeps_shape() {
        let map: PersistentAvlMap<i32, i32> = (1..=7).map(|key| (key, key)).collect();
        let replaced = map.insert(4, 40);

        assert_eq!(root_of(&replaced).key, root_of(&map).key);
        assert_eq!(root_of(&replaced).height, root_of(&map).height);
        // Both children are shared with the previous version
        assert!(ReferenceCounter::ptr_eq(
            root_of(&map).left.as_ref().unwrap(),
            root_of(&replaced).left.as_ref().unwrap()
        ));
    }

    #[rstest]
    fn test_insert_shares_untouched_subtree() {
        let map: PersistentAvlMap<i32, i32> = (1..=15).map(|key| (key, key)).collect();
        let extended = map.insert(16, 16);

        // 16 lands in the right subtree; the left subtree is reused as is
        assert!(ReferenceCounter::ptr_eq(
            root_of(&map).left.as_ref().unwrap(),
            root_of(&extended).left.as_ref().unwrap()
        ));
    }

    #[rstest]
    fn test_delete_missing_shares_root() {
        let map: PersistentAvlMap<i32, i32> = (1..=10).map(|key| (key, key)).collect();
        let (same, removed) = map.delete(&42);

        assert!(!removed);
        assert!(ReferenceCounter::ptr_eq(
            map.root.as_ref().unwrap(),
            same.root.as_ref().unwrap()
        ));
    }

    #[rstest]
    fn test_delete_two_children_uses_predecessor() {
        let map = PersistentAvlMap::new().insert(2, 2).insert(1, 1).insert(3, 3);
        let (map, removed) = map.delete(&2);

        assert!(removed);
        assert_eq!(root_of(&map).key, 1);
        assert_eq!(child(&root_of(&map).right).key, 3);
        assert!(map.check_invariants().is_ok());
    }

    #[rstest]
    fn test_delete_rebalances_ancestors() {
        //       4
        //     /   \
        //    2     6
        //   / \   / \
        //  1   3 5   7
        //             \
        //              8
        let map: PersistentAvlMap<i32, i32> = [4, 2, 6, 1, 3, 5, 7, 8]
            .into_iter()
            .map(|key| (key, key))
            .collect();
        let map = map.remove(&1).remove(&3);

        assert!(map.check_invariants().is_ok());
        assert_eq!(root_of(&map).key, 6);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![2, 4, 5, 6, 7, 8]);
    }

    #[rstest]
    fn test_delete_last_entry_empties_map() {
        let (map, removed) = PersistentAvlMap::singleton(1, "one").delete(&1);
        assert!(removed);
        assert!(map.is_empty());
        assert!(map.root.is_none());
    }

    #[rstest]
    fn test_check_invariants_detects_bad_height() {
        let map = PersistentAvlMap {
            root: Some(ReferenceCounter::new(Node {
                key: 1,
                value: (),
                height: 5,
                left: None,
                right: None,
            })),
            length: 1,
        };
        assert_eq!(
            map.check_invariants(),
            Err(InvariantViolation::HeightMismatch {
                depth: 0,
                stored: 5,
                computed: 1
            })
        );
    }

    #[rstest]
    fn test_check_invariants_detects_imbalance() {
        let leaf = |key| Some(ReferenceCounter::new(Node::leaf(key, ())));
        let chain = Node::new(2, (), None, leaf(3));
        let root = Node::new(1, (), None, Some(ReferenceCounter::new(chain)));
        let map = PersistentAvlMap {
            root: Some(ReferenceCounter::new(root)),
            length: 3,
        };
        assert_eq!(
            map.check_invariants(),
            Err(InvariantViolation::Unbalanced {
                depth: 0,
                balance_factor: 2
            })
        );
    }

    #[rstest]
    fn test_check_invariants_detects_length_mismatch() {
        let map = PersistentAvlMap {
            root: Some(ReferenceCounter::new(Node::leaf(1, ()))),
            length: 2,
        };
        assert_eq!(
            map.check_invariants(),
            Err(InvariantViolation::LengthMismatch {
                recorded: 2,
                counted: 1
            })
        );
    }

    #[rstest]
    fn test_to_dot_includes_heights() {
        let map = PersistentAvlMap::new().insert(2, ()).insert(1, ());
        assert_eq!(
            map.to_dot(),
            "digraph tree {\n\
             \tn0 [label=\"2 (h=2)\"];\n\
             \tn1 [label=\"1 (h=1)\"];\n\
             \tn0 -> n1 [label=\"L\"];\n\
             }\n"
        );
    }

    #[rstest]
    fn test_display_sorted() {
        let map = PersistentAvlMap::new()
            .insert(3, "three".to_string())
            .insert(1, "one".to_string())
            .insert(2, "two".to_string());
        assert_eq!(format!("{map}"), "{1: one, 2: two, 3: three}");
    }

    #[rstest]
    fn test_display_empty() {
        let map: PersistentAvlMap<i32, String> = PersistentAvlMap::new();
        assert_eq!(format!("{map}"), "{}");
    }

    #[rstest]
    fn test_height_grows_logarithmically() {
        let map: PersistentAvlMap<u32, u32> = (0..1023).map(|key| (key, key)).collect();
        // A perfectly balanced tree of 1023 nodes has height 10
        assert_eq!(map.height(), 10);
    }
}

// =============================================================================
// Multithread Tests (arc feature only)
// =============================================================================
