//! Persistent (immutable) ordered map based on a Red-Black tree.
//!
//! This module provides [`PersistentRedBlackMap`], an immutable ordered map
//! that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `PersistentRedBlackMap` is a color-balanced binary search tree.
//!
//! - O(log N) get
//! - O(log N) insert
//! - O(log N) delete
//! - O(log N) min/max
//! - O(log N + k) range queries where k is the number of results
//! - O(1) len and `is_empty`
//!
//! All operations return new maps without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Examples
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
//! // Range queries
//! let range: Vec<(&i32, &&str)> = map.range(1..3).collect();
//! assert_eq!(range.len(), 2); // 1 and 2
//! ```
//!
//! # Internal Structure
//!
//! The Red-Black Tree maintains the following invariants:
//! 1. Every node is either red or black
//! 2. The root is black
//! 3. All leaves (NIL) are black
//! 4. Red nodes have only black children
//! 5. Every path from root to leaf has the same number of black nodes
//!
//! These invariants ensure the tree height is O(log N).
//!
//! # Ancestor Chains
//!
//! Nodes carry no parent pointers. An edit first walks down from the root
//! recording the borrowed path, then duplicates every node on it into a
//! chain of owned frames on the heap. The fixup loops pop parent, grandparent and
//! great-grandparent frames off that chain, recolor and rotate the owned
//! copies freely, and finally zip the chain back up into a new root. Nodes
//! reachable from an existing map are only ever read.

use super::ReferenceCounter;
use super::invariant::InvariantViolation;
use super::node::{self, BinaryNode, InOrder, RangeInOrder};
use super::ordered_map::OrderedMap;
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::iter::FromIterator;
use std::ops::RangeBounds;

/// Borrowed path entries kept inline before a search path spills to the heap.
///
/// A Red-Black tree of N entries is at most 2·log2(N + 1) deep, so this
/// covers maps of up to 65535 entries without allocating a path.
const PATH_INLINE_CAPACITY: usize = 32;

// =============================================================================
// Color and Side Definitions
// =============================================================================

/// The color of a Red-Black Tree node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
}

impl Color {
    const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Black => "black",
        }
    }
}

/// Which child of a node a path continues into.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Side {
    Left,
    Right,
}

impl Side {
    const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

// =============================================================================
// Node Definition
// =============================================================================

type Link<K, V> = Option<ReferenceCounter<Node<K, V>>>;

/// Internal node structure for the Red-Black Tree.
#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    color: Color,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    /// Creates a new red node with no children.
    const fn new_red(key: K, value: V) -> Self {
        Self {
            key,
            value,
            color: Color::Red,
            left: None,
            right: None,
        }
    }

    /// Checks if this node is red.
    fn is_red(&self) -> bool {
        self.color == Color::Red
    }

    fn child(&self, side: Side) -> Option<&ReferenceCounter<Self>> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    fn set_child(&mut self, side: Side, link: Link<K, V>) {
        match side {
            Side::Left => self.left = link,
            Side::Right => self.right = link,
        }
    }

    fn take_child(&mut self, side: Side) -> Link<K, V> {
        match side {
            Side::Left => self.left.take(),
            Side::Right => self.right.take(),
        }
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Creates a copy of this node with a new color.
    fn with_color(&self, color: Color) -> Self {
        Self {
            color,
            ..self.clone()
        }
    }
}

/// Helper function to check if an optional node is red.
fn is_red<K, V>(link: Option<&ReferenceCounter<Node<K, V>>>) -> bool {
    link.is_some_and(|node| node.is_red())
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
// Ancestor Chain
// =============================================================================

/// The borrowed root-to-parent path recorded while searching.
type Path<'a, K, V> = SmallVec<[(&'a ReferenceCounter<Node<K, V>>, Side); PATH_INLINE_CAPACITY]>;

/// A duplicated ancestor together with the side the path continues on.
///
/// The child slot at `side` still points into the old tree; it is replaced
/// when the chain is zipped back up.
struct Frame<K, V> {
    node: Node<K, V>,
    side: Side,
}

/// Owned ancestor frames, root first.
///
/// Frames hold whole nodes, so they live on the heap whatever the size of
/// `K` and `V`.
type Chain<K, V> = Vec<Frame<K, V>>;

/// Duplicates every node on `path`.
///
/// One spare slot is reserved for the frame a red-sibling rotation pushes
/// during delete.
fn rechain<K: Clone, V: Clone>(path: &[(&ReferenceCounter<Node<K, V>>, Side)]) -> Chain<K, V> {
    let mut chain = Vec::with_capacity(path.len() + 1);
    chain.extend(path.iter().map(|&(node, side)| Frame {
        node: (**node).clone(),
        side,
    }));
    chain
}

/// Hangs `subtree` back under the remaining frames and returns the new root,
/// colored black.
fn zip_to_root<K, V>(mut chain: Chain<K, V>, subtree: Node<K, V>) -> ReferenceCounter<Node<K, V>> {
    let mut current = subtree;
    while let Some(Frame { mut node, side }) = chain.pop() {
        node.set_child(side, Some(ReferenceCounter::new(current)));
        current = node;
    }
    current.color = Color::Black;
    ReferenceCounter::new(current)
}

// =============================================================================
// PersistentRedBlackMap Definition
// =============================================================================

/// A persistent (immutable) ordered map based on a Red-Black Tree.
///
/// `PersistentRedBlackMap` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns.
///
/// Keys must implement `Ord` for ordering. The map maintains entries in
/// sorted key order, enabling efficient range queries and ordered iteration.
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
/// use evertree::persistent::PersistentRedBlackMap;
///
/// let map = PersistentRedBlackMap::singleton(42, "answer");
/// assert_eq!(map.get(&42), Some(&"answer"));
///
/// let (empty, removed) = map.delete(&42);
/// assert!(removed);
/// assert!(empty.is_empty());
/// assert_eq!(map.len(), 1); // Original unchanged
/// ```
#[derive(Clone)]
pub struct PersistentRedBlackMap<K, V> {
    /// Root node of the tree
    root: Link<K, V>,
    /// Number of entries
    length: usize,
}

impl<K, V> PersistentRedBlackMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map: PersistentRedBlackMap<i32, String> = PersistentRedBlackMap::new();
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
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map = PersistentRedBlackMap::new().insert("hello".to_string(), 42);
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
    #[must_use]
    pub fn min(&self) -> Option<(&K, &V)> {
        node::leftmost(self.root.as_ref()).map(|node| (&node.key, &node.value))
    }

    /// Returns the entry with the maximum key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map = PersistentRedBlackMap::new()
    ///     .insert(3, "three")
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    ///
    /// assert_eq!(map.max(), Some((&3, &"three")));
    /// ```
    #[must_use]
    pub fn max(&self) -> Option<(&K, &V)> {
        node::rightmost(self.root.as_ref()).map(|node| (&node.key, &node.value))
    }

    /// Returns an iterator over entries in sorted key order.
    #[must_use]
    pub fn iter(&self) -> PersistentRedBlackMapIterator<'_, K, V> {
        PersistentRedBlackMapIterator {
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
    pub fn range<R, Q>(&self, range: R) -> PersistentRedBlackMapRangeIterator<'_, K, V>
    where
        R: RangeBounds<Q>,
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        PersistentRedBlackMapRangeIterator {
            traversal: RangeInOrder::new(
                self.root.as_ref(),
                range.start_bound(),
                range.end_bound(),
            ),
        }
    }

    /// Writes the tree structure as a graphviz digraph.
    ///
    /// Nodes are labelled with their key and outlined in their color.
    ///
    /// # Errors
    ///
    /// Returns any error produced by `writer`.
    pub fn write_dot<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: io::Write + ?Sized,
        K: fmt::Debug,
    {
        node::write_dot(self.root.as_ref(), writer, |node| {
            format!("label=\"{:?}\", color=\"{}\"", node.key, node.color.name())
        })
    }

    /// Returns the graphviz rendering of [`write_dot`](Self::write_dot) as a string.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map = PersistentRedBlackMap::singleton(7, ());
    /// assert!(map.to_dot().contains("color=\"black\""));
    /// ```
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

    /// Validates ordering, node colors, black-heights and the cached length.
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
        if is_red(self.root.as_ref()) {
            return Err(InvariantViolation::RedRoot);
        }
        Self::check_colors(self.root.as_ref(), 0, false).map(|_| ())
    }

    /// Returns the black-height of `link`, not counting empty subtrees.
    fn check_colors(
        link: Option<&ReferenceCounter<Node<K, V>>>,
        depth: usize,
        parent_is_red: bool,
    ) -> Result<usize, InvariantViolation> {
        let Some(node) = link else {
            return Ok(0);
        };
        if parent_is_red && node.is_red() {
            return Err(InvariantViolation::RedChildOfRed { depth });
        }
        let left = Self::check_colors(node.left.as_ref(), depth + 1, node.is_red())?;
        let right = Self::check_colors(node.right.as_ref(), depth + 1, node.is_red())?;
        if left != right {
            return Err(InvariantViolation::BlackHeightMismatch { depth, left, right });
        }
        Ok(left + usize::from(!node.is_red()))
    }
}

impl<K: Clone + Ord, V: Clone> PersistentRedBlackMap<K, V> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map = PersistentRedBlackMap::singleton(42, "answer");
    /// assert_eq!(map.len(), 1);
    /// assert_eq!(map.get(&42), Some(&"answer"));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains the key, the value is replaced.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map1 = PersistentRedBlackMap::new().insert(1, "one");
    /// let map2 = map1.insert(1, "ONE");
    ///
    /// assert_eq!(map1.get(&1), Some(&"one")); // Original unchanged
    /// assert_eq!(map2.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut path: Path<'_, K, V> = SmallVec::new();
        let mut cursor = self.root.as_ref();
        while let Some(node) = cursor {
            let side = match key.cmp(&node.key) {
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
                Ordering::Equal => {
                    let replaced = Node {
                        key,
                        value,
                        color: node.color,
                        left: node.left.clone(),
                        right: node.right.clone(),
                    };
                    return Self {
                        root: Some(zip_to_root(rechain(&path), replaced)),
                        length: self.length,
                    };
                }
            };
            path.push((node, side));
            cursor = node.child(side);
        }

        let root = Self::rebalance_after_insert(rechain(&path), Node::new_red(key, value));
        Self {
            root: Some(root),
            length: self.length + 1,
        }
    }

    /// Attaches the red node `node` below the last frame of `chain` and
    /// repairs any red-red violation on the way up.
    fn rebalance_after_insert(
        mut chain: Chain<K, V>,
        mut node: Node<K, V>,
    ) -> ReferenceCounter<Node<K, V>> {
        loop {
            let Some(Frame {
                node: mut parent,
                side,
            }) = chain.pop()
            else {
                log::trace!("red-black insert: case i1, node is the root");
                return zip_to_root(chain, node);
            };

            if !parent.is_red() {
                log::trace!("red-black insert: case i2, parent is black");
                parent.set_child(side, Some(ReferenceCounter::new(node)));
                return zip_to_root(chain, parent);
            }

            let Some(Frame {
                node: mut grandparent,
                side: parent_side,
            }) = chain.pop()
            else {
                log::trace!("red-black insert: case i3, parent is a red root");
                parent.set_child(side, Some(ReferenceCounter::new(node)));
                return zip_to_root(chain, parent);
            };

            let uncle_side = parent_side.opposite();
            if let Some(uncle) = grandparent.child(uncle_side).filter(|uncle| uncle.is_red()) {
                log::trace!("red-black insert: case i4, uncle is red");
                let uncle = uncle.with_color(Color::Black);
                grandparent.set_child(uncle_side, Some(ReferenceCounter::new(uncle)));
                parent.color = Color::Black;
                parent.set_child(side, Some(ReferenceCounter::new(node)));
                grandparent.set_child(parent_side, Some(ReferenceCounter::new(parent)));
                grandparent.color = Color::Red;
                node = grandparent;
                continue;
            }

            let mut top = if side == parent_side {
                parent.set_child(side, Some(ReferenceCounter::new(node)));
                parent
            } else {
                log::trace!("red-black insert: case i5, node is an inner grandchild");
                parent.set_child(side, node.take_child(parent_side));
                node.set_child(parent_side, Some(ReferenceCounter::new(parent)));
                node
            };

            log::trace!("red-black insert: case i6, rotating the grandparent");
            grandparent.set_child(parent_side, top.take_child(uncle_side));
            grandparent.color = Color::Red;
            top.color = Color::Black;
            top.set_child(uncle_side, Some(ReferenceCounter::new(grandparent)));
            return zip_to_root(chain, top);
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
    /// use evertree::persistent::PersistentRedBlackMap;
    ///
    /// let map = PersistentRedBlackMap::new()
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    /// let (removed, found) = map.delete(&1);
    ///
    /// assert!(found);
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get(&1), None);
    /// ```
    #[must_use]
    pub fn delete<Q>(&self, key: &Q) -> (Self, bool)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut path: Path<'_, K, V> = SmallVec::new();
        let mut cursor = self.root.as_ref();
        let target = loop {
            let Some(node) = cursor else {
                return (self.clone(), false);
            };
            let side = match key.cmp(node.key.borrow()) {
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
                Ordering::Equal => break node,
            };
            path.push((node, side));
            cursor = node.child(side);
        };

        // With two children, the in-order predecessor is unlinked instead and
        // its entry moves into the target's copy.
        let target_depth = path.len();
        let victim = match (&target.left, &target.right) {
            (Some(left), Some(_)) => {
                path.push((target, Side::Left));
                let mut node = left;
                while let Some(right) = &node.right {
                    path.push((node, Side::Right));
                    node = right;
                }
                node
            }
            _ => target,
        };

        let mut chain = rechain(&path);
        if !ReferenceCounter::ptr_eq(victim, target) {
            log::debug!("red-black delete: node has two children, promoting its predecessor");
            let frame = &mut chain[target_depth];
            frame.node.key = victim.key.clone();
            frame.node.value = victim.value.clone();
        }

        let map = Self {
            root: Self::unlink(chain, victim),
            length: self.length - 1,
        };
        (map, true)
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

    /// Unlinks `victim`, which has at most one child, from below the last
    /// frame of `chain`.
    fn unlink(mut chain: Chain<K, V>, victim: &ReferenceCounter<Node<K, V>>) -> Link<K, V> {
        if let Some(child) = victim.left.as_ref().or(victim.right.as_ref()) {
            // Only a black node can have a single child, and that child is red.
            log::trace!("red-black delete: splicing out a node with one child");
            return Some(zip_to_root(chain, child.with_color(Color::Black)));
        }

        let Some(Frame {
            node: mut parent,
            side,
        }) = chain.pop()
        else {
            return None;
        };
        parent.set_child(side, None);

        if victim.is_red() {
            log::trace!("red-black delete: removed a red leaf");
            return Some(zip_to_root(chain, parent));
        }
        Some(Self::rebalance_after_delete(chain, parent, side))
    }

    /// Resolves a double-black deficit on the `side` subtree of `parent`.
    fn rebalance_after_delete(
        mut chain: Chain<K, V>,
        mut parent: Node<K, V>,
        mut side: Side,
    ) -> ReferenceCounter<Node<K, V>> {
        loop {
            let sibling_side = side.opposite();
            let Some(sibling) = parent.child(sibling_side) else {
                unreachable!("red-black delete: a double-black subtree always has a sibling");
            };
            let mut sibling = (**sibling).clone();

            if sibling.is_red() {
                log::trace!("red-black delete: case d3, sibling is red");
                parent.set_child(sibling_side, sibling.take_child(side));
                parent.color = Color::Red;
                sibling.color = Color::Black;
                chain.push(Frame {
                    node: sibling,
                    side,
                });
                continue;
            }

            if let Some(far) = sibling.child(sibling_side).filter(|far| far.is_red()) {
                log::trace!("red-black delete: case d6, far nephew is red");
                let far = (**far).clone();
                let top = Self::rotate_into_deficit(parent, sibling, far, side);
                return zip_to_root(chain, top);
            }

            if let Some(near) = sibling.child(side).filter(|near| near.is_red()) {
                log::trace!("red-black delete: case d5, near nephew is red");
                let mut near = (**near).clone();
                sibling.set_child(side, near.take_child(sibling_side));
                let top = Self::rotate_into_deficit(parent, near, sibling, side);
                return zip_to_root(chain, top);
            }

            sibling.color = Color::Red;
            parent.set_child(sibling_side, Some(ReferenceCounter::new(sibling)));

            if parent.is_red() {
                log::trace!("red-black delete: case d4, parent is red");
                parent.color = Color::Black;
                return zip_to_root(chain, parent);
            }

            log::trace!("red-black delete: case d2, moving the deficit up");
            let Some(Frame {
                node: mut grandparent,
                side: parent_side,
            }) = chain.pop()
            else {
                log::trace!("red-black delete: case d1, deficit reached the root");
                return zip_to_root(chain, parent);
            };
            grandparent.set_child(parent_side, Some(ReferenceCounter::new(parent)));
            parent = grandparent;
            side = parent_side;
        }
    }

    /// Rotates `sibling` above `parent` toward the deficit side.
    ///
    /// `far` is the sibling's child on the side away from the deficit; it is
    /// colored black, restoring the missing black node on the deficit side.
    fn rotate_into_deficit(
        mut parent: Node<K, V>,
        mut sibling: Node<K, V>,
        mut far: Node<K, V>,
        side: Side,
    ) -> Node<K, V> {
        let sibling_side = side.opposite();
        parent.set_child(sibling_side, sibling.take_child(side));
        sibling.color = parent.color;
        parent.color = Color::Black;
        far.color = Color::Black;
        sibling.set_child(side, Some(ReferenceCounter::new(parent)));
        sibling.set_child(sibling_side, Some(ReferenceCounter::new(far)));
        sibling
    }
}

impl<K: Clone + Ord, V: Clone> OrderedMap<K, V> for PersistentRedBlackMap<K, V> {
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

/// An iterator over key-value pairs of a [`PersistentRedBlackMap`].
pub struct PersistentRedBlackMapIterator<'a, K, V> {
    traversal: InOrder<'a, Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for PersistentRedBlackMapIterator<'a, K, V> {
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

impl<K, V> ExactSizeIterator for PersistentRedBlackMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// A range iterator over key-value pairs of a [`PersistentRedBlackMap`].
pub struct PersistentRedBlackMapRangeIterator<'a, K, V> {
    traversal: RangeInOrder<'a, Node<K, V>>,
}

impl<'a, K, V> Iterator for PersistentRedBlackMapRangeIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.traversal
            .next()
            .map(|node| (&node.key, &node.value))
    }
}

/// An owning iterator over key-value pairs of a [`PersistentRedBlackMap`].
pub struct PersistentRedBlackMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for PersistentRedBlackMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for PersistentRedBlackMapIntoIterator<K, V> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for PersistentRedBlackMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Ord, V: Clone> FromIterator<(K, V)> for PersistentRedBlackMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Clone + Ord, V: Clone> Extend<(K, V)> for PersistentRedBlackMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            *self = self.insert(key, value);
        }
    }
}

impl<K: Clone, V: Clone> IntoIterator for PersistentRedBlackMap<K, V> {
    type Item = (K, V);
    type IntoIter = PersistentRedBlackMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentRedBlackMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentRedBlackMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentRedBlackMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for PersistentRedBlackMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for PersistentRedBlackMap<K, V> {}

/// Hashes the length, then each (key, value) pair in key order.
///
/// # Examples
///
/// ```rust
/// use evertree::persistent::PersistentRedBlackMap;
/// use std::collections::HashMap;
///
/// let mut outer: HashMap<PersistentRedBlackMap<i32, String>, &str> = HashMap::new();
/// let key = PersistentRedBlackMap::new()
///     .insert(1, "one".to_string())
///     .insert(2, "two".to_string());
/// outer.insert(key.clone(), "value");
/// assert_eq!(outer.get(&key), Some(&"value"));
/// ```
impl<K: Hash, V: Hash> Hash for PersistentRedBlackMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentRedBlackMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for PersistentRedBlackMap<K, V> {
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
static_assertions::assert_impl_all!(PersistentRedBlackMap<i32, String>: Send, Sync);

#[cfg(not(feature = "arc"))]
static_assertions::assert_not_impl_any!(PersistentRedBlackMap<i32, String>: Send, Sync);

// =============================================================================
// Rayon Support
// =============================================================================

#[cfg(feature = "rayon")]
impl<K: Sync, V: Sync> PersistentRedBlackMap<K, V> {
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
impl<K, V> serde::Serialize for PersistentRedBlackMap<K, V>
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
struct PersistentRedBlackMapVisitor<K, V> {
    marker: std::marker::PhantomData<(K, V)>,
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for PersistentRedBlackMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    type Value = PersistentRedBlackMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        // Sequential insert keeps memory growth gradual for large inputs.
        let mut map = PersistentRedBlackMap::new();
        while let Some((key, value)) = access.next_entry()? {
            map = map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for PersistentRedBlackMap<K, V>
where
    K: serde::Deserialize<'de> + Clone + Ord,
    V: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentRedBlackMapVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================


// =============================================================================
// Multithread Tests (arc feature only)
// =============================================================================

#[cfg(all(test, feature = "arc"))]
mod multithread_tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;

    #[rstest]
    fn test_red_black_map_referential_transparency() {
        let map = Arc::new(PersistentRedBlackMap::new().insert(1, "one").insert(2, "two"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let map_clone = Arc::clone(&map);
                thread::spawn(move || {
                    let (updated, removed) = map_clone.insert(3, "three").delete(&1);
                    assert!(removed);
                    assert_eq!(map_clone.len(), 2);
                    assert_eq!(map_clone.get(&1), Some(&"one"));
                    assert_eq!(updated.len(), 2);
                    assert_eq!(updated.get(&3), Some(&"three"));
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
        assert_eq!(map.len(), 2);
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_serialize_empty() {
        let map: PersistentRedBlackMap<String, i32> = PersistentRedBlackMap::new();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, "{}");
    }

    #[rstest]
    fn test_roundtrip_preserves_order() {
        let map: PersistentRedBlackMap<String, i32> = ["c", "a", "b"]
            .into_iter()
            .enumerate()
            .map(|(index, key)| (key.to_string(), i32::try_from(index).unwrap()))
            .collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"a":1,"b":2,"c":0}"#);

        let restored: PersistentRedBlackMap<String, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, map);
        assert_eq!(restored.check_invariants(), Ok(()));
    }
}
