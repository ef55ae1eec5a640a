//! Read-only traversal shared by the tree maps.
//!
//! Both balancing families store their entries in binary nodes linked by
//! [`ReferenceCounter`] pointers. Everything that only *reads* a tree
//! (lookup, ordered iteration, range seeks, graphviz export, order
//! validation) is written once here against [`BinaryNode`], so the AVL and
//! Red-Black modules only carry their own balancing code.

use super::ReferenceCounter;
use super::invariant::InvariantViolation;
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::io;
use std::ops::Bound;

/// Number of stack slots kept inline before a traversal spills to the heap.
///
/// Both tree families stay within this depth up to about 2^24 entries.
const STACK_INLINE_CAPACITY: usize = 48;

/// A node of a persistent binary search tree.
pub(crate) trait BinaryNode: Sized {
    type Key;

    fn key(&self) -> &Self::Key;
    fn left(&self) -> Option<&ReferenceCounter<Self>>;
    fn right(&self) -> Option<&ReferenceCounter<Self>>;
}

/// Finds the node holding `key`.
pub(crate) fn find<'a, N, Q>(root: Option<&'a ReferenceCounter<N>>, key: &Q) -> Option<&'a N>
where
    N: BinaryNode,
    N::Key: Borrow<Q>,
    Q: Ord + ?Sized,
{
    let mut cursor = root;
    while let Some(node) = cursor {
        cursor = match key.cmp(node.key().borrow()) {
            Ordering::Less => node.left(),
            Ordering::Greater => node.right(),
            Ordering::Equal => return Some(&**node),
        };
    }
    None
}

/// Returns the node with the smallest key.
pub(crate) fn leftmost<N: BinaryNode>(root: Option<&ReferenceCounter<N>>) -> Option<&N> {
    let mut node = root?;
    while let Some(left) = node.left() {
        node = left;
    }
    Some(&**node)
}

/// Returns the node with the largest key.
pub(crate) fn rightmost<N: BinaryNode>(root: Option<&ReferenceCounter<N>>) -> Option<&N> {
    let mut node = root?;
    while let Some(right) = node.right() {
        node = right;
    }
    Some(&**node)
}

// =============================================================================
// In-order Traversal
// =============================================================================

/// Lazy in-order traversal driven by an explicit stack of pending ancestors.
pub(crate) struct InOrder<'a, N> {
    stack: SmallVec<[&'a N; STACK_INLINE_CAPACITY]>,
}

impl<'a, N: BinaryNode> InOrder<'a, N> {
    /// Starts a traversal at the smallest key of `root`.
    pub(crate) fn new(root: Option<&'a ReferenceCounter<N>>) -> Self {
        let mut traversal = Self {
            stack: SmallVec::new(),
        };
        traversal.descend_left(root);
        traversal
    }

    /// Starts a traversal at the first key satisfying the lower bound `start`.
    pub(crate) fn seek<Q>(root: Option<&'a ReferenceCounter<N>>, start: Bound<&Q>) -> Self
    where
        N::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut stack = SmallVec::new();
        let mut cursor = root;
        while let Some(node) = cursor {
            let key: &Q = node.key().borrow();
            let at_or_after_start = match start {
                Bound::Included(bound) => key >= bound,
                Bound::Excluded(bound) => key > bound,
                Bound::Unbounded => true,
            };
            if at_or_after_start {
                stack.push(&**node);
                cursor = node.left();
            } else {
                cursor = node.right();
            }
        }
        Self { stack }
    }

    fn descend_left(&mut self, mut link: Option<&'a ReferenceCounter<N>>) {
        while let Some(node) = link {
            self.stack.push(&**node);
            link = node.left();
        }
    }

    fn peek(&self) -> Option<&'a N> {
        self.stack.last().copied()
    }
}

impl<'a, N: BinaryNode> Iterator for InOrder<'a, N> {
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.descend_left(node.right());
        Some(node)
    }
}

/// In-order traversal restricted to a key range.
///
/// The range is resolved to its first and last node up front, so the
/// iterator holds no reference to the caller's bounds.
pub(crate) struct RangeInOrder<'a, N> {
    traversal: InOrder<'a, N>,
    last: Option<&'a N>,
}

impl<'a, N: BinaryNode> RangeInOrder<'a, N> {
    pub(crate) fn new<Q>(
        root: Option<&'a ReferenceCounter<N>>,
        start: Bound<&Q>,
        end: Bound<&Q>,
    ) -> Self
    where
        N::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let traversal = InOrder::seek(root, start);
        let last = match (traversal.peek(), last_within(root, end)) {
            (Some(first), Some(last))
                if Borrow::<Q>::borrow(first.key()) <= Borrow::<Q>::borrow(last.key()) =>
            {
                Some(last)
            }
            _ => None,
        };
        Self { traversal, last }
    }
}

impl<'a, N: BinaryNode> Iterator for RangeInOrder<'a, N> {
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        let last = self.last?;
        let node = self.traversal.next()?;
        if std::ptr::eq(node, last) {
            self.last = None;
        }
        Some(node)
    }
}

/// Returns the node with the largest key satisfying the upper bound `end`.
fn last_within<'a, N, Q>(root: Option<&'a ReferenceCounter<N>>, end: Bound<&Q>) -> Option<&'a N>
where
    N: BinaryNode,
    N::Key: Borrow<Q>,
    Q: Ord + ?Sized,
{
    let mut candidate = None;
    let mut cursor = root;
    while let Some(node) = cursor {
        let key: &Q = node.key().borrow();
        let at_or_before_end = match end {
            Bound::Included(bound) => key <= bound,
            Bound::Excluded(bound) => key < bound,
            Bound::Unbounded => true,
        };
        if at_or_before_end {
            candidate = Some(&**node);
            cursor = node.right();
        } else {
            cursor = node.left();
        }
    }
    candidate
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Checks that keys strictly increase in order and returns the node count.
pub(crate) fn check_order<N>(
    root: Option<&ReferenceCounter<N>>,
) -> Result<usize, InvariantViolation>
where
    N: BinaryNode,
    N::Key: Ord,
{
    let mut count = 0;
    let mut previous: Option<&N::Key> = None;
    for node in InOrder::new(root) {
        if previous.is_some_and(|previous| previous >= node.key()) {
            return Err(InvariantViolation::OutOfOrder { position: count });
        }
        previous = Some(node.key());
        count += 1;
    }
    Ok(count)
}

/// Writes `root` as a graphviz digraph.
///
/// Nodes are numbered in pre-order; `describe` renders the attribute list
/// of each node. Edges are labelled `L` and `R`.
pub(crate) fn write_dot<N, W, F>(
    root: Option<&ReferenceCounter<N>>,
    writer: &mut W,
    describe: F,
) -> io::Result<()>
where
    N: BinaryNode,
    W: io::Write + ?Sized,
    F: Fn(&N) -> String,
{
    writeln!(writer, "digraph tree {{")?;
    if let Some(root) = root {
        let mut next_id = 0;
        write_dot_subtree(&**root, writer, &describe, &mut next_id)?;
    }
    writeln!(writer, "}}")
}

fn write_dot_subtree<N, W, F>(
    node: &N,
    writer: &mut W,
    describe: &F,
    next_id: &mut usize,
) -> io::Result<usize>
where
    N: BinaryNode,
    W: io::Write + ?Sized,
    F: Fn(&N) -> String,
{
    let id = *next_id;
    *next_id += 1;
    writeln!(writer, "\tn{id} [{}];", describe(node))?;
    for (child, label) in [(node.left(), "L"), (node.right(), "R")] {
        if let Some(child) = child {
            let child_id = write_dot_subtree(&**child, writer, describe, next_id)?;
            writeln!(writer, "\tn{id} -> n{child_id} [label=\"{label}\"];")?;
        }
    }
    Ok(id)
}
