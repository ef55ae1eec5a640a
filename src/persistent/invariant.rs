//! Structural validation errors for the tree maps.
//!
//! These are returned by `check_invariants` on each map. A valid map never
//! produces one; they exist for tests, fuzzing and debugging tree shapes.

use std::fmt;

/// A broken structural invariant found while validating a tree map.
///
/// `depth` counts edges from the root (the root itself is at depth 0).
///
/// # Examples
///
/// ```rust
/// use evertree::persistent::InvariantViolation;
///
/// let violation = InvariantViolation::BlackHeightMismatch {
///     depth: 2,
///     left: 3,
///     right: 2,
/// };
/// assert_eq!(
///     format!("{violation}"),
///     "black-height mismatch at depth 2: left subtree 3, right subtree 2"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// In-order traversal found a key not greater than the key before it.
    OutOfOrder {
        /// Zero-based in-order position of the offending key.
        position: usize,
    },
    /// The cached entry count disagrees with the number of reachable nodes.
    LengthMismatch {
        /// The count stored in the map.
        recorded: usize,
        /// The number of nodes actually reachable from the root.
        counted: usize,
    },
    /// An AVL node stores a height other than the one its children imply.
    HeightMismatch {
        /// Depth of the node.
        depth: usize,
        /// Height stored in the node.
        stored: i8,
        /// Height recomputed from the children.
        computed: i8,
    },
    /// An AVL node's balance factor is outside `-1..=1`.
    Unbalanced {
        /// Depth of the node.
        depth: usize,
        /// `height(right) - height(left)`.
        balance_factor: i8,
    },
    /// The root of a Red-Black tree is Red.
    RedRoot,
    /// A Red node has a Red child.
    RedChildOfRed {
        /// Depth of the child.
        depth: usize,
    },
    /// The two subtrees of a Red-Black node have different black-heights.
    BlackHeightMismatch {
        /// Depth of the node.
        depth: usize,
        /// Black-height of the left subtree.
        left: usize,
        /// Black-height of the right subtree.
        right: usize,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder { position } => {
                write!(formatter, "key at in-order position {position} is out of order")
            }
            Self::LengthMismatch { recorded, counted } => write!(
                formatter,
                "map records {recorded} entries but {counted} nodes are reachable"
            ),
            Self::HeightMismatch {
                depth,
                stored,
                computed,
            } => write!(
                formatter,
                "height mismatch at depth {depth}: stored {stored}, computed {computed}"
            ),
            Self::Unbalanced {
                depth,
                balance_factor,
            } => write!(
                formatter,
                "balance factor {balance_factor} at depth {depth}"
            ),
            Self::RedRoot => write!(formatter, "root is red"),
            Self::RedChildOfRed { depth } => {
                write!(formatter, "red node at depth {depth} has a red parent")
            }
            Self::BlackHeightMismatch { depth, left, right } => write!(
                formatter,
                "black-height mismatch at depth {depth}: left subtree {left}, right subtree {right}"
            ),
        }
    }
}

impl std::error::Error for InvariantViolation {}
