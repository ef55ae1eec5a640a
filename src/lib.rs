//! # evertree
//!
//! Persistent (immutable) ordered maps for Rust, built on self-balancing
//! binary search trees with structural sharing.
//!
//! ## Overview
//!
//! Every update returns a new map and leaves the old one intact. Two
//! balancing disciplines are provided behind one contract:
//!
//! - **AVL**: [`persistent::PersistentAvlMap`], strict height balance
//! - **Red-Black**: [`persistent::PersistentRedBlackMap`], color balance
//! - **Contract**: [`persistent::OrderedMap`], implemented by both
//!
//! ## Feature Flags
//!
//! - `avl`: the AVL map (default)
//! - `rbtree`: the Red-Black map (default)
//! - `arc`: share nodes through `Arc` so maps are `Send + Sync`
//! - `rayon`: parallel iteration over entries (implies `arc`)
//! - `serde`: serialization as a map
//! - `full`: `avl`, `rbtree` and `serde`
//!
//! ## Example
//!
//! ```rust
//! use evertree::prelude::*;
//!
//! let empty: PersistentRedBlackMap<u64, &str> = PersistentRedBlackMap::new();
//! let map = empty.insert(2, "two").insert(1, "one");
//!
//! assert_eq!(map.size(), 2);
//! assert_eq!(empty.size(), 0);
//! assert_eq!(map.iter().next(), Some((&1, &"one")));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports the maps, their iterators and the
/// [`OrderedMap`](crate::persistent::OrderedMap) trait.
///
/// # Usage
///
/// ```rust
/// use evertree::prelude::*;
/// ```
pub mod prelude {
    pub use crate::persistent::*;
}

pub mod persistent;
