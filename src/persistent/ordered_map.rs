//! The contract shared by the persistent ordered maps.
//!
//! [`PersistentAvlMap`](super::PersistentAvlMap) and
//! [`PersistentRedBlackMap`](super::PersistentRedBlackMap) share no internal
//! representation, but both satisfy [`OrderedMap`], so code that only needs
//! "a persistent ordered map" can be written once.

/// A persistent ordered map.
///
/// Every method takes `&self`. Operations that change the contents return a
/// new map and leave `self` untouched; the two versions share all nodes off
/// the modified path.
///
/// # Laws
///
/// - `m.insert(k, v).get(&k) == Some(&v)`
/// - `m.insert(k, v).size() == m.size() + u64::from(!m.contains_key(&k))`
/// - `m.delete(&k).0.size() == m.size() - u64::from(m.contains_key(&k))`
/// - `m.delete(&k).1 == m.contains_key(&k)`
/// - neither `insert` nor `delete` changes what `m` itself reports
///
/// # Examples
///
/// ```rust
/// use evertree::persistent::{OrderedMap, PersistentAvlMap, PersistentRedBlackMap};
///
/// fn squares<M: OrderedMap<u32, u32>>(count: u32) -> M {
///     (0..count).fold(M::empty(), |map, key| map.insert(key, key * key))
/// }
///
/// let avl: PersistentAvlMap<u32, u32> = squares(10);
/// let red_black: PersistentRedBlackMap<u32, u32> = squares(10);
/// assert_eq!(OrderedMap::get(&avl, &7), Some(&49));
/// assert_eq!(OrderedMap::size(&red_black), 10);
/// ```
pub trait OrderedMap<K, V>: Sized {
    /// Returns the empty map.
    fn empty() -> Self;

    /// Returns the number of entries.
    fn size(&self) -> u64;

    /// Returns the value stored under `key`.
    fn get(&self, key: &K) -> Option<&V>;

    /// Returns a map with `key` bound to `value`, replacing any previous value.
    #[must_use]
    fn insert(&self, key: K, value: V) -> Self;

    /// Returns a map without `key`, and whether `key` was present.
    ///
    /// When `key` is absent the returned map is `self` unchanged.
    #[must_use]
    fn delete(&self, key: &K) -> (Self, bool);

    /// Returns `true` if `key` is present.
    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if the map has no entries.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Like [`delete`](Self::delete), discarding the flag.
    #[must_use]
    fn remove(&self, key: &K) -> Self {
        self.delete(key).0
    }
}
