//! Fx-hashed map and set aliases.
//!
//! Node ids are absolute path strings, which `FxHash` handles noticeably
//! faster than the default SipHash. None of these maps are keyed by
//! untrusted input, so DoS resistance is not a concern.
//!
//! ```
//! use st_core::{FxHashMap, fx_hash_map_with_capacity};
//!
//! let mut colors: FxHashMap<String, String> = fx_hash_map_with_capacity(4);
//! colors.insert("ts".to_owned(), "#3178c6".to_owned());
//! assert_eq!(colors.get("ts").map(String::as_str), Some("#3178c6"));
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

pub use rustc_hash::FxBuildHasher;

/// Creates an empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates an empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}

/// Creates an [`FxHashMap`] able to hold `capacity` entries without
/// reallocating.
#[inline]
#[must_use]
pub fn fx_hash_map_with_capacity<K, V>(capacity: usize) -> FxHashMap<K, V> {
    FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Creates an [`FxHashSet`] able to hold `capacity` entries without
/// reallocating.
#[inline]
#[must_use]
pub fn fx_hash_set_with_capacity<V>(capacity: usize) -> FxHashSet<V> {
    FxHashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
}
