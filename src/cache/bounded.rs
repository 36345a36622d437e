//! Insertion-ordered, optionally size-capped map.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use crate::{HuginnError, Result};

/// A size-capped key → value map with FIFO eviction.
///
/// Keys are kept in insertion order. When a *new* key is inserted into a
/// full cache, the oldest surviving key is evicted first. Overwriting an
/// existing key keeps its original position and never evicts.
///
/// Reads never refresh a key's position.
///
/// ```rust
/// # use huginn::BoundedCache;
/// let mut cache = BoundedCache::bounded(2).unwrap();
/// cache.set("a", 1).set("b", 2).set("a", 10).set("c", 3);
/// assert!(cache.get(&"a").is_none());
/// assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["b", "c"]);
/// ```
#[derive(Clone)]
pub struct BoundedCache<K, V> {
    capacity: Option<usize>,
    entries: HashMap<K, (u64, V)>,
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache with an optional capacity.
    ///
    /// `None` is unbounded. A capacity of 0 or 1 is rejected: a cache must
    /// hold at least two entries to be useful.
    pub fn new(capacity: Option<usize>) -> Result<Self> {
        validate_capacity(capacity)?;
        Ok(Self {
            capacity,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        })
    }

    /// Create a cache holding at most `capacity` entries.
    pub fn bounded(capacity: usize) -> Result<Self> {
        Self::new(Some(capacity))
    }

    /// Create a cache with no size limit.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Current capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Change the capacity.
    ///
    /// Existing entries are never evicted by this call, even if the cache now
    /// holds more than `capacity`. The bound is enforced on the next insert of
    /// a new key.
    pub fn set_capacity(&mut self, capacity: Option<usize>) -> Result<&mut Self> {
        validate_capacity(capacity)?;
        self.capacity = capacity;
        Ok(self)
    }

    /// Look up a value. Never changes eviction order.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite a value.
    ///
    /// A new key evicts the oldest keys until there is room for it. After a
    /// [`set_capacity`](Self::set_capacity) shrink, that can be several keys
    /// in one call.
    pub fn set(&mut self, key: K, value: V) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.1 = value;
            return self;
        }

        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                let Some((_, oldest)) = self.order.pop_first() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, (seq, value));
        self
    }

    /// Remove a key, returning whether it was present.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (seq, value) = self.entries.remove(key)?;
        self.order.remove(&seq);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order
            .values()
            .filter_map(|k| self.entries.get(k).map(|(_, v)| (k, v)))
    }
}

impl<K, V> Default for BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<K, V> fmt::Debug for BoundedCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut cache = Self::unbounded();
        for (k, v) in iter {
            cache.set(k, v);
        }
        cache
    }
}

fn validate_capacity(capacity: Option<usize>) -> Result<()> {
    match capacity {
        Some(n) if n <= 1 => Err(HuginnError::Configuration(format!(
            "cache capacity must be unbounded or at least 2, got {n}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tiny_capacity() {
        assert!(BoundedCache::<u32, u32>::bounded(0).is_err());
        assert!(BoundedCache::<u32, u32>::bounded(1).is_err());
        assert!(BoundedCache::<u32, u32>::bounded(2).is_ok());
        assert!(BoundedCache::<u32, u32>::new(None).is_ok());
    }

    #[test]
    fn evicts_oldest_insertion() {
        let mut cache = BoundedCache::bounded(3).unwrap();
        for k in 1..=4 {
            cache.set(k, k * 10);
        }
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut cache = BoundedCache::bounded(3).unwrap();
        cache.set(1, "a").set(2, "b").set(3, "c");
        cache.set(1, "a2");
        cache.set(4, "d");

        assert!(cache.get(&1).is_none(), "overwrite must not refresh order");
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.get(&4), Some(&"d"));
    }

    #[test]
    fn overwrite_at_capacity_does_not_evict() {
        let mut cache = BoundedCache::bounded(2).unwrap();
        cache.set(1, 1).set(2, 2).set(2, 22);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some(&1));
        assert_eq!(cache.get(&2), Some(&22));
    }

    #[test]
    fn delete_frees_a_slot() {
        let mut cache = BoundedCache::bounded(2).unwrap();
        cache.set(1, ()).set(2, ());
        assert!(cache.delete(&1));
        assert!(!cache.delete(&1));
        cache.set(3, ());
        assert!(cache.contains_key(&2));
        assert!(cache.contains_key(&3));
    }

    #[test]
    fn shrinking_capacity_is_not_retroactive() {
        let mut cache = BoundedCache::unbounded();
        for k in 0..5 {
            cache.set(k, k);
        }
        cache.set_capacity(Some(2)).unwrap();
        assert_eq!(cache.len(), 5);

        cache.set(5, 5);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn set_capacity_validates() {
        let mut cache = BoundedCache::<u8, u8>::unbounded();
        assert!(cache.set_capacity(Some(1)).is_err());
        assert_eq!(cache.capacity(), None);
    }

    #[test]
    fn iter_follows_insertion_order() {
        let cache: BoundedCache<&str, u8> = [("z", 1), ("a", 2), ("m", 3)].into_iter().collect();
        let keys: Vec<_> = cache.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
