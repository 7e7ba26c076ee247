//! Capacity-bounded LRU cache
//!
//! The recency list and key map live in an [`lru::LruCache`], which keeps a
//! hash map pointing straight at the nodes of an intrusive doubly-linked list,
//! so `get`, `set` and `delete` are O(1). Every public method takes the
//! instance mutex exactly once.

use crate::shrink::{CacheGroup, Shrinkable};
use crate::stats::{CacheSnapshot, CacheStats};
use crate::CacheConfig;
use ahash::RandomState;
use cache_core::{CacheError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Thread-safe fixed-capacity cache with least-recently-used eviction
pub struct BoundedCache<K, V> {
    /// Name used in snapshots and logs
    name: String,
    /// The underlying LRU structure
    cache: Mutex<LruCache<K, V, RandomState>>,
    /// Immutable capacity
    capacity: NonZeroUsize,
    /// Cache statistics
    stats: Arc<CacheStats>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create an unnamed cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        Self::named("cache", capacity)
    }

    /// Create a named cache holding at most `capacity` entries
    pub fn named(name: impl Into<String>, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity(capacity))?;
        Ok(Self {
            name: name.into(),
            cache: Mutex::new(LruCache::with_hasher(capacity, RandomState::new())),
            capacity,
            stats: Arc::new(CacheStats::new()),
        })
    }

    /// Create a named cache from a configuration
    pub fn with_config(name: impl Into<String>, config: &CacheConfig) -> Result<Self> {
        Self::named(name, config.max_entries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a value, promoting its entry to most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.cache.lock().get(key).cloned();
        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    /// Get a value unless `is_stale` says it is dead, in which case the entry
    /// is removed and counted as an expiration. Check and removal happen under
    /// one lock acquisition.
    pub fn get_unless<Q, F>(&self, key: &Q, is_stale: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> bool,
    {
        let mut cache = self.cache.lock();

        let stale = cache.peek(key).map(is_stale);
        match stale {
            None => {
                drop(cache);
                self.stats.record_miss();
                None
            }
            Some(true) => {
                cache.pop(key);
                drop(cache);
                self.stats.record_expirations(1);
                self.stats.record_miss();
                None
            }
            Some(false) => {
                let value = cache.get(key).cloned();
                drop(cache);
                self.stats.record_hit();
                value
            }
        }
    }

    /// Get a value without touching its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.lock().peek(key).cloned()
    }

    /// Check for a key without touching its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.lock().contains(key)
    }

    /// Insert or overwrite a value and make it most recently used.
    ///
    /// Inserting a new key into a full cache evicts the least recently used
    /// entry first; that entry is returned.
    pub fn set(&self, key: K, value: V) -> Option<(K, V)> {
        let mut cache = self.cache.lock();

        if cache.contains(&key) {
            cache.put(key, value);
            return None;
        }

        let evicted = if cache.len() >= self.capacity.get() {
            cache.pop_lru()
        } else {
            None
        };
        cache.put(key, value);
        drop(cache);

        self.stats.record_insert();
        if evicted.is_some() {
            self.stats.record_evictions(1);
        }
        evicted
    }

    /// Remove an entry. Returns whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.lock().pop(key).is_some()
    }

    /// Remove every entry matching `predicate`. Returns the number removed.
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut cache = self.cache.lock();
        let doomed: Vec<K> = cache
            .iter()
            .filter(|(key, value)| predicate(*key, *value))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            cache.pop(key);
        }
        doomed.len()
    }

    /// Evict the least recently used entry
    pub fn evict_lru(&self) -> Option<(K, V)> {
        let evicted = self.cache.lock().pop_lru();
        if evicted.is_some() {
            self.stats.record_evictions(1);
        }
        evicted
    }

    /// Evict from the tail until at most `target` entries remain.
    /// Returns the number of evicted entries.
    pub fn shrink_to(&self, target: usize) -> usize {
        let mut cache = self.cache.lock();
        let mut evicted = 0;
        while cache.len() > target {
            if cache.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        drop(cache);

        if evicted > 0 {
            self.stats.record_evictions(evicted as u64);
        }
        evicted
    }

    /// Current number of entries
    pub fn size(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Keys ordered from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        self.cache.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    /// Remove every entry; capacity is unchanged
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Point-in-time view of this cache
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::new(&self.name, self.size(), self.capacity(), &self.stats)
    }
}

impl<K, V> Shrinkable for BoundedCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn cache_name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.size()
    }

    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    fn shrink_to(&self, target: usize) -> usize {
        BoundedCache::shrink_to(self, target)
    }
}

impl<K, V> CacheGroup for BoundedCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn snapshots(&self) -> Vec<CacheSnapshot> {
        vec![self.snapshot()]
    }

    fn clear_all(&self) {
        self.clear();
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("current_entries", &self.cache.lock().len())
            .finish()
    }
}
