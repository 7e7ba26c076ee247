//! Indexed record store
//!
//! Records are kept in insertion order with a primary-key index mapping
//! each key to its position. The index gives O(1) lookups by key; it is
//! derived state and can be rebuilt from the records at any time.
//!
//! Text searches and tag filters are cached in two bounded caches. Every
//! mutation clears both caches before releasing the write lock, so a
//! cached result never outlives the data it was computed from.

use crate::record::{normalize_query, Record};
use ahash::AHashMap;
use cache_core::{CacheError, Result};
use cache_lru::{BoundedCache, CacheGroup, CacheSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Cached query results
type QueryCache<R> = BoundedCache<String, Arc<Vec<R>>>;

#[derive(Debug)]
struct StoreInner<R> {
    records: Vec<R>,
    /// key -> position in `records`
    index: AHashMap<String, usize>,
}

impl<R: Record> StoreInner<R> {
    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.key().to_string(), pos))
            .collect();
    }
}

/// Ordered record collection with a primary-key index and cached queries
pub struct IndexedStore<R: Record> {
    name: String,
    inner: RwLock<StoreInner<R>>,
    search_cache: QueryCache<R>,
    tag_cache: QueryCache<R>,
}

impl<R: Record> IndexedStore<R> {
    /// Create an empty store whose query caches hold `query_cache_capacity`
    /// results each
    pub fn new(name: impl Into<String>, query_cache_capacity: usize) -> Result<Self> {
        let name = name.into();
        Ok(Self {
            search_cache: BoundedCache::named(format!("{}.search", name), query_cache_capacity)?,
            tag_cache: BoundedCache::named(format!("{}.tags", name), query_cache_capacity)?,
            inner: RwLock::new(StoreInner {
                records: Vec::new(),
                index: AHashMap::new(),
            }),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a record. Fails if its key is already present.
    pub fn add(&self, record: R) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(record.key()) {
            return Err(CacheError::DuplicateKey(record.key().to_string()));
        }

        let pos = inner.records.len();
        inner.index.insert(record.key().to_string(), pos);
        inner.records.push(record);
        self.invalidate_queries();
        Ok(())
    }

    /// Replace the record stored under `key`.
    ///
    /// The replacement may carry a different key as long as that key is not
    /// taken by another record. Its position is unchanged.
    pub fn update(&self, key: &str, record: R) -> Result<()> {
        let mut inner = self.inner.write();
        let pos = inner
            .position(key)
            .ok_or_else(|| CacheError::RecordNotFound(key.to_string()))?;

        if record.key() != key {
            if inner.index.contains_key(record.key()) {
                return Err(CacheError::DuplicateKey(record.key().to_string()));
            }
            inner.index.remove(key);
            inner.index.insert(record.key().to_string(), pos);
        }
        inner.records[pos] = record;
        self.invalidate_queries();
        Ok(())
    }

    /// Remove and return the record stored under `key`.
    ///
    /// Records after it shift down by one and their index entries are
    /// renumbered.
    pub fn delete(&self, key: &str) -> Option<R> {
        let mut inner = self.inner.write();
        let pos = inner.index.remove(key)?;
        let removed = inner.records.remove(pos);
        for slot in inner.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        self.invalidate_queries();
        Some(removed)
    }

    pub fn get(&self, key: &str) -> Option<R> {
        let inner = self.inner.read();
        inner.position(key).map(|pos| inner.records[pos].clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().index.contains_key(key)
    }

    /// Records whose text fields contain `query`, case-insensitively, in
    /// store order. A blank query matches nothing and is not cached.
    pub fn search(&self, query: &str) -> Arc<Vec<R>> {
        let needle = normalize_query(query);
        if needle.is_empty() {
            return Arc::new(Vec::new());
        }
        self.cached_query(&self.search_cache, needle, |record, needle| {
            record.matches_text(needle)
        })
    }

    /// Records carrying `tag`, case-insensitively, in store order
    pub fn filter_by_tag(&self, tag: &str) -> Arc<Vec<R>> {
        let tag = normalize_query(tag);
        if tag.is_empty() {
            return Arc::new(Vec::new());
        }
        self.cached_query(&self.tag_cache, tag, |record, tag| record.has_tag(tag))
    }

    fn cached_query<F>(&self, cache: &QueryCache<R>, key: String, matches: F) -> Arc<Vec<R>>
    where
        F: Fn(&R, &str) -> bool,
    {
        // Held across compute and fill so a writer cannot slip in between
        let inner = self.inner.read();
        if let Some(hit) = cache.get(&key) {
            return hit;
        }

        let results: Arc<Vec<R>> = Arc::new(
            inner
                .records
                .iter()
                .filter(|record| matches(*record, &key))
                .cloned()
                .collect(),
        );
        cache.set(key, Arc::clone(&results));
        results
    }

    /// All records in store order
    pub fn all(&self) -> Vec<R> {
        self.inner.read().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with `records`. On a duplicate key nothing
    /// changes.
    pub fn load(&self, records: Vec<R>) -> Result<()> {
        let mut index = AHashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.key().to_string(), pos).is_some() {
                return Err(CacheError::DuplicateKey(record.key().to_string()));
            }
        }

        let mut inner = self.inner.write();
        inner.records = records;
        inner.index = index;
        self.invalidate_queries();
        debug!("Loaded {} records into '{}'", inner.records.len(), self.name);
        Ok(())
    }

    /// Remove every record
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.records.clear();
        inner.index.clear();
        self.invalidate_queries();
    }

    /// Recompute the primary-key index from the records
    pub fn rebuild_index(&self) {
        let mut inner = self.inner.write();
        inner.rebuild_index();
        debug!("Rebuilt index for '{}' ({} keys)", self.name, inner.index.len());
    }

    pub fn search_cache(&self) -> &BoundedCache<String, Arc<Vec<R>>> {
        &self.search_cache
    }

    pub fn tag_cache(&self) -> &BoundedCache<String, Arc<Vec<R>>> {
        &self.tag_cache
    }

    fn invalidate_queries(&self) {
        self.search_cache.clear();
        self.tag_cache.clear();
    }
}

impl<R: Record> CacheGroup for IndexedStore<R> {
    fn snapshots(&self) -> Vec<CacheSnapshot> {
        vec![self.search_cache.snapshot(), self.tag_cache.snapshot()]
    }

    /// Clears the query caches. Records are the source of truth and stay.
    fn clear_all(&self) {
        self.invalidate_queries();
    }
}

impl<R: Record> std::fmt::Debug for IndexedStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedStore")
            .field("name", &self.name)
            .field("records", &self.len())
            .field("cached_searches", &self.search_cache.size())
            .field("cached_tags", &self.tag_cache.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Bookmark;

    fn create_test_store() -> IndexedStore<Bookmark> {
        let store = IndexedStore::new("bookmarks", 50).unwrap();
        store
            .add(Bookmark::new("1", "Rust Book", "https://doc.rust-lang.org/book").with_tags(["rust"]))
            .unwrap();
        store
            .add(Bookmark::new("2", "Tokio Tutorial", "https://tokio.rs").with_tags(["rust", "async"]))
            .unwrap();
        store
            .add(Bookmark::new("3", "Go Tour", "https://go.dev/tour").with_tags(["go"]))
            .unwrap();
        store
    }

    #[test]
    fn test_add_and_get() {
        let store = create_test_store();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("2").unwrap().title, "Tokio Tutorial");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let store = create_test_store();
        let result = store.add(Bookmark::new("1", "Again", "https://example.com"));
        assert!(matches!(result, Err(CacheError::DuplicateKey(key)) if key == "1"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_search_is_cached() {
        let store = create_test_store();

        let first = store.search("RUST");
        assert_eq!(first.len(), 1);
        assert_eq!(store.search_cache().size(), 1);

        let second = store.search("  rust ");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.search_cache().stats().hits(), 1);
    }

    #[test]
    fn test_update_invalidates_cached_search() {
        let store = create_test_store();
        let results = store.search("tokio");
        assert_eq!(results.len(), 1);
        assert_eq!(store.search_cache().size(), 1);

        store
            .update("2", Bookmark::new("2", "Async Runtime", "https://tokio.rs"))
            .unwrap();
        assert_eq!(store.search_cache().size(), 0);
        assert_eq!(store.tag_cache().size(), 0);

        let rerun = store.search("tokio");
        assert_eq!(rerun[0].title, "Async Runtime");
        assert_eq!(store.search_cache().stats().misses(), 2);
    }

    #[test]
    fn test_update_missing_and_rekey() {
        let store = create_test_store();
        let result = store.update("9", Bookmark::new("9", "x", "y"));
        assert!(matches!(result, Err(CacheError::RecordNotFound(_))));

        let result = store.update("1", Bookmark::new("2", "clash", "y"));
        assert!(matches!(result, Err(CacheError::DuplicateKey(_))));

        store.update("1", Bookmark::new("10", "Rust Book", "y")).unwrap();
        assert!(store.get("1").is_none());
        assert_eq!(store.get("10").unwrap().title, "Rust Book");
        assert_eq!(store.all()[0].id, "10");
    }

    #[test]
    fn test_delete_renumbers_positions() {
        let store = create_test_store();
        let removed = store.delete("1").unwrap();
        assert_eq!(removed.id, "1");
        assert!(store.delete("1").is_none());

        assert_eq!(store.get("2").unwrap().id, "2");
        assert_eq!(store.get("3").unwrap().id, "3");
        let ids: Vec<String> = store.all().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn test_filter_by_tag() {
        let store = create_test_store();
        let rust = store.filter_by_tag("Rust");
        let ids: Vec<&str> = rust.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        store.delete("1");
        assert_eq!(store.tag_cache().size(), 0);
        assert_eq!(store.filter_by_tag("rust").len(), 1);
    }

    #[test]
    fn test_blank_search_not_cached() {
        let store = create_test_store();
        assert!(store.search("   ").is_empty());
        assert_eq!(store.search_cache().size(), 0);
    }

    #[test]
    fn test_load_replaces_contents() {
        let store = create_test_store();
        store.search("rust");

        store
            .load(vec![Bookmark::new("a", "Alpha", "https://a"), Bookmark::new("b", "Beta", "https://b")])
            .unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("1").is_none());
        assert_eq!(store.search_cache().size(), 0);

        let result = store.load(vec![Bookmark::new("x", "1", "u"), Bookmark::new("x", "2", "u")]);
        assert!(matches!(result, Err(CacheError::DuplicateKey(_))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_rebuild_index() {
        let store = create_test_store();
        store.rebuild_index();
        assert_eq!(store.get("3").unwrap().title, "Go Tour");
        assert!(store.contains("1"));
    }

    #[test]
    fn test_cache_group_keeps_records() {
        let store = create_test_store();
        store.search("go");
        store.filter_by_tag("async");

        let snapshots = store.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "bookmarks.search");
        assert_eq!(snapshots[0].size, 1);

        store.clear_all();
        assert_eq!(store.search_cache().size(), 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_concurrent_search_and_update() {
        let store = Arc::new(create_test_store());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        if t == 0 {
                            let title = format!("Tokio {}", i);
                            store
                                .update("2", Bookmark::new("2", title, "https://tokio.rs"))
                                .unwrap();
                        } else {
                            assert_eq!(store.search("tokio").len(), 1);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.search("tokio")[0].title, "Tokio 99");
    }
}
