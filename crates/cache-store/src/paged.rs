//! Paged loading
//!
//! Provides the [`PageSource`] trait for external paged data and a
//! [`PagedLoader`] that serves pages and item ranges through an LRU page
//! cache. The source is always called outside the cache lock.

use ahash::AHashSet;
use async_trait::async_trait;
use cache_core::{CacheError, Result};
use cache_lru::{BoundedCache, CacheGroup, CacheSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Trait for external paged data sources
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Load page `page` (zero-based) of `page_size` items.
    /// Pages past the end of the data are empty.
    async fn load_page(&self, page: usize, page_size: usize) -> Result<Vec<T>>;
}

/// In-memory page source for testing and demos
#[derive(Debug)]
pub struct MemoryPageSource<T> {
    items: Vec<T>,
    /// Pages that fail to load
    failing: Mutex<AHashSet<usize>>,
    /// Every page requested, in request order
    requested: Mutex<Vec<usize>>,
}

impl<T> MemoryPageSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            failing: Mutex::new(AHashSet::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Make loads of `page` fail
    pub fn fail_page(&self, page: usize) {
        self.failing.lock().insert(page);
    }

    pub fn heal_page(&self, page: usize) {
        self.failing.lock().remove(&page);
    }

    /// Pages requested so far, in order
    pub fn requested_pages(&self) -> Vec<usize> {
        self.requested.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PageSource<T> for MemoryPageSource<T> {
    async fn load_page(&self, page: usize, page_size: usize) -> Result<Vec<T>> {
        self.requested.lock().push(page);
        if self.failing.lock().contains(&page) {
            return Err(CacheError::PageLoad {
                page,
                reason: "source unavailable".to_string(),
            });
        }

        let start = page.saturating_mul(page_size).min(self.items.len());
        let end = start.saturating_add(page_size).min(self.items.len());
        Ok(self.items[start..end].to_vec())
    }
}

/// Page-oriented loader over a [`PageSource`] with an LRU page cache
pub struct PagedLoader<T> {
    name: String,
    source: Arc<dyn PageSource<T>>,
    page_size: usize,
    cache: BoundedCache<usize, Arc<Vec<T>>>,
    load_failures: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> PagedLoader<T> {
    /// Create a loader caching up to `cached_pages` pages of `page_size` items
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn PageSource<T>>,
        page_size: usize,
        cached_pages: usize,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(CacheError::InvalidPageSize(page_size));
        }
        let name = name.into();
        Ok(Self {
            cache: BoundedCache::named(format!("{}.pages", name), cached_pages)?,
            name,
            source,
            page_size,
            load_failures: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch a page through the cache, loading it from the source on a miss
    async fn fetch(&self, page: usize) -> Result<Arc<Vec<T>>> {
        if let Some(cached) = self.cache.get(&page) {
            return Ok(cached);
        }

        match self.source.load_page(page, self.page_size).await {
            Ok(items) => {
                let items = Arc::new(items);
                self.cache.set(page, Arc::clone(&items));
                Ok(items)
            }
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Page `page`, or `None` if the source failed to load it
    pub async fn page(&self, page: usize) -> Option<Arc<Vec<T>>> {
        match self.fetch(page).await {
            Ok(items) => Some(items),
            Err(e) => {
                warn!("'{}' failed to load page {}: {}", self.name, page, e);
                None
            }
        }
    }

    /// Items `start..=end`, loaded page by page.
    ///
    /// Stops early at the end of the data or at the first page that fails
    /// to load, returning the contiguous prefix gathered so far.
    pub async fn range(&self, start: usize, end: usize) -> Vec<T> {
        if end < start {
            return Vec::new();
        }

        let first_page = start / self.page_size;
        let last_page = end / self.page_size;
        let mut out = Vec::new();

        for page in first_page..=last_page {
            let Some(items) = self.page(page).await else {
                break;
            };

            let page_start = page * self.page_size;
            let from = start.saturating_sub(page_start).min(items.len());
            let to = (end - page_start).saturating_add(1).min(items.len());
            if from < to {
                out.extend_from_slice(&items[from..to]);
            }

            if items.len() < self.page_size {
                break;
            }
        }
        out
    }

    /// Warm the cache with pages `center - radius ..= center + radius` in
    /// the background.
    ///
    /// Load failures are swallowed. Dropping the returned handle leaves the
    /// task running.
    pub fn preload(self: &Arc<Self>, center: usize, radius: usize) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Runtime(format!("'{}' preload needs a Tokio runtime", self.name))
        })?;

        let loader = Arc::clone(self);
        let first = center.saturating_sub(radius);
        let last = center.saturating_add(radius);

        Ok(runtime.spawn(async move {
            for page in first..=last {
                if loader.cache.contains(&page) {
                    continue;
                }
                if let Err(e) = loader.fetch(page).await {
                    debug!("Preload of page {} for '{}' skipped: {}", page, loader.name, e);
                }
            }
        }))
    }

    pub fn is_cached(&self, page: usize) -> bool {
        self.cache.contains(&page)
    }

    /// Drop one page from the cache
    pub fn invalidate_page(&self, page: usize) -> bool {
        self.cache.delete(&page)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.size()
    }

    pub fn page_cache(&self) -> &BoundedCache<usize, Arc<Vec<T>>> {
        &self.cache
    }

    /// Number of failed source loads, including swallowed preload failures
    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }
}

impl<T: Clone + Send + Sync + 'static> CacheGroup for PagedLoader<T> {
    fn snapshots(&self) -> Vec<CacheSnapshot> {
        vec![self.cache.snapshot()]
    }

    fn clear_all(&self) {
        self.cache.clear();
    }
}

impl<T> std::fmt::Debug for PagedLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedLoader")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .field("cached_pages", &self.cache.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_test_loader(
        total: usize,
        page_size: usize,
    ) -> (Arc<PagedLoader<usize>>, Arc<MemoryPageSource<usize>>) {
        let source = Arc::new(MemoryPageSource::new((0..total).collect()));
        let loader = PagedLoader::<usize>::new("items", source.clone(), page_size, 20).unwrap();
        (Arc::new(loader), source)
    }

    #[tokio::test]
    async fn test_range_spans_pages() {
        let (loader, source) = create_test_loader(100, 10);

        let items = loader.range(5, 25).await;
        assert_eq!(items.len(), 21);
        assert_eq!(items, (5..=25).collect::<Vec<_>>());
        assert_eq!(source.requested_pages(), vec![0, 1, 2]);
        assert_eq!(loader.cached_pages(), 3);
    }

    #[tokio::test]
    async fn test_cached_pages_not_reloaded() {
        let (loader, source) = create_test_loader(100, 10);

        loader.range(0, 19).await;
        loader.range(3, 12).await;
        assert_eq!(source.requested_pages(), vec![0, 1]);
        assert_eq!(loader.page_cache().stats().hits(), 2);
    }

    #[tokio::test]
    async fn test_range_edges() {
        let (loader, _) = create_test_loader(25, 10);

        assert!(loader.range(9, 3).await.is_empty());
        assert_eq!(loader.range(7, 7).await, vec![7]);
        assert_eq!(loader.range(20, 100).await, (20..25).collect::<Vec<_>>());
        assert!(loader.range(200, 210).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_page_truncates_range() {
        let (loader, source) = create_test_loader(100, 10);
        source.fail_page(1);

        let items = loader.range(5, 25).await;
        assert_eq!(items, (5..10).collect::<Vec<_>>());
        assert_eq!(loader.load_failures(), 1);
        assert!(loader.page(1).await.is_none());

        source.heal_page(1);
        assert_eq!(loader.range(5, 25).await.len(), 21);
    }

    #[tokio::test]
    async fn test_preload_warms_neighbours() {
        let (loader, source) = create_test_loader(100, 10);
        source.fail_page(4);

        let handle = loader.preload(3, 1).unwrap();
        handle.await.unwrap();

        assert!(loader.is_cached(2));
        assert!(loader.is_cached(3));
        assert!(!loader.is_cached(4));
        assert_eq!(loader.load_failures(), 1);
    }

    #[tokio::test]
    async fn test_preload_is_fire_and_forget() {
        let (loader, _) = create_test_loader(100, 10);
        drop(loader.preload(0, 2).unwrap());

        for _ in 0..50 {
            if loader.cached_pages() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(loader.cached_pages(), 3);
    }

    #[test]
    fn test_preload_requires_runtime() {
        let (loader, _) = create_test_loader(10, 5);
        assert!(matches!(loader.preload(0, 1), Err(CacheError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (loader, source) = create_test_loader(30, 10);
        loader.page(0).await.unwrap();
        loader.page(1).await.unwrap();

        assert!(loader.invalidate_page(0));
        assert!(!loader.invalidate_page(0));
        loader.page(0).await.unwrap();
        assert_eq!(source.requested_pages(), vec![0, 1, 0]);

        loader.clear_all();
        assert_eq!(loader.cached_pages(), 0);
        assert_eq!(loader.snapshots()[0].name, "items.pages");
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let source: Arc<dyn PageSource<u8>> = Arc::new(MemoryPageSource::new(vec![1, 2, 3]));
        let result = PagedLoader::new("bad", source, 0, 4);
        assert!(matches!(result, Err(CacheError::InvalidPageSize(0))));
    }
}
