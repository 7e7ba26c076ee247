//! TTL cache built on [`BoundedCache`]
//!
//! Expiry is lazy: an entry is only removed when it is read after its TTL
//! has elapsed, or when [`ExpiringCache::purge_expired`] is called
//! explicitly. Memory is bounded by capacity, never by TTL.

use crate::bounded::BoundedCache;
use crate::shrink::{CacheGroup, Shrinkable};
use crate::stats::{CacheSnapshot, CacheStats};
use crate::CacheConfig;
use cache_core::{CacheError, Clock, Result, SystemClock};
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A value stamped with the time it was stored and how long it lives
#[derive(Debug, Clone)]
pub struct TimedValue<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> TimedValue<V> {
    pub fn new(value: V, stored_at: Instant, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl,
        }
    }

    /// Live iff `now - stored_at < ttl`
    pub fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }

    /// Time left before expiry
    pub fn remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.stored_at))
    }
}

/// LRU cache whose values expire after a per-entry TTL
pub struct ExpiringCache<K, V> {
    inner: BoundedCache<K, TimedValue<V>>,
    clock: Arc<dyn Clock>,
    default_ttl: Option<Duration>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a named cache using the system clock
    pub fn new(name: impl Into<String>, config: &CacheConfig) -> Result<Self> {
        Self::with_clock(name, config, SystemClock::shared())
    }

    /// Create a named cache reading time from `clock`
    pub fn with_clock(
        name: impl Into<String>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let default_ttl = config.default_ttl();
        if default_ttl == Some(Duration::ZERO) {
            return Err(CacheError::InvalidConfig(
                "default TTL must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inner: BoundedCache::with_config(name, config)?,
            clock,
            default_ttl,
        })
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Store `value` for `ttl`. A zero TTL is rejected.
    pub fn set(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl(self.name().to_string()));
        }
        self.inner
            .set(key, TimedValue::new(value, self.clock.now(), ttl));
        Ok(())
    }

    /// Store `value` for the configured default TTL
    pub fn set_default(&self, key: K, value: V) -> Result<()> {
        let ttl = self
            .default_ttl
            .ok_or_else(|| CacheError::MissingTtl(self.name().to_string()))?;
        self.set(key, value, ttl)
    }

    /// Get a live value, promoting it. An expired entry is removed and reported absent.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.inner
            .get_unless(key, |timed| !timed.is_live(now))
            .map(|timed| timed.value)
    }

    /// Time left for a live entry, without promoting it
    pub fn remaining_ttl<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        self.inner
            .peek(key)
            .filter(|timed| timed.is_live(now))
            .map(|timed| timed.remaining(now))
    }

    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.delete(key)
    }

    /// Remove every expired entry now. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self.inner.remove_where(|_, timed| !timed.is_live(now));
        if removed > 0 {
            self.inner.stats().record_expirations(removed as u64);
            debug!("Purged {} expired entries from '{}'", removed, self.inner.name());
        }
        removed
    }

    /// Number of stored entries, live or not yet purged
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Keys ordered from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        self.inner.keys()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.inner.stats()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.snapshot()
    }
}

impl<K, V> Shrinkable for ExpiringCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn cache_name(&self) -> &str {
        self.name()
    }

    fn len(&self) -> usize {
        self.size()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn shrink_to(&self, target: usize) -> usize {
        self.inner.shrink_to(target)
    }

    fn purge(&self) -> usize {
        self.purge_expired()
    }
}

impl<K, V> CacheGroup for ExpiringCache<K, V>
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

impl<K: Hash + Eq, V> std::fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("inner", &self.inner)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
