//! Bounded caches for the cache engine
//!
//! This crate provides the two cache primitives every other part of the
//! engine is built on.
//!
//! # Features
//!
//! - **LRU Eviction**: [`BoundedCache`] holds at most `capacity` entries and
//!   evicts the least recently used one on overflow
//! - **TTL Support**: [`ExpiringCache`] stamps every value with a time-to-live
//!   and drops it lazily when it is read after expiry
//! - **Thread-Safe**: each cache instance is guarded by its own mutex, so
//!   recency promotion and eviction are atomic
//! - **Statistics**: hits, misses, inserts, evictions and expirations
//! - **Shrinking**: both caches implement [`Shrinkable`] so a reclaimer can
//!   cut them down under memory pressure
//!
//! # Example
//!
//! ```
//! use cache_lru::BoundedCache;
//!
//! let cache = BoundedCache::new(2).unwrap();
//! cache.set("a", 1);
//! cache.set("b", 2);
//! cache.get("a");
//! cache.set("c", 3);
//!
//! assert_eq!(cache.keys(), vec!["c", "a"]);
//! ```

pub mod bounded;
pub mod config;
pub mod expiring;
pub mod shrink;
pub mod stats;

pub use bounded::BoundedCache;
pub use config::CacheConfig;
pub use expiring::{ExpiringCache, TimedValue};
pub use shrink::{shrink_target, validate_shrink_fraction, CacheGroup, Shrinkable};
pub use stats::{CacheSnapshot, CacheStats};
