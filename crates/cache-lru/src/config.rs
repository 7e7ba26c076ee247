//! Sizing and TTL settings shared by both cache types

use cache_core::duration_to_millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a bounded or expiring cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry limit; must be non-zero
    pub max_entries: usize,
    /// TTL used when a value is stored without an explicit one, in milliseconds
    #[serde(default)]
    pub default_ttl_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_ms: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with the given capacity
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            default_ttl_ms: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the TTL applied by `ExpiringCache::set_default`.
    /// Sub-millisecond durations round up to one millisecond.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = Some(duration_to_millis(ttl));
        self
    }

    /// The default TTL, if one is configured
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.default_ttl(), None);
    }

    #[test]
    fn test_with_methods() {
        let config = CacheConfig::default()
            .with_max_entries(50)
            .with_default_ttl(Duration::from_secs(300));

        assert_eq!(config.max_entries, 50);
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        let config = CacheConfig::new(4).with_default_ttl(Duration::from_micros(300));
        assert_eq!(config.default_ttl(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_missing_ttl_field_deserializes() {
        let config: CacheConfig = serde_json::from_str(r#"{"max_entries": 10}"#).unwrap();
        assert_eq!(config.max_entries, 10);
        assert_eq!(config.default_ttl_ms, None);
    }
}
