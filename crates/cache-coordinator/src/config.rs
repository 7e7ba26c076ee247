//! Coordinator configuration

use cache_core::{CacheError, Result};
use cache_lru::CacheConfig;
use cache_monitor::{MonitorConfig, ReclaimerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`CacheCoordinator`](crate::CacheCoordinator) and the
/// domain caches it is usually paired with.
///
/// Every field has a default, so a JSON file only needs the overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Recommendation results cache
    pub recommendations: CacheConfig,
    /// Search results cache; its default TTL applies to every entry
    pub search: CacheConfig,
    /// Entries per query cache in an indexed store
    pub store_query_cache_entries: usize,
    /// Items per page in a paged loader
    pub page_size: usize,
    /// Pages kept by a paged loader
    pub cached_pages: usize,
    pub monitor: MonitorConfig,
    pub reclaimer: ReclaimerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            recommendations: CacheConfig::new(100).with_default_ttl(Duration::from_secs(600)),
            search: CacheConfig::new(50).with_default_ttl(Duration::from_secs(300)),
            store_query_cache_entries: 50,
            page_size: 50,
            cached_pages: 20,
            monitor: MonitorConfig::default(),
            reclaimer: ReclaimerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recommendations(mut self, config: CacheConfig) -> Self {
        self.recommendations = config;
        self
    }

    pub fn with_search(mut self, config: CacheConfig) -> Self {
        self.search = config;
        self
    }

    pub fn with_monitor(mut self, config: MonitorConfig) -> Self {
        self.monitor = config;
        self
    }

    pub fn with_reclaimer(mut self, config: ReclaimerConfig) -> Self {
        self.reclaimer = config;
        self
    }

    /// Parse a JSON document, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidConfig(format!("invalid coordinator config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::InvalidConfig(format!("cannot serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        for (label, cache) in [("recommendations", &self.recommendations), ("search", &self.search)] {
            if cache.max_entries == 0 {
                return Err(CacheError::InvalidCapacity(0));
            }
            if cache.default_ttl_ms == Some(0) {
                return Err(CacheError::InvalidTtl(label.to_string()));
            }
        }
        if self.search.default_ttl().is_none() {
            return Err(CacheError::MissingTtl("search".to_string()));
        }
        if self.store_query_cache_entries == 0 || self.cached_pages == 0 {
            return Err(CacheError::InvalidCapacity(0));
        }
        if self.page_size == 0 {
            return Err(CacheError::InvalidPageSize(0));
        }
        self.monitor.validate()?;
        self.reclaimer.validate()?;
        Ok(())
    }
}
