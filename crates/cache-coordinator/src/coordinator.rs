//! Cache Coordinator
//!
//! Owns the recommendation and search result caches together with the
//! metrics monitor and memory reclaimer that watch them.

use crate::config::CoordinatorConfig;
use crate::report::render_report;
use cache_core::{CacheError, Clock, MemoryUsage, Result, Severity, SystemClock};
use cache_lru::{CacheGroup, CacheSnapshot, ExpiringCache};
use cache_monitor::{
    MemoryProbe, MemoryReclaimer, MetricsMonitor, ProcStatusProbe, ReclaimerStats, Subscription,
    CLEANUP_FAILURES_METRIC, HEAP_USED_METRIC,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RECOMMENDATIONS_CACHE: &str = "recommendations";
pub const SEARCH_CACHE: &str = "search";

/// Aggregate statistics across every cache the coordinator knows about
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    /// Owned caches first, then domain caches in attachment order
    pub caches: Vec<CacheSnapshot>,
    /// Most recent memory reading, if one has been taken
    pub memory: Option<MemoryUsage>,
    pub reclaimer: ReclaimerStats,
    pub alerts: u64,
    pub initialized: bool,
}

/// Live state between `initialize` and `shutdown`
struct Session {
    subscriptions: Vec<Subscription>,
}

/// Top-level owner of the result caches, monitor and reclaimer
pub struct CacheCoordinator<V = serde_json::Value> {
    config: CoordinatorConfig,
    monitor: Arc<MetricsMonitor>,
    reclaimer: Arc<MemoryReclaimer>,
    recommendations: Arc<ExpiringCache<String, V>>,
    search: Arc<ExpiringCache<String, V>>,
    domain_caches: RwLock<Vec<(String, Arc<dyn CacheGroup>)>>,
    session: Mutex<Option<Session>>,
    alerts: Arc<AtomicU64>,
}

impl<V> CacheCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a coordinator reading memory from procfs
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(ProcStatusProbe::new()), SystemClock::shared())
    }

    /// Create a coordinator with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(CoordinatorConfig::default())
    }

    /// Create a coordinator with an explicit memory probe and clock
    pub fn with_parts(
        config: CoordinatorConfig,
        probe: Arc<dyn MemoryProbe>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let monitor = Arc::new(MetricsMonitor::with_clock(
            config.monitor.clone(),
            probe,
            Arc::clone(&clock),
        )?);
        let reclaimer = Arc::new(MemoryReclaimer::new(
            config.reclaimer.clone(),
            Arc::clone(&monitor),
        )?);
        let recommendations = Arc::new(ExpiringCache::with_clock(
            RECOMMENDATIONS_CACHE,
            &config.recommendations,
            Arc::clone(&clock),
        )?);
        let search = Arc::new(ExpiringCache::with_clock(SEARCH_CACHE, &config.search, clock)?);

        Ok(Self {
            config,
            monitor,
            reclaimer,
            recommendations,
            search,
            domain_caches: RwLock::new(Vec::new()),
            session: Mutex::new(None),
            alerts: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Attach a domain cache so it is reported on and cleared with the rest
    pub fn with_domain_cache(self, name: impl Into<String>, cache: Arc<dyn CacheGroup>) -> Self {
        self.domain_caches.write().push((name.into(), cache));
        self
    }

    /// Names of attached domain caches, in attachment order
    pub fn domain_cache_names(&self) -> Vec<String> {
        self.domain_caches
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<MetricsMonitor> {
        &self.monitor
    }

    pub fn reclaimer(&self) -> &Arc<MemoryReclaimer> {
        &self.reclaimer
    }

    /// Install thresholds, register the result caches with the reclaimer,
    /// subscribe to memory alerts and start background sampling.
    ///
    /// Must be called inside a Tokio runtime. Returns `Ok(false)` if already
    /// initialized.
    pub fn initialize(&self) -> Result<bool> {
        let mut session = self.session.lock();
        if session.is_some() {
            debug!("Cache coordinator already initialized");
            return Ok(false);
        }
        tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Runtime("cache coordinator must be initialized inside a Tokio runtime".to_string())
        })?;

        let reclaimer_config = &self.config.reclaimer;
        self.monitor.set_threshold(
            HEAP_USED_METRIC,
            reclaimer_config.warning_mb,
            reclaimer_config.critical_mb,
        );
        self.monitor.set_threshold(CLEANUP_FAILURES_METRIC, 1.0, 5.0);

        let fraction = reclaimer_config.shrink_fraction;
        self.reclaimer
            .manage_cache(RECOMMENDATIONS_CACHE, &self.recommendations, fraction)?;
        self.reclaimer
            .manage_cache(SEARCH_CACHE, &self.search, fraction)?;

        let subscriptions = [HEAP_USED_METRIC, CLEANUP_FAILURES_METRIC]
            .into_iter()
            .map(|metric| {
                let alerts = Arc::clone(&self.alerts);
                self.monitor.subscribe(metric, move |alert| {
                    alerts.fetch_add(1, Ordering::Relaxed);
                    if alert.severity == Severity::Critical {
                        warn!("Cache coordinator received critical alert for '{}'", alert.metric);
                    }
                })
            })
            .collect();

        self.monitor.start()?;
        self.reclaimer.start()?;
        *session = Some(Session { subscriptions });

        info!("Cache coordinator initialized");
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Store a recommendation result for `ttl`
    pub fn cache_recommendations(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        self.recommendations.set(key.to_string(), value, ttl)
    }

    pub fn get_cached_recommendations(&self, key: &str) -> Option<V> {
        self.recommendations.get(key)
    }

    /// Store search results under the normalized query, using the search
    /// cache's default TTL
    pub fn cache_search_results(&self, query: &str, results: V) -> Result<()> {
        self.search.set_default(normalize(query), results)
    }

    pub fn get_cached_search_results(&self, query: &str) -> Option<V> {
        self.search.get(normalize(query).as_str())
    }

    pub fn recommendations_cache(&self) -> &Arc<ExpiringCache<String, V>> {
        &self.recommendations
    }

    pub fn search_cache(&self) -> &Arc<ExpiringCache<String, V>> {
        &self.search
    }

    /// Clear every owned and attached cache. Cleanup actions stay
    /// registered.
    pub fn clear_all_caches(&self) {
        self.recommendations.clear();
        self.search.clear();
        for (_, cache) in self.domain_caches.read().iter() {
            cache.clear_all();
        }
        info!("All caches cleared");
    }

    pub fn stats(&self) -> CoordinatorStats {
        let mut caches = vec![self.recommendations.snapshot(), self.search.snapshot()];
        for (_, cache) in self.domain_caches.read().iter() {
            caches.extend(cache.snapshots());
        }

        CoordinatorStats {
            caches,
            memory: self.monitor.latest_memory(),
            reclaimer: self.reclaimer.stats(),
            alerts: self.alerts.load(Ordering::Relaxed),
            initialized: self.is_initialized(),
        }
    }

    /// Human-readable report of cache and metric state. Reads only.
    pub fn report(&self) -> String {
        render_report(&self.stats(), &self.monitor.report())
    }

    /// Unsubscribe from alerts, stop background sampling and clear every
    /// cache. A later `initialize` starts from scratch.
    pub async fn shutdown(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            for subscription in &session.subscriptions {
                subscription.unsubscribe();
            }
        }

        self.reclaimer.stop().await;
        self.monitor.stop().await;
        self.clear_all_caches();
        info!("Cache coordinator shut down");
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

impl<V> std::fmt::Debug for CacheCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("initialized", &self.is_initialized())
            .field("domain_caches", &self.domain_cache_names())
            .finish()
    }
}
