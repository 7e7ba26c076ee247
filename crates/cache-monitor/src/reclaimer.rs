//! Memory reclaimer
//!
//! Samples memory usage on a timer and runs a registry of named cleanup
//! actions when usage crosses the cleanup or critical threshold. Managed
//! caches register their own shrink action under `cache_<name>`.

use crate::config::ReclaimerConfig;
use crate::monitor::{MetricsMonitor, HEAP_USED_METRIC};
use crate::task::PeriodicTask;
use cache_core::{Clock, MetricCategory, Result};
use cache_lru::{
    shrink_target, validate_shrink_fraction, BoundedCache, CacheConfig, ExpiringCache, Shrinkable,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Count of cleanup actions that failed during one cleanup run
pub const CLEANUP_FAILURES_METRIC: &str = "cleanup.failures";
/// Wall time of one cleanup run, in milliseconds
pub const CLEANUP_DURATION_METRIC: &str = "cleanup.duration";

/// A named unit of reclamation work
pub type CleanupAction = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Best-effort request to the runtime to release memory after cleanup
pub trait ReclamationHint: Send + Sync {
    fn request(&self);
}

/// Hint for runtimes without a collector to nudge
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHint;

impl ReclamationHint for NoopHint {
    fn request(&self) {}
}

/// Classification of a memory reading against the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Normal,
    Warning,
    Cleanup,
    Critical,
}

impl PressureLevel {
    /// Whether this level forces a cleanup run
    pub fn requires_cleanup(&self) -> bool {
        matches!(self, PressureLevel::Cleanup | PressureLevel::Critical)
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Warning => "warning",
            PressureLevel::Cleanup => "cleanup",
            PressureLevel::Critical => "critical",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimerState {
    Stopped,
    Monitoring,
}

/// Counters describing reclaimer activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReclaimerStats {
    pub checks: u64,
    pub forced_cleanups: u64,
    pub action_failures: u64,
    pub probe_failures: u64,
    pub registered_actions: usize,
}

/// Outcome of one cleanup run
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Actions that completed, in run order
    pub succeeded: Vec<String>,
    /// Actions that returned an error or panicked, with the reason
    pub failed: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of actions that ran
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Default)]
struct Counters {
    checks: AtomicU64,
    forced_cleanups: AtomicU64,
    action_failures: AtomicU64,
    probe_failures: AtomicU64,
}

/// Threshold-driven cleanup over a registry of named actions
pub struct MemoryReclaimer {
    config: ReclaimerConfig,
    monitor: Arc<MetricsMonitor>,
    /// Registration order is run order; re-registering keeps the slot
    actions: RwLock<Vec<(String, CleanupAction)>>,
    hint: Arc<dyn ReclamationHint>,
    task: Mutex<Option<PeriodicTask>>,
    /// Serializes cleanup runs
    cleanup_lock: Mutex<()>,
    counters: Counters,
}

impl MemoryReclaimer {
    /// Create a reclaimer recording into `monitor`.
    ///
    /// Installs the warning and critical levels as the heap-used threshold
    /// on the monitor.
    pub fn new(config: ReclaimerConfig, monitor: Arc<MetricsMonitor>) -> Result<Self> {
        config.validate()?;
        monitor.set_threshold(HEAP_USED_METRIC, config.warning_mb, config.critical_mb);
        Ok(Self {
            config,
            monitor,
            actions: RwLock::new(Vec::new()),
            hint: Arc::new(NoopHint),
            task: Mutex::new(None),
            cleanup_lock: Mutex::new(()),
            counters: Counters::default(),
        })
    }

    /// Replace the reclamation hint requested after each cleanup
    pub fn with_hint(mut self, hint: Arc<dyn ReclamationHint>) -> Self {
        self.hint = hint;
        self
    }

    pub fn config(&self) -> &ReclaimerConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<MetricsMonitor> {
        &self.monitor
    }

    /// Add an action, or replace the one already registered under `name`
    pub fn register_cleanup_action<F>(&self, name: impl Into<String>, action: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let action: CleanupAction = Arc::new(action);
        let mut actions = self.actions.write();
        match actions.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                slot.1 = action;
                debug!("Replaced cleanup action '{}'", name);
            }
            None => {
                debug!("Registered cleanup action '{}'", name);
                actions.push((name, action));
            }
        }
    }

    /// Remove the action registered under `name`
    pub fn unregister_cleanup_action(&self, name: &str) -> bool {
        let mut actions = self.actions.write();
        let before = actions.len();
        actions.retain(|(existing, _)| existing != name);
        actions.len() != before
    }

    /// Registered action names in run order
    pub fn cleanup_action_names(&self) -> Vec<String> {
        self.actions
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Run every registered action in registration order.
    ///
    /// A failing or panicking action is logged and counted; the remaining
    /// actions still run. Never returns an error.
    pub fn force_cleanup(&self) -> CleanupReport {
        let _guard = self.cleanup_lock.lock();
        self.run_actions()
    }

    fn run_actions(&self) -> CleanupReport {
        let started = Instant::now();
        // Snapshot so actions may (un)register without deadlocking
        let actions: Vec<(String, CleanupAction)> = self.actions.read().clone();
        let mut report = CleanupReport::default();

        for (name, action) in actions {
            let outcome = match catch_unwind(AssertUnwindSafe(|| action())) {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(payload) => Err(format!("panicked: {}", panic_message(&*payload))),
            };
            match outcome {
                Ok(()) => report.succeeded.push(name),
                Err(reason) => {
                    warn!("Cleanup action '{}' failed: {}", name, reason);
                    report.failed.push((name, reason));
                }
            }
        }

        self.hint.request();
        report.elapsed = started.elapsed();

        self.counters.forced_cleanups.fetch_add(1, Ordering::Relaxed);
        self.counters
            .action_failures
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
        self.monitor.record(
            CLEANUP_FAILURES_METRIC,
            report.failed.len() as f64,
            MetricCategory::Count,
        );
        self.monitor.record(
            CLEANUP_DURATION_METRIC,
            report.elapsed.as_secs_f64() * 1000.0,
            MetricCategory::Timing,
        );

        info!(
            "Cleanup finished: {} succeeded, {} failed in {:?}",
            report.succeeded.len(),
            report.failed.len(),
            report.elapsed
        );
        report
    }

    /// Register a shrink action for an existing cache under `cache_<name>`.
    ///
    /// The action holds a weak reference, so dropping the cache turns it
    /// into a no-op. When run it purges dead entries and then evicts from
    /// the LRU end until at most `capacity * (1 - shrink_fraction)` remain.
    pub fn manage_cache<C>(&self, name: &str, cache: &Arc<C>, shrink_fraction: f64) -> Result<()>
    where
        C: Shrinkable + 'static,
    {
        let shrink_fraction = validate_shrink_fraction(shrink_fraction)?;
        let weak = Arc::downgrade(cache);
        let action_name = format!("cache_{}", name);
        let label = action_name.clone();

        self.register_cleanup_action(action_name, move || {
            let Some(cache) = weak.upgrade() else {
                debug!("Managed cache '{}' is gone; nothing to shrink", label);
                return Ok(());
            };
            let purged = cache.purge();
            let target = shrink_target(cache.capacity(), shrink_fraction);
            let evicted = cache.shrink_to(target);
            debug!(
                "Shrank '{}' to {} entries ({} purged, {} evicted)",
                cache.cache_name(),
                cache.len(),
                purged,
                evicted
            );
            Ok(())
        });
        Ok(())
    }

    /// Create a bounded cache with a shrink action already registered
    pub fn create_managed_cache<K, V>(
        &self,
        name: &str,
        capacity: usize,
        shrink_fraction: f64,
    ) -> Result<Arc<BoundedCache<K, V>>>
    where
        K: Hash + Eq + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        validate_shrink_fraction(shrink_fraction)?;
        let cache = Arc::new(BoundedCache::named(name, capacity)?);
        self.manage_cache(name, &cache, shrink_fraction)?;
        Ok(cache)
    }

    /// Create a TTL cache with a shrink action already registered
    pub fn create_managed_expiring_cache<K, V>(
        &self,
        name: &str,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
        shrink_fraction: f64,
    ) -> Result<Arc<ExpiringCache<K, V>>>
    where
        K: Hash + Eq + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        validate_shrink_fraction(shrink_fraction)?;
        let cache = Arc::new(ExpiringCache::with_clock(name, config, clock)?);
        self.manage_cache(name, &cache, shrink_fraction)?;
        Ok(cache)
    }

    /// Take one memory sample and act on it.
    ///
    /// Returns `None` when the reading failed; nothing is recorded for that
    /// tick and the next one retries.
    pub fn check_now(&self) -> Option<PressureLevel> {
        self.counters.checks.fetch_add(1, Ordering::Relaxed);

        let usage = match self.monitor.sample_memory() {
            Ok(usage) => usage,
            Err(e) => {
                self.counters.probe_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Memory check skipped: {}", e);
                return None;
            }
        };

        let used_mb = usage.heap_used_mb();
        let level = self.config.level_for(used_mb);
        match level {
            PressureLevel::Critical | PressureLevel::Cleanup => {
                match self.cleanup_lock.try_lock() {
                    Some(_guard) => {
                        if level == PressureLevel::Critical {
                            error!("Memory usage critical: {:.1} MB, forcing cleanup", used_mb);
                        } else {
                            warn!("Memory usage high: {:.1} MB, forcing cleanup", used_mb);
                        }
                        self.run_actions();
                    }
                    None => debug!("Cleanup already running; skipping this check"),
                }
            }
            PressureLevel::Warning => {
                warn!("Memory usage warning: {:.1} MB", used_mb);
            }
            PressureLevel::Normal => {
                debug!("Memory usage normal: {:.1} MB", used_mb);
            }
        }
        Some(level)
    }

    /// Begin periodic checks at the configured interval.
    ///
    /// Returns `Ok(false)` if already monitoring.
    pub fn start(self: &Arc<Self>) -> Result<bool> {
        self.start_with_interval(self.config.check_interval())
    }

    pub fn start_with_interval(self: &Arc<Self>, interval: Duration) -> Result<bool> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(false);
        }

        let reclaimer = Arc::downgrade(self);
        *task = Some(PeriodicTask::spawn(
            "memory-reclaimer",
            interval,
            move || {
                if let Some(reclaimer) = reclaimer.upgrade() {
                    reclaimer.check_now();
                }
            },
        )?);

        info!("Memory reclaimer monitoring every {:?}", interval);
        Ok(true)
    }

    /// Cancel periodic checks and wait for the task to exit
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
            info!("Memory reclaimer stopped");
        }
    }

    pub fn state(&self) -> ReclaimerState {
        if self.task.lock().is_some() {
            ReclaimerState::Monitoring
        } else {
            ReclaimerState::Stopped
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.state() == ReclaimerState::Monitoring
    }

    pub fn stats(&self) -> ReclaimerStats {
        ReclaimerStats {
            checks: self.counters.checks.load(Ordering::Relaxed),
            forced_cleanups: self.counters.forced_cleanups.load(Ordering::Relaxed),
            action_failures: self.counters.action_failures.load(Ordering::Relaxed),
            probe_failures: self.counters.probe_failures.load(Ordering::Relaxed),
            registered_actions: self.actions.read().len(),
        }
    }
}

impl std::fmt::Debug for MemoryReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReclaimer")
            .field("config", &self.config)
            .field("actions", &self.cleanup_action_names())
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
