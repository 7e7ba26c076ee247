//! Metrics monitor
//!
//! Keeps a bounded history per metric name, evaluates thresholds on every
//! record and notifies observers synchronously. Histories, thresholds and
//! observers live in separate sharded maps, so recording one metric never
//! serializes against unrelated metrics.

use crate::config::MonitorConfig;
use crate::metric::{Alert, Metric, MetricHistory, MetricSummary, Threshold};
use crate::probe::{MemoryProbe, ProcStatusProbe};
use crate::task::PeriodicTask;
use cache_core::{Clock, MemoryUsage, MetricCategory, Result, Severity, SystemClock};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Memory in use, in megabytes
pub const HEAP_USED_METRIC: &str = "memory.heap_used";
/// Memory reserved, in megabytes
pub const HEAP_TOTAL_METRIC: &str = "memory.heap_total";
/// Memory outside the main heap, in megabytes
pub const EXTERNAL_METRIC: &str = "memory.external";
/// Subscribing under this name receives alerts for every metric
pub const ALL_METRICS: &str = "*";

/// Alert callback
pub type Observer = Arc<dyn Fn(&Alert) + Send + Sync>;

#[derive(Default)]
struct ObserverRegistry {
    observers: DashMap<String, Vec<(u64, Observer)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    fn add(&self, metric: &str, observer: Observer) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .entry(metric.to_string())
            .or_default()
            .push((id, observer));
        id
    }

    fn remove(&self, metric: &str, id: u64) -> bool {
        let removed = match self.observers.get_mut(metric) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                list.len() != before
            }
            None => false,
        };
        self.observers.remove_if(metric, |_, list| list.is_empty());
        removed
    }

    /// Observers for `metric` plus the catch-all ones, cloned out of the map.
    /// Each observer appears once even when `metric` is the catch-all name.
    fn collect(&self, metric: &str) -> Vec<Observer> {
        let keys: &[&str] = if metric == ALL_METRICS {
            &[ALL_METRICS]
        } else {
            &[metric, ALL_METRICS]
        };

        let mut out = Vec::new();
        for key in keys {
            if let Some(list) = self.observers.get(*key) {
                out.extend(list.iter().map(|(_, observer)| Arc::clone(observer)));
            }
        }
        out
    }

    fn count(&self, metric: &str) -> usize {
        self.observers.get(metric).map(|list| list.len()).unwrap_or(0)
    }

    fn clear(&self) {
        self.observers.clear();
    }
}

/// Handle returned by [`MetricsMonitor::subscribe`].
///
/// The observer stays registered for as long as the handle lives; dropping
/// it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its observer"]
pub struct Subscription {
    id: u64,
    metric: String,
    registry: Weak<ObserverRegistry>,
}

impl Subscription {
    /// Stop receiving alerts. Safe to call any number of times; returns
    /// whether this call removed the observer.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.metric, self.id),
            None => false,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("metric", &self.metric)
            .finish()
    }
}

/// Rolling metric store with threshold alerting and a memory sampler
pub struct MetricsMonitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn MemoryProbe>,
    histories: DashMap<String, MetricHistory>,
    thresholds: DashMap<String, Threshold>,
    registry: Arc<ObserverRegistry>,
    sampler: Mutex<Option<PeriodicTask>>,
    observer_failures: AtomicU64,
}

impl MetricsMonitor {
    /// Create a monitor reading memory from `probe`
    pub fn new(config: MonitorConfig, probe: Arc<dyn MemoryProbe>) -> Result<Self> {
        Self::with_clock(config, probe, SystemClock::shared())
    }

    /// Create a monitor with the default config and the procfs probe
    pub fn with_defaults() -> Result<Self> {
        Self::new(MonitorConfig::default(), Arc::new(ProcStatusProbe::new()))
    }

    /// Create a monitor that timestamps samples with `clock`
    pub fn with_clock(
        config: MonitorConfig,
        probe: Arc<dyn MemoryProbe>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            probe,
            histories: DashMap::new(),
            thresholds: DashMap::new(),
            registry: Arc::new(ObserverRegistry::default()),
            sampler: Mutex::new(None),
            observer_failures: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Append a sample and evaluate the metric's threshold.
    ///
    /// Returns the severity of the alert that was emitted, if any.
    pub fn record(&self, name: &str, value: f64, category: MetricCategory) -> Option<Severity> {
        let now = self.clock.now();
        let limit = self.config.history_limit;
        self.histories
            .entry(name.to_string())
            .or_insert_with(|| MetricHistory::new(limit))
            .push(Metric::new(name, value, category, now));

        let threshold = self.thresholds.get(name).map(|t| *t)?;
        let severity = threshold.evaluate(value)?;
        self.emit(Alert {
            metric: name.to_string(),
            value,
            threshold: threshold.level(severity),
            severity,
            timestamp: now,
        });
        Some(severity)
    }

    fn emit(&self, alert: Alert) {
        match alert.severity {
            Severity::Critical => error!(
                "{} alert: {} = {:.2} (threshold {:.2})",
                alert.severity, alert.metric, alert.value, alert.threshold
            ),
            Severity::Warning => warn!(
                "{} alert: {} = {:.2} (threshold {:.2})",
                alert.severity, alert.metric, alert.value, alert.threshold
            ),
        }

        for observer in self.registry.collect(&alert.metric) {
            if catch_unwind(AssertUnwindSafe(|| observer(&alert))).is_err() {
                self.observer_failures.fetch_add(1, Ordering::Relaxed);
                error!("Observer for '{}' panicked; continuing", alert.metric);
            }
        }
    }

    /// Most recent sample for `name`
    pub fn latest(&self, name: &str) -> Option<Metric> {
        self.histories
            .get(name)
            .and_then(|history| history.latest().cloned())
    }

    /// Mean of samples no older than `window`. Returns 0.0 when no sample
    /// falls in the window; check [`history_len`](Self::history_len) to tell
    /// "no data" apart from a real zero.
    pub fn average(&self, name: &str, window: Duration) -> f64 {
        let cutoff = self.clock.now().checked_sub(window);
        self.histories
            .get(name)
            .map(|history| history.average_since(cutoff))
            .unwrap_or(0.0)
    }

    /// Retained samples for `name`, oldest first
    pub fn history(&self, name: &str) -> Vec<Metric> {
        self.histories
            .get(name)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn history_len(&self, name: &str) -> usize {
        self.histories.get(name).map(|h| h.len()).unwrap_or(0)
    }

    pub fn summary(&self, name: &str) -> Option<MetricSummary> {
        self.histories.get(name).and_then(|history| history.summary())
    }

    /// Names of every metric with history, sorted
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.histories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Set or overwrite the threshold for `name`
    pub fn set_threshold(&self, name: &str, warning: f64, critical: f64) {
        self.thresholds
            .insert(name.to_string(), Threshold::new(warning, critical));
    }

    pub fn threshold(&self, name: &str) -> Option<Threshold> {
        self.thresholds.get(name).map(|t| *t)
    }

    pub fn remove_threshold(&self, name: &str) -> bool {
        self.thresholds.remove(name).is_some()
    }

    /// Register an observer for alerts on `name` (or [`ALL_METRICS`])
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Subscription
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        let id = self.registry.add(name, Arc::new(callback));
        Subscription {
            id,
            metric: name.to_string(),
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.registry.count(name)
    }

    /// Number of observer invocations that panicked
    pub fn observer_failures(&self) -> u64 {
        self.observer_failures.load(Ordering::Relaxed)
    }

    /// Run `f` and record its duration in milliseconds as a timing metric
    pub fn measure<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let started = Instant::now();
        let result = f();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record(name, elapsed_ms, MetricCategory::Timing);
        result
    }

    /// Read the probe and record heap used/total/external in megabytes.
    ///
    /// On a probe failure nothing is recorded.
    pub fn sample_memory(&self) -> Result<MemoryUsage> {
        let usage = self.probe.read()?;
        self.record(HEAP_USED_METRIC, usage.heap_used_mb(), MetricCategory::Memory);
        self.record(HEAP_TOTAL_METRIC, usage.heap_total_mb(), MetricCategory::Memory);
        self.record(EXTERNAL_METRIC, usage.external_mb(), MetricCategory::Memory);
        Ok(usage)
    }

    /// Latest recorded memory reading, if any
    pub fn latest_memory(&self) -> Option<MemoryUsage> {
        let used = self.latest(HEAP_USED_METRIC)?;
        let total = self.latest(HEAP_TOTAL_METRIC).map(|m| m.value).unwrap_or(used.value);
        let external = self.latest(EXTERNAL_METRIC).map(|m| m.value).unwrap_or(0.0);
        Some(MemoryUsage::from_mb(used.value, total, external))
    }

    /// Start sampling memory at the configured interval.
    ///
    /// Returns `Ok(false)` if the sampler was already running.
    pub fn start(self: &Arc<Self>) -> Result<bool> {
        self.start_with_interval(self.config.sample_interval())
    }

    /// Start sampling memory every `interval`
    pub fn start_with_interval(self: &Arc<Self>, interval: Duration) -> Result<bool> {
        let mut sampler = self.sampler.lock();
        if sampler.is_some() {
            return Ok(false);
        }

        let monitor = Arc::downgrade(self);
        let task = PeriodicTask::spawn("metrics-sampler", interval, move || {
            if let Some(monitor) = monitor.upgrade() {
                if let Err(e) = monitor.sample_memory() {
                    warn!("Skipping memory sample: {}", e);
                }
            }
        })?;
        *sampler = Some(task);

        info!("Metrics sampler started ({:?} interval)", interval);
        Ok(true)
    }

    /// Stop the sampler and wait for it to exit. No-op when not running.
    pub async fn stop(&self) {
        let task = self.sampler.lock().take();
        if let Some(task) = task {
            task.stop().await;
            info!("Metrics sampler stopped");
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.lock().is_some()
    }

    /// Drop all recorded history. Thresholds and observers are kept.
    pub fn clear(&self) {
        self.histories.clear();
    }

    /// Drop every observer
    pub fn clear_observers(&self) {
        self.registry.clear();
        debug!("All metric observers removed");
    }

    /// Human-readable summary of every metric, sorted by name
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Metrics Report ===");

        let names = self.metric_names();
        if names.is_empty() {
            let _ = writeln!(out, "(no metrics recorded)");
            return out;
        }

        for name in names {
            let Some(summary) = self.summary(&name) else {
                continue;
            };
            let _ = write!(
                out,
                "{} [{}]: latest={:.2} avg={:.2} min={:.2} max={:.2} samples={}",
                summary.name,
                summary.category,
                summary.latest,
                summary.mean,
                summary.min,
                summary.max,
                summary.count
            );
            if let Some(threshold) = self.threshold(&name) {
                let _ = write!(
                    out,
                    " thresholds=({:.2}/{:.2})",
                    threshold.warning, threshold.critical
                );
            }
            let _ = writeln!(out);
        }
        out
    }
}

impl std::fmt::Debug for MetricsMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsMonitor")
            .field("config", &self.config)
            .field("metrics", &self.histories.len())
            .field("thresholds", &self.thresholds.len())
            .field("sampling", &self.is_sampling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ManualProbe;
    use cache_core::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn monitor_with_clock() -> (MetricsMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let monitor = MetricsMonitor::with_clock(
            MonitorConfig::default(),
            Arc::new(ManualProbe::with_used_mb(64.0)),
            clock.clone(),
        )
        .unwrap();
        (monitor, clock)
    }

    #[test]
    fn test_history_keeps_last_hundred() {
        let (monitor, _) = monitor_with_clock();
        for i in 0..150 {
            monitor.record("requests", i as f64, MetricCategory::Count);
        }

        let values: Vec<f64> = monitor.history("requests").iter().map(|m| m.value).collect();
        let expected: Vec<f64> = (50..150).map(|v| v as f64).collect();
        assert_eq!(values, expected);
        assert_eq!(monitor.latest("requests").unwrap().value, 149.0);
    }

    #[test]
    fn test_average_window() {
        let (monitor, clock) = monitor_with_clock();
        monitor.record("latency", 100.0, MetricCategory::Timing);
        clock.advance(Duration::from_secs(10));
        monitor.record("latency", 20.0, MetricCategory::Timing);
        monitor.record("latency", 40.0, MetricCategory::Timing);

        assert_eq!(monitor.average("latency", Duration::from_secs(5)), 30.0);
        assert!((monitor.average("latency", Duration::from_secs(60)) - 160.0 / 3.0).abs() < 1e-9);
        assert_eq!(monitor.average("missing", Duration::from_secs(5)), 0.0);
        assert_eq!(monitor.history_len("missing"), 0);
    }

    #[test]
    fn test_threshold_signals() {
        let (monitor, _) = monitor_with_clock();
        monitor.set_threshold("heap", 150.0, 300.0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = monitor.subscribe("heap", move |alert| sink.lock().push(alert.severity));

        assert_eq!(monitor.record("heap", 100.0, MetricCategory::Memory), None);
        assert_eq!(
            monitor.record("heap", 200.0, MetricCategory::Memory),
            Some(Severity::Warning)
        );
        assert_eq!(
            monitor.record("heap", 350.0, MetricCategory::Memory),
            Some(Severity::Critical)
        );

        assert_eq!(
            *seen.lock(),
            vec![Severity::Warning, Severity::Critical]
        );
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let (monitor, _) = monitor_with_clock();
        monitor.set_threshold("errors", 1.0, 10.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _bad = monitor.subscribe("errors", |_| panic!("observer failure"));
        let _good = monitor.subscribe("errors", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.record("errors", 5.0, MetricCategory::Count);
        monitor.record("errors", 6.0, MetricCategory::Count);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.observer_failures(), 2);
        assert_eq!(monitor.history_len("errors"), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (monitor, _) = monitor_with_clock();
        monitor.set_threshold("m", 1.0, 2.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = monitor.subscribe("m", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(monitor.subscriber_count("m"), 1);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert_eq!(monitor.subscriber_count("m"), 0);

        monitor.record("m", 5.0, MetricCategory::Custom);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_catch_all_subscription() {
        let (monitor, _) = monitor_with_clock();
        monitor.set_threshold("a", 1.0, 2.0);
        monitor.set_threshold("b", 1.0, 2.0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = monitor.subscribe(ALL_METRICS, move |alert| {
            sink.lock().push(alert.metric.clone())
        });

        monitor.record("a", 1.5, MetricCategory::Custom);
        monitor.record("b", 3.0, MetricCategory::Custom);

        assert_eq!(*seen.lock(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_catch_all_metric_notifies_once() {
        let (monitor, _) = monitor_with_clock();
        monitor.set_threshold(ALL_METRICS, 1.0, 2.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = monitor.subscribe(ALL_METRICS, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.record(ALL_METRICS, 5.0, MetricCategory::Custom);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let (monitor, _) = monitor_with_clock();
        monitor.set_threshold("m", 1.0, 2.0);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = monitor.subscribe("m", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(monitor.subscriber_count("m"), 1);

        drop(sub);
        assert_eq!(monitor.subscriber_count("m"), 0);

        monitor.record("m", 5.0, MetricCategory::Custom);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_observer_may_subscribe_reentrantly() {
        let (monitor, _) = monitor_with_clock();
        let monitor = Arc::new(monitor);
        monitor.set_threshold("m", 1.0, 2.0);

        let inner = Arc::downgrade(&monitor);
        let added = Arc::new(Mutex::new(Vec::new()));
        let keep = added.clone();
        let _sub = monitor.subscribe("m", move |_| {
            if let Some(monitor) = inner.upgrade() {
                keep.lock().push(monitor.subscribe("m", |_| {}));
            }
        });

        monitor.record("m", 1.5, MetricCategory::Custom);
        assert_eq!(monitor.subscriber_count("m"), 2);
    }

    #[test]
    fn test_measure_records_timing() {
        let (monitor, _) = monitor_with_clock();
        let value = monitor.measure("render", || 42);

        assert_eq!(value, 42);
        let metric = monitor.latest("render").unwrap();
        assert_eq!(metric.category, MetricCategory::Timing);
        assert!(metric.value >= 0.0);
    }

    #[test]
    fn test_sample_memory_records_megabytes() {
        let (monitor, _) = monitor_with_clock();
        let usage = monitor.sample_memory().unwrap();

        assert!((usage.heap_used_mb() - 64.0).abs() < 1e-9);
        assert!((monitor.latest(HEAP_USED_METRIC).unwrap().value - 64.0).abs() < 1e-9);
        assert!((monitor.latest(HEAP_TOTAL_METRIC).unwrap().value - 128.0).abs() < 1e-9);
        assert!(monitor.latest_memory().is_some());
    }

    #[test]
    fn test_failed_probe_records_nothing() {
        let probe = Arc::new(ManualProbe::default());
        let monitor = MetricsMonitor::new(MonitorConfig::default(), probe.clone()).unwrap();

        assert!(monitor.sample_memory().is_err());
        assert_eq!(monitor.history_len(HEAP_USED_METRIC), 0);

        probe.set_used_mb(10.0);
        assert!(monitor.sample_memory().is_ok());
        assert_eq!(monitor.history_len(HEAP_USED_METRIC), 1);
    }

    #[test]
    fn test_report_is_sorted_and_deterministic() {
        let (monitor, _) = monitor_with_clock();
        monitor.record("zeta", 1.0, MetricCategory::Count);
        monitor.record("alpha", 2.0, MetricCategory::Custom);
        monitor.set_threshold("alpha", 5.0, 10.0);

        let report = monitor.report();
        let alpha = report.find("alpha").unwrap();
        let zeta = report.find("zeta").unwrap();
        assert!(alpha < zeta);
        assert!(report.contains("thresholds=(5.00/10.00)"));
        assert_eq!(report, monitor.report());
    }

    #[tokio::test]
    async fn test_sampler_start_stop_idempotent() {
        let probe = Arc::new(ManualProbe::with_used_mb(32.0));
        let monitor = Arc::new(MetricsMonitor::new(MonitorConfig::default(), probe).unwrap());

        monitor.stop().await;
        assert!(monitor
            .start_with_interval(Duration::from_millis(10))
            .unwrap());
        assert!(!monitor
            .start_with_interval(Duration::from_millis(10))
            .unwrap());
        assert!(monitor.is_sampling());

        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.stop().await;
        assert!(!monitor.is_sampling());

        let recorded = monitor.history_len(HEAP_USED_METRIC);
        assert!(recorded >= 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(monitor.history_len(HEAP_USED_METRIC), recorded);
        monitor.stop().await;
    }
}
