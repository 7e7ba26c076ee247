//! Metrics and memory reclamation for the cache engine
//!
//! # Components
//!
//! - **MetricsMonitor**: rolling per-metric history (last 100 samples),
//!   warning/critical thresholds and synchronous alert observers, plus a
//!   background sampler that records process memory readings.
//!
//! - **MemoryReclaimer**: samples memory on a timer and runs a registry of
//!   named cleanup actions when usage crosses the cleanup or critical
//!   threshold. It can also mint managed caches that shrink themselves when
//!   cleanup runs.
//!
//! # Example
//!
//! ```ignore
//! use cache_monitor::{MemoryReclaimer, MetricsMonitor, MonitorConfig, ReclaimerConfig};
//! use std::sync::Arc;
//!
//! let monitor = Arc::new(MetricsMonitor::with_defaults()?);
//! let reclaimer = Arc::new(MemoryReclaimer::new(ReclaimerConfig::default(), monitor.clone())?);
//!
//! let pages = reclaimer.create_managed_cache::<usize, Vec<u8>>("pages", 64, 0.5)?;
//! reclaimer.start()?;
//! ```

pub mod config;
pub mod metric;
pub mod monitor;
pub mod probe;
pub mod reclaimer;
pub mod task;

pub use config::{MonitorConfig, ReclaimerConfig};
pub use metric::{Alert, Metric, MetricHistory, MetricSummary, Threshold};
pub use monitor::{
    MetricsMonitor, Observer, Subscription, ALL_METRICS, HEAP_TOTAL_METRIC, HEAP_USED_METRIC,
    EXTERNAL_METRIC,
};
pub use probe::{ManualProbe, MemoryProbe, ProcStatusProbe};
pub use reclaimer::{
    CleanupAction, CleanupReport, MemoryReclaimer, NoopHint, PressureLevel, ReclaimerState,
    ReclaimerStats, ReclamationHint, CLEANUP_DURATION_METRIC, CLEANUP_FAILURES_METRIC,
};
pub use task::PeriodicTask;
