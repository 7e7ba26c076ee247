//! Plain-text report rendering

use crate::coordinator::CoordinatorStats;
use std::fmt::Write as _;

/// Render coordinator stats followed by the metrics report.
///
/// Output depends only on the inputs, so equal stats render identically.
pub fn render_report(stats: &CoordinatorStats, metrics_report: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Cache Report ===");
    let _ = writeln!(
        out,
        "status: {}",
        if stats.initialized { "running" } else { "stopped" }
    );

    let _ = writeln!(out, "--- Caches ---");
    for cache in &stats.caches {
        let _ = writeln!(
            out,
            "{}: {}/{} entries ({:.0}% full), hits={} misses={} evictions={} expirations={} hit_rate={:.1}%",
            cache.name,
            cache.size,
            cache.capacity,
            cache.occupancy() * 100.0,
            cache.hits,
            cache.misses,
            cache.evictions,
            cache.expirations,
            cache.hit_rate * 100.0
        );
    }

    let _ = writeln!(out, "--- Memory ---");
    match &stats.memory {
        Some(memory) => {
            let _ = writeln!(out, "{}", memory);
        }
        None => {
            let _ = writeln!(out, "(no reading yet)");
        }
    }

    let reclaimer = &stats.reclaimer;
    let _ = writeln!(out, "--- Reclaimer ---");
    let _ = writeln!(
        out,
        "checks={} forced_cleanups={} action_failures={} probe_failures={} actions={} alerts={}",
        reclaimer.checks,
        reclaimer.forced_cleanups,
        reclaimer.action_failures,
        reclaimer.probe_failures,
        reclaimer.registered_actions,
        stats.alerts
    );

    out.push_str(metrics_report);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_core::MemoryUsage;
    use cache_lru::{CacheSnapshot, CacheStats};
    use cache_monitor::ReclaimerStats;

    fn sample_stats() -> CoordinatorStats {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        CoordinatorStats {
            caches: vec![CacheSnapshot::new("search", 5, 50, &stats)],
            memory: Some(MemoryUsage::from_mb(100.0, 200.0, 0.0)),
            reclaimer: ReclaimerStats::default(),
            alerts: 2,
            initialized: true,
        }
    }

    #[test]
    fn test_render_report() {
        let report = render_report(&sample_stats(), "=== Metrics Report ===\n");

        assert!(report.starts_with("=== Cache Report ===\nstatus: running\n"));
        assert!(report.contains("search: 5/50 entries (10% full)"));
        assert!(report.contains("hit_rate=50.0%"));
        assert!(report.contains("used 100.00 MB"));
        assert!(report.contains("alerts=2"));
        assert!(report.ends_with("=== Metrics Report ===\n"));
    }

    #[test]
    fn test_render_without_memory() {
        let mut stats = sample_stats();
        stats.memory = None;
        stats.initialized = false;

        let report = render_report(&stats, "");
        assert!(report.contains("status: stopped"));
        assert!(report.contains("(no reading yet)"));
    }
}
