use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Category a metric is recorded under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Timing,
    Memory,
    Count,
    Custom,
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricCategory::Timing => write!(f, "timing"),
            MetricCategory::Memory => write!(f, "memory"),
            MetricCategory::Count => write!(f, "count"),
            MetricCategory::Custom => write!(f, "custom"),
        }
    }
}

/// Severity of a threshold crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single process memory reading, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Memory currently in use by the process
    pub heap_used: u64,
    /// Memory reserved by the process
    pub heap_total: u64,
    /// Memory held outside the main heap (swap on Linux)
    pub external: u64,
}

impl MemoryUsage {
    pub fn new(heap_used: u64, heap_total: u64, external: u64) -> Self {
        Self {
            heap_used,
            heap_total,
            external,
        }
    }

    /// Build a reading from megabyte values
    pub fn from_mb(heap_used: f64, heap_total: f64, external: f64) -> Self {
        Self {
            heap_used: mb_to_bytes(heap_used),
            heap_total: mb_to_bytes(heap_total),
            external: mb_to_bytes(external),
        }
    }

    pub fn heap_used_mb(&self) -> f64 {
        bytes_to_mb(self.heap_used)
    }

    pub fn heap_total_mb(&self) -> f64 {
        bytes_to_mb(self.heap_total)
    }

    pub fn external_mb(&self) -> f64 {
        bytes_to_mb(self.external)
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used {:.2} MB / total {:.2} MB (external {:.2} MB)",
            self.heap_used_mb(),
            self.heap_total_mb(),
            self.external_mb()
        )
    }
}

/// Convert a byte count to megabytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Convert megabytes to a byte count, saturating at zero
pub fn mb_to_bytes(mb: f64) -> u64 {
    if mb <= 0.0 {
        0
    } else {
        (mb * BYTES_PER_MB) as u64
    }
}

/// Whole milliseconds in `duration`, rounded up so that any non-zero
/// duration stays non-zero. Saturates at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    let millis = if duration.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    };
    u64::try_from(millis).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_mb_conversion() {
        let usage = MemoryUsage::from_mb(150.0, 300.0, 0.5);
        assert_eq!(usage.heap_used, 150 * 1024 * 1024);
        assert!((usage.heap_used_mb() - 150.0).abs() < f64::EPSILON);
        assert!((usage.external_mb() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_negative_mb_saturates() {
        assert_eq!(mb_to_bytes(-4.0), 0);
    }

    #[test]
    fn test_duration_to_millis_rounds_up() {
        assert_eq!(duration_to_millis(Duration::ZERO), 0);
        assert_eq!(duration_to_millis(Duration::from_micros(1)), 1);
        assert_eq!(duration_to_millis(Duration::from_micros(1500)), 2);
        assert_eq!(duration_to_millis(Duration::from_secs(5)), 5_000);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(MetricCategory::Memory.to_string(), "memory");
    }
}
