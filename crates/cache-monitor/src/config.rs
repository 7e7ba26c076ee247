//! Monitor and reclaimer configuration

use crate::reclaimer::PressureLevel;
use cache_core::{duration_to_millis, CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the metrics monitor and its memory sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between memory samples, in milliseconds
    pub sample_interval_ms: u64,
    /// Number of samples retained per metric
    pub history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 5_000,
            history_limit: 100,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling interval, rounded up to whole milliseconds
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval_ms = duration_to_millis(interval);
        self
    }

    /// Set the number of samples kept per metric
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "monitor sample interval must be greater than zero".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(CacheError::InvalidConfig(
                "metric history limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the memory reclaimer.
///
/// Thresholds are megabytes of heap in use. They are expected to satisfy
/// `warning_mb <= cleanup_mb <= critical_mb`; the ordering is not enforced,
/// and the highest crossed level wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReclaimerConfig {
    /// Interval between memory checks, in milliseconds
    pub check_interval_ms: u64,
    /// Usage that raises a warning
    pub warning_mb: f64,
    /// Usage that forces cleanup
    pub cleanup_mb: f64,
    /// Usage that is critical (also forces cleanup)
    pub critical_mb: f64,
    /// Fraction of capacity a managed cache gives up when cleanup runs
    pub shrink_fraction: f64,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            warning_mb: 150.0,
            cleanup_mb: 200.0,
            critical_mb: 300.0,
            shrink_fraction: 0.5,
        }
    }
}

impl ReclaimerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the check interval, rounded up to whole milliseconds
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval_ms = duration_to_millis(interval);
        self
    }

    /// Set all three thresholds, in megabytes
    pub fn with_thresholds(mut self, warning_mb: f64, cleanup_mb: f64, critical_mb: f64) -> Self {
        self.warning_mb = warning_mb;
        self.cleanup_mb = cleanup_mb;
        self.critical_mb = critical_mb;
        self
    }

    /// Set the default shrink fraction for managed caches
    pub fn with_shrink_fraction(mut self, shrink_fraction: f64) -> Self {
        self.shrink_fraction = shrink_fraction;
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Classify a usage reading
    pub fn level_for(&self, used_mb: f64) -> PressureLevel {
        if used_mb >= self.critical_mb {
            PressureLevel::Critical
        } else if used_mb >= self.cleanup_mb {
            PressureLevel::Cleanup
        } else if used_mb >= self.warning_mb {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "reclaimer check interval must be greater than zero".to_string(),
            ));
        }
        for (label, value) in [
            ("warning", self.warning_mb),
            ("cleanup", self.cleanup_mb),
            ("critical", self.critical_mb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CacheError::InvalidConfig(format!(
                    "{} threshold must be a non-negative number, got {}",
                    label, value
                )));
            }
        }
        cache_lru::validate_shrink_fraction(self.shrink_fraction)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let monitor = MonitorConfig::default();
        assert_eq!(monitor.sample_interval(), Duration::from_secs(5));
        assert_eq!(monitor.history_limit, 100);

        let reclaimer = ReclaimerConfig::default();
        assert_eq!(reclaimer.check_interval(), Duration::from_secs(30));
        assert_eq!(reclaimer.warning_mb, 150.0);
        assert_eq!(reclaimer.cleanup_mb, 200.0);
        assert_eq!(reclaimer.critical_mb, 300.0);
    }

    #[test]
    fn test_level_for() {
        let config = ReclaimerConfig::default();
        assert_eq!(config.level_for(100.0), PressureLevel::Normal);
        assert_eq!(config.level_for(150.0), PressureLevel::Warning);
        assert_eq!(config.level_for(250.0), PressureLevel::Cleanup);
        assert_eq!(config.level_for(300.0), PressureLevel::Critical);
    }

    #[test]
    fn test_validation() {
        assert!(MonitorConfig::default().validate().is_ok());
        assert!(MonitorConfig::default()
            .with_history_limit(0)
            .validate()
            .is_err());
        assert!(ReclaimerConfig::default()
            .with_shrink_fraction(2.0)
            .validate()
            .is_err());
        assert!(ReclaimerConfig::default()
            .with_check_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_sub_millisecond_intervals_round_up() {
        let monitor = MonitorConfig::new().with_sample_interval(Duration::from_micros(250));
        assert_eq!(monitor.sample_interval(), Duration::from_millis(1));
        assert!(monitor.validate().is_ok());

        let reclaimer = ReclaimerConfig::new().with_check_interval(Duration::from_nanos(1));
        assert_eq!(reclaimer.check_interval(), Duration::from_millis(1));
        assert!(reclaimer.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_of_overrides() {
        let json = r#"{
            "check_interval_ms": 1000,
            "warning_mb": 10.0,
            "cleanup_mb": 20.0,
            "critical_mb": 30.0,
            "shrink_fraction": 0.25
        }"#;
        let config: ReclaimerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.check_interval(), Duration::from_secs(1));
        assert_eq!(config.level_for(25.0), PressureLevel::Cleanup);
    }
}
