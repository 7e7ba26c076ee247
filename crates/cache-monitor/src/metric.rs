//! Metric samples, bounded histories and thresholds

use cache_core::{MetricCategory, Severity};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// A single recorded sample. Immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub timestamp: Instant,
    pub category: MetricCategory,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        value: f64,
        category: MetricCategory,
        timestamp: Instant,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            category,
        }
    }
}

/// Ring buffer of the most recent samples for one metric.
///
/// When full, pushing drops the oldest sample.
#[derive(Debug, Clone)]
pub struct MetricHistory {
    samples: VecDeque<Metric>,
    limit: usize,
}

impl MetricHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(limit.min(128)),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, metric: Metric) {
        while self.samples.len() >= self.limit {
            self.samples.pop_front();
        }
        self.samples.push_back(metric);
    }

    pub fn latest(&self) -> Option<&Metric> {
        self.samples.back()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the samples taken at or after `since`; 0.0 when there are none
    pub fn average_since(&self, since: Option<Instant>) -> f64 {
        let (sum, count) = self
            .samples
            .iter()
            .filter(|m| since.map_or(true, |cutoff| m.timestamp >= cutoff))
            .fold((0.0, 0usize), |(sum, count), m| (sum + m.value, count + 1));

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn summary(&self) -> Option<MetricSummary> {
        let latest = self.latest()?;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for m in &self.samples {
            min = min.min(m.value);
            max = max.max(m.value);
            sum += m.value;
        }

        Some(MetricSummary {
            name: latest.name.clone(),
            category: latest.category,
            count: self.samples.len(),
            latest: latest.value,
            min,
            max,
            mean: sum / self.samples.len() as f64,
        })
    }
}

/// Aggregate view over a metric's retained history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    pub category: MetricCategory,
    pub count: usize,
    pub latest: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Warning and critical levels for a named metric.
///
/// `warning <= critical` is assumed but not checked. Critical is evaluated
/// first, so a misordered pair still reports critical at or above `critical`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warning: f64,
    pub critical: f64,
}

impl Threshold {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    pub fn evaluate(&self, value: f64) -> Option<Severity> {
        if value >= self.critical {
            Some(Severity::Critical)
        } else if value >= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    /// The level that was crossed for a severity
    pub fn level(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
        }
    }
}

/// Signal delivered to observers when a recorded value crosses a threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub timestamp: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(value: f64, at: Instant) -> Metric {
        Metric::new("m", value, MetricCategory::Custom, at)
    }

    #[test]
    fn test_history_drops_oldest() {
        let now = Instant::now();
        let mut history = MetricHistory::new(3);
        for v in 0..5 {
            history.push(sample(v as f64, now));
        }

        let values: Vec<f64> = history.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(history.latest().map(|m| m.value), Some(4.0));
    }

    #[test]
    fn test_average_since() {
        let start = Instant::now();
        let mut history = MetricHistory::new(10);
        history.push(sample(10.0, start));
        history.push(sample(20.0, start + Duration::from_secs(5)));
        history.push(sample(30.0, start + Duration::from_secs(10)));

        assert_eq!(history.average_since(None), 20.0);
        assert_eq!(
            history.average_since(Some(start + Duration::from_secs(5))),
            25.0
        );
        assert_eq!(
            history.average_since(Some(start + Duration::from_secs(60))),
            0.0
        );
    }

    #[test]
    fn test_summary() {
        let now = Instant::now();
        let mut history = MetricHistory::new(10);
        assert!(history.summary().is_none());

        for v in [4.0, 1.0, 7.0] {
            history.push(sample(v, now));
        }

        let summary = history.summary().unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.latest, 7.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 7.0);
        assert_eq!(summary.mean, 4.0);
    }

    #[test]
    fn test_threshold_evaluate() {
        let threshold = Threshold::new(150.0, 300.0);
        assert_eq!(threshold.evaluate(100.0), None);
        assert_eq!(threshold.evaluate(150.0), Some(Severity::Warning));
        assert_eq!(threshold.evaluate(300.0), Some(Severity::Critical));
        assert_eq!(threshold.level(Severity::Critical), 300.0);
    }

    #[test]
    fn test_misordered_threshold_prefers_critical() {
        let threshold = Threshold::new(500.0, 100.0);
        assert_eq!(threshold.evaluate(200.0), Some(Severity::Critical));
    }
}
