//! Shrinking and grouping support
//!
//! Provides the traits a memory reclaimer or a coordinator uses to act on
//! caches without knowing their key and value types.

use crate::stats::CacheSnapshot;
use cache_core::{CacheError, Result};

/// A cache that can be cut down toward a target occupancy
pub trait Shrinkable: Send + Sync {
    /// Name used in logs and cleanup registrations
    fn cache_name(&self) -> &str;

    /// Current number of entries
    fn len(&self) -> usize;

    /// Maximum number of entries
    fn capacity(&self) -> usize;

    /// Evict least recently used entries until at most `target` remain.
    /// Returns the number of evicted entries.
    fn shrink_to(&self, target: usize) -> usize;

    /// Drop entries that are already dead (e.g. expired). Returns the number dropped.
    fn purge(&self) -> usize {
        0
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A set of caches that can be reported on and cleared together
pub trait CacheGroup: Send + Sync {
    /// One snapshot per cache in the group
    fn snapshots(&self) -> Vec<CacheSnapshot>;

    /// Clear every cache in the group
    fn clear_all(&self);
}

/// Entry count a cache of `capacity` must shrink to for the given fraction
pub fn shrink_target(capacity: usize, shrink_fraction: f64) -> usize {
    let keep = (1.0 - shrink_fraction).clamp(0.0, 1.0);
    (capacity as f64 * keep).floor() as usize
}

/// Reject fractions outside `0.0..=1.0` (and NaN)
pub fn validate_shrink_fraction(shrink_fraction: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&shrink_fraction) {
        Ok(shrink_fraction)
    } else {
        Err(CacheError::InvalidShrinkFraction(shrink_fraction))
    }
}
