//! Cache statistics tracking

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy)]
enum Counter {
    Hit,
    Miss,
    Insert,
    Eviction,
    Expiration,
}

const COUNTERS: usize = 5;

/// Lock-free counters shared between a cache and its observers.
///
/// Evictions cover both capacity overflow and explicit shrinking;
/// expirations are TTL removals only.
#[derive(Debug, Default)]
pub struct CacheStats {
    counts: [AtomicU64; COUNTERS],
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, counter: Counter, n: u64) {
        self.counts[counter as usize].fetch_add(n, Ordering::Relaxed);
    }

    fn read(&self, counter: Counter) -> u64 {
        self.counts[counter as usize].load(Ordering::Relaxed)
    }

    pub fn record_hit(&self) {
        self.add(Counter::Hit, 1);
    }

    pub fn record_miss(&self) {
        self.add(Counter::Miss, 1);
    }

    /// A new key was stored (overwrites are not counted)
    pub fn record_insert(&self) {
        self.add(Counter::Insert, 1);
    }

    pub fn record_evictions(&self, count: u64) {
        self.add(Counter::Eviction, count);
    }

    pub fn record_expirations(&self, count: u64) {
        self.add(Counter::Expiration, count);
    }

    pub fn hits(&self) -> u64 {
        self.read(Counter::Hit)
    }

    pub fn misses(&self) -> u64 {
        self.read(Counter::Miss)
    }

    pub fn inserts(&self) -> u64 {
        self.read(Counter::Insert)
    }

    pub fn evictions(&self) -> u64 {
        self.read(Counter::Eviction)
    }

    pub fn expirations(&self) -> u64 {
        self.read(Counter::Expiration)
    }

    /// Lookups served so far
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of lookups that hit, 0.0 before the first lookup
    pub fn hit_rate(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            total => self.hits() as f64 / total as f64,
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        let copy = Self::new();
        for (dst, src) in copy.counts.iter().zip(&self.counts) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        copy
    }
}

/// Point-in-time view of one cache, used for aggregate stats and reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub name: String,
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

impl CacheSnapshot {
    pub fn new(name: impl Into<String>, size: usize, capacity: usize, stats: &CacheStats) -> Self {
        Self {
            name: name.into(),
            size,
            capacity,
            hits: stats.hits(),
            misses: stats.misses(),
            evictions: stats.evictions(),
            expirations: stats.expirations(),
            hit_rate: stats.hit_rate(),
        }
    }

    /// Occupancy as a fraction of capacity
    pub fn occupancy(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.size as f64 / self.capacity as f64
        }
    }
}
