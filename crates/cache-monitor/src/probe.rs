//! Process memory readings

use cache_core::{CacheError, MemoryUsage, Result};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of process memory readings
pub trait MemoryProbe: Debug + Send + Sync {
    fn read(&self) -> Result<MemoryUsage>;
}

/// Reads memory usage from `/proc/self/status`.
///
/// `VmRSS` is reported as heap used, `VmSize` as heap total and `VmSwap`
/// as external. Reading fails on platforms without procfs.
#[derive(Debug, Clone)]
pub struct ProcStatusProbe {
    path: PathBuf,
}

impl ProcStatusProbe {
    pub fn new() -> Self {
        Self::with_path("/proc/self/status")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse the contents of a procfs status file
    pub fn parse_status(status: &str) -> Result<MemoryUsage> {
        let mut rss = None;
        let mut size = None;
        let mut swap = None;

        for line in status.lines() {
            let mut parts = line.split_whitespace();
            let (field, slot) = match parts.next() {
                Some(field @ "VmRSS:") => (field, &mut rss),
                Some(field @ "VmSize:") => (field, &mut size),
                Some(field @ "VmSwap:") => (field, &mut swap),
                _ => continue,
            };
            if let Some(kb) = parts.next().and_then(|v| v.parse::<u64>().ok()) {
                let bytes = kb.checked_mul(1024).ok_or_else(|| {
                    CacheError::MemoryProbe(format!("{} {} kB overflows a byte count", field, kb))
                })?;
                *slot = Some(bytes);
            }
        }

        let heap_used =
            rss.ok_or_else(|| CacheError::MemoryProbe("VmRSS missing from status".to_string()))?;
        Ok(MemoryUsage::new(
            heap_used,
            size.unwrap_or(heap_used),
            swap.unwrap_or(0),
        ))
    }
}

impl Default for ProcStatusProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcStatusProbe {
    fn read(&self) -> Result<MemoryUsage> {
        let status = std::fs::read_to_string(&self.path).map_err(|e| {
            CacheError::MemoryProbe(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        Self::parse_status(&status)
    }
}

/// Probe whose reading is set by hand; reads fail while no reading is set
#[derive(Debug, Default)]
pub struct ManualProbe {
    reading: Mutex<Option<MemoryUsage>>,
    reads: AtomicU64,
}

impl ManualProbe {
    pub fn new(usage: MemoryUsage) -> Self {
        Self {
            reading: Mutex::new(Some(usage)),
            reads: AtomicU64::new(0),
        }
    }

    /// Probe reporting `used_mb` of heap in use
    pub fn with_used_mb(used_mb: f64) -> Self {
        Self::new(MemoryUsage::from_mb(used_mb, used_mb * 2.0, 0.0))
    }

    pub fn set(&self, usage: MemoryUsage) {
        *self.reading.lock() = Some(usage);
    }

    pub fn set_used_mb(&self, used_mb: f64) {
        self.set(MemoryUsage::from_mb(used_mb, used_mb * 2.0, 0.0));
    }

    /// Make subsequent reads fail
    pub fn fail(&self) {
        *self.reading.lock() = None;
    }

    /// Number of read attempts so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl MemoryProbe for ManualProbe {
    fn read(&self) -> Result<MemoryUsage> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let reading = *self.reading.lock();
        reading.ok_or_else(|| CacheError::MemoryProbe("no reading available".to_string()))
    }
}
