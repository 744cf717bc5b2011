//! Per-operation timing statistics
//!
//! Lock-free counters using atomic operations. Updated from hot paths,
//! snapshotted for export.

use std::sync::atomic::{AtomicU64, Ordering};

/// Timing accumulator for a single operation kind
///
/// Records microsecond durations. All updates are `Relaxed`; snapshots are
/// advisory, not linearizable.
#[derive(Debug)]
pub struct OpStats {
    count: AtomicU64,
    total_micros: AtomicU64,
    /// u64::MAX until the first sample lands
    min_micros: AtomicU64,
    max_micros: AtomicU64,
}

/// Snapshot of an `OpStats` accumulator
#[derive(Debug, Clone, Copy, Default)]
pub struct OpStatsSnapshot {
    pub count: u64,
    pub total_micros: u64,
    pub min_micros: u64,
    pub avg_micros: u64,
    pub max_micros: u64,
}

impl Default for OpStats {
    /// Same as `new`; keeps the min sentinel intact
    fn default() -> Self {
        Self::new()
    }
}

impl OpStats {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
            min_micros: AtomicU64::new(u64::MAX),
            max_micros: AtomicU64::new(0),
        }
    }

    /// Record one sample
    #[inline]
    pub fn record(&self, micros: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.min_micros.fetch_min(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get current snapshot
    pub fn snapshot(&self) -> OpStatsSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_micros.load(Ordering::Relaxed);
        let min = self.min_micros.load(Ordering::Relaxed);

        OpStatsSnapshot {
            count,
            total_micros: total,
            min_micros: if count == 0 { 0 } else { min },
            avg_micros: if count == 0 { 0 } else { total / count },
            max_micros: self.max_micros.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.total_micros.store(0, Ordering::Relaxed);
        self.min_micros.store(u64::MAX, Ordering::Relaxed);
        self.max_micros.store(0, Ordering::Relaxed);
    }
}
