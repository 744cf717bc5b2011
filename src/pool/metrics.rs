//! Pool metrics collection
//!
//! Lock-free counters using atomic operations, updated on the acquire and
//! release paths. Snapshots taken for export.

use crate::infrastructure::{OpStats, OpStatsSnapshot, RingBuffer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Window of recent loan lifetimes (acquire-to-release millis)
const LIFETIME_WINDOW: usize = 128;

/// Per-pool metrics collector
///
/// Thread-safe counters updated from the acquire/release hot path.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    allocations: AtomicU64,
    releases: AtomicU64,
    creations: AtomicU64,
    evictions: AtomicU64,
    expansions: AtomicU64,
    contractions: AtomicU64,
    validation_failures: AtomicU64,
    reset_failures: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Largest allocated count ever observed
    high_water: AtomicU64,
    acquire_stats: OpStats,
    release_stats: OpStats,
    lifetimes: Mutex<RingBuffer<u64, LIFETIME_WINDOW>>,
}

/// Metrics snapshot for export
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMetricsSnapshot {
    pub allocations: u64,
    pub releases: u64,
    pub creations: u64,
    pub evictions: u64,
    pub expansions: u64,
    pub contractions: u64,
    pub validation_failures: u64,
    pub reset_failures: u64,
    pub hits: u64,
    pub misses: u64,
    pub high_water: u64,
    pub hit_ratio: f64,
    pub acquire: OpStatsSnapshot,
    pub release: OpStatsSnapshot,
    /// Mean of the recent loan-lifetime window, millis
    pub avg_lifetime_ms: u64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_creation(&self, n: u64) {
        self.creations.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_expansion(&self) {
        self.expansions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_contraction(&self) {
        self.contractions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reset_failure(&self) {
        self.reset_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_high_water(&self, allocated: usize) {
        self.high_water.fetch_max(allocated as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_acquire_time(&self, micros: u64) {
        self.acquire_stats.record(micros);
    }

    #[inline]
    pub fn record_release_time(&self, micros: u64) {
        self.release_stats.record(micros);
    }

    #[inline]
    pub fn record_lifetime(&self, millis: u64) {
        self.lifetimes.lock().push(millis);
    }

    /// Hits over hits+misses; 0 when no samples
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            creations: self.creations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expansions: self.expansions.load(Ordering::Relaxed),
            contractions: self.contractions.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            reset_failures: self.reset_failures.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
            acquire: self.acquire_stats.snapshot(),
            release: self.release_stats.snapshot(),
            avg_lifetime_ms: self.lifetimes.lock().mean(),
        }
    }
}
