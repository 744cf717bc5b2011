//! Bucketed byte-slab pool
//!
//! Process-wide singleton handing out `Box<[u8]>` slabs in power-of-two
//! buckets starting at 32 bytes, one `ObjectPool` per bucket. Minimises
//! allocator churn for the byte-buffer layer.

use crate::infrastructure::config::SimConfig;
use crate::pool::{ObjectPool, PoolError, PoolItem, PoolOptions};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Smallest bucket slab size
pub const MIN_SLAB_SIZE: usize = 32;

/// Hook invoked when a bucket is exhausted and a direct allocation is
/// served instead; receives (requested size, bucket index)
pub type OutOfMemoryHook = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A byte slab loaned from the pool, or a direct allocation served when
/// the owning bucket was exhausted
pub enum Slab {
    Pooled(PoolItem<Box<[u8]>>),
    Direct(Box<[u8]>),
}

impl Slab {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Slab::Pooled(item) => item.len(),
            Slab::Direct(bytes) => bytes.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the slab came out of a bucket pool
    #[inline]
    pub fn is_pooled(&self) -> bool {
        matches!(self, Slab::Pooled(_))
    }
}

impl Deref for Slab {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            Slab::Pooled(item) => item,
            Slab::Direct(bytes) => bytes,
        }
    }
}

impl DerefMut for Slab {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Slab::Pooled(item) => item,
            Slab::Direct(bytes) => bytes,
        }
    }
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

struct Bucket {
    size: usize,
    pool: ObjectPool<Box<[u8]>>,
    requested_bytes: AtomicU64,
    served_bytes: AtomicU64,
}

/// Per-bucket statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketStats {
    pub slab_size: usize,
    pub allocated: usize,
    pub available: usize,
    pub capacity: usize,
    /// Bytes currently held by the bucket's slots
    pub memory_bytes: usize,
    pub allocations: u64,
    pub releases: u64,
    pub evictions: u64,
    pub hit_ratio: f64,
    pub miss_rate: f64,
    /// Internal fragmentation: share of served bytes the callers did not
    /// actually request
    pub fragmentation: f64,
}

/// Aggregated pool statistics
#[derive(Debug, Clone, Default)]
pub struct BufferPoolStats {
    pub buckets: Vec<BucketStats>,
    pub total_memory_bytes: usize,
    pub total_allocations: u64,
    pub total_releases: u64,
}

/// Bucketed slab pool; see module docs
pub struct BufferPool {
    buckets: Vec<Bucket>,
    disposed: AtomicBool,
    on_out_of_memory: Mutex<Option<OutOfMemoryHook>>,
}

static GLOBAL: OnceLock<BufferPool> = OnceLock::new();

impl BufferPool {
    /// Build a pool with `bucket_count` buckets sized `32 · 2^i`, each
    /// bucket lazily filling up to `bucket_capacity` slabs
    pub fn new(bucket_count: usize, bucket_capacity: usize) -> Self {
        let buckets = (0..bucket_count)
            .map(|i| {
                let size = MIN_SLAB_SIZE << i;
                let options = PoolOptions {
                    name: format!("slab-{}", size),
                    initial_capacity: bucket_capacity,
                    max_capacity: bucket_capacity.max(1) * 4,
                    // Large buckets would pin megabytes up front; fill lazily.
                    preallocate: false,
                    ..Default::default()
                };
                Bucket {
                    size,
                    pool: ObjectPool::new(options, move || {
                        vec![0u8; size].into_boxed_slice()
                    }),
                    requested_bytes: AtomicU64::new(0),
                    served_bytes: AtomicU64::new(0),
                }
            })
            .collect();
        Self {
            buckets,
            disposed: AtomicBool::new(false),
            on_out_of_memory: Mutex::new(None),
        }
    }

    /// Process-wide pool, configured from `SimConfig` on first use
    pub fn global() -> &'static BufferPool {
        GLOBAL.get_or_init(|| {
            let config = SimConfig::load().unwrap_or_else(|e| {
                tracing::warn!(target: "buffer", error = %e, "config load failed, using defaults");
                SimConfig::default()
            });
            BufferPool::new(config.buffers.bucket_count, config.buffers.bucket_capacity)
        })
    }

    /// Install the exhaustion hook
    pub fn set_out_of_memory_hook(&self, hook: OutOfMemoryHook) {
        *self.on_out_of_memory.lock() = Some(hook);
    }

    /// Largest slab this pool can serve
    pub fn max_slab_size(&self) -> usize {
        self.buckets.last().map(|b| b.size).unwrap_or(0)
    }

    /// Index of the smallest bucket whose slab size covers `size`
    fn bucket_index(&self, size: usize) -> Option<usize> {
        let rounded = size.max(MIN_SLAB_SIZE).next_power_of_two();
        let idx = rounded.trailing_zeros().saturating_sub(MIN_SLAB_SIZE.trailing_zeros()) as usize;
        (idx < self.buckets.len()).then_some(idx)
    }

    /// Allocate a slab covering `size` bytes
    ///
    /// Falls back to a direct allocation of the bucketed size when the
    /// bucket is exhausted, invoking the out-of-memory hook.
    pub fn allocate(&self, size: usize) -> Result<Slab, PoolError> {
        let idx = self.check_request(size)?;
        let bucket = &self.buckets[idx];
        bucket.requested_bytes.fetch_add(size as u64, Ordering::Relaxed);
        bucket
            .served_bytes
            .fetch_add(bucket.size as u64, Ordering::Relaxed);

        match bucket.pool.try_acquire() {
            Ok(Some(item)) => Ok(Slab::Pooled(item)),
            Ok(None) | Err(_) => {
                if let Some(hook) = self.on_out_of_memory.lock().clone() {
                    hook(size, idx);
                }
                tracing::debug!(
                    target: "buffer",
                    requested = size,
                    bucket = idx,
                    "bucket exhausted, serving direct allocation"
                );
                Ok(Slab::Direct(vec![0u8; bucket.size].into_boxed_slice()))
            }
        }
    }

    /// As `allocate`, but never falls back; `None` when the bucket cannot
    /// serve the request
    pub fn try_allocate(&self, size: usize) -> Option<Slab> {
        let idx = self.check_request(size).ok()?;
        let bucket = &self.buckets[idx];
        match bucket.pool.try_acquire() {
            Ok(Some(item)) => {
                bucket.requested_bytes.fetch_add(size as u64, Ordering::Relaxed);
                bucket
                    .served_bytes
                    .fetch_add(bucket.size as u64, Ordering::Relaxed);
                Some(Slab::Pooled(item))
            }
            _ => None,
        }
    }

    /// Return a slab
    ///
    /// Slabs whose size does not exactly match a bucket, and direct
    /// fallback allocations, are dropped rather than pooled.
    pub fn release(&self, slab: Slab) {
        match slab {
            Slab::Pooled(item) => {
                let matching = self
                    .bucket_index(item.len())
                    .filter(|&i| self.buckets[i].size == item.len());
                match matching {
                    Some(i) => {
                        if let Err(e) = self.buckets[i].pool.release(item) {
                            tracing::debug!(target: "buffer", error = %e, "slab release rejected");
                        }
                    }
                    None => {
                        // Size drifted from every bucket; drop it.
                    }
                }
            }
            Slab::Direct(_) => {
                // Direct allocations are not pool-owned; dropped here.
            }
        }
    }

    fn check_request(&self, size: usize) -> Result<usize, PoolError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(PoolError::PoolDisposed {
                name: "buffer-pool".into(),
            });
        }
        if size == 0 {
            return Err(PoolError::InvalidOperation {
                name: "buffer-pool".into(),
                reason: "allocation size must be positive".into(),
            });
        }
        self.bucket_index(size).ok_or_else(|| PoolError::InvalidOperation {
            name: "buffer-pool".into(),
            reason: format!(
                "allocation of {} bytes exceeds largest bucket {}",
                size,
                self.max_slab_size()
            ),
        })
    }

    /// Aggregated statistics over all buckets
    pub fn get_stats(&self) -> BufferPoolStats {
        let mut stats = BufferPoolStats::default();
        for bucket in &self.buckets {
            let occupancy = bucket.pool.stats();
            let metrics = bucket.pool.metrics();
            let requested = bucket.requested_bytes.load(Ordering::Relaxed);
            let served = bucket.served_bytes.load(Ordering::Relaxed);
            let total_samples = metrics.hits + metrics.misses;
            let bucket_stats = BucketStats {
                slab_size: bucket.size,
                allocated: occupancy.allocated,
                available: occupancy.free,
                capacity: occupancy.total,
                memory_bytes: occupancy.total * bucket.size,
                allocations: metrics.allocations,
                releases: metrics.releases,
                evictions: metrics.evictions,
                hit_ratio: metrics.hit_ratio,
                miss_rate: if total_samples == 0 {
                    0.0
                } else {
                    metrics.misses as f64 / total_samples as f64
                },
                fragmentation: if served == 0 {
                    0.0
                } else {
                    1.0 - requested as f64 / served as f64
                },
            };
            stats.total_memory_bytes += bucket_stats.memory_bytes;
            stats.total_allocations += bucket_stats.allocations;
            stats.total_releases += bucket_stats.releases;
            stats.buckets.push(bucket_stats);
        }
        stats
    }

    /// Discard every bucket's slots; fails while any slab is loaned out
    pub fn clear(&self) -> Result<(), PoolError> {
        for bucket in &self.buckets {
            bucket.pool.clear()?;
        }
        Ok(())
    }

    /// Discard all free slabs in every bucket
    pub fn drain(&self) {
        for bucket in &self.buckets {
            bucket.pool.drain();
        }
    }

    /// Trim every bucket's free slabs toward its configured floor
    pub fn compact(&self) {
        for bucket in &self.buckets {
            bucket.pool.force_compact();
        }
    }

    /// Resize the bucket whose slab size is exactly `size`
    pub fn resize_bucket(&self, size: usize, new_capacity: usize) -> Result<(), PoolError> {
        let bucket = self
            .buckets
            .iter()
            .find(|b| b.size == size)
            .ok_or_else(|| PoolError::InvalidOperation {
                name: "buffer-pool".into(),
                reason: format!("no bucket with slab size {}", size),
            })?;
        bucket.pool.resize(new_capacity)
    }

    /// Dispose every bucket pool; final and idempotent
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        for bucket in &self.buckets {
            bucket.pool.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index_rounding() {
        let pool = BufferPool::new(4, 2); // 32, 64, 128, 256
        assert_eq!(pool.bucket_index(1), Some(0));
        assert_eq!(pool.bucket_index(32), Some(0));
        assert_eq!(pool.bucket_index(33), Some(1));
        assert_eq!(pool.bucket_index(64), Some(1));
        assert_eq!(pool.bucket_index(256), Some(3));
        assert_eq!(pool.bucket_index(257), None);
    }

    #[test]
    fn test_allocate_serves_bucketed_size() {
        let pool = BufferPool::new(4, 2);
        let slab = pool.allocate(40).unwrap();
        assert_eq!(slab.len(), 64);
        assert!(slab.iter().all(|&b| b == 0));
        pool.release(slab);
    }

    #[test]
    fn test_zero_and_oversize_rejected() {
        let pool = BufferPool::new(2, 2); // 32, 64
        assert!(pool.allocate(0).is_err());
        assert!(pool.allocate(65).is_err());
        assert!(pool.try_allocate(65).is_none());
    }

    #[test]
    fn test_release_zero_fills_for_next_borrower() {
        let pool = BufferPool::new(2, 2);
        let mut slab = pool.allocate(32).unwrap();
        slab[0] = 0xFF;
        pool.release(slab);

        let slab = pool.allocate(32).unwrap();
        assert_eq!(slab[0], 0);
        pool.release(slab);
    }

    #[test]
    fn test_fallback_direct_allocation() {
        let pool = BufferPool::new(1, 1); // single 32-byte bucket, max 4 slabs
        let hook_hits = Arc::new(AtomicU64::new(0));
        let hits = Arc::clone(&hook_hits);
        pool.set_out_of_memory_hook(Arc::new(move |_, _| {
            hits.fetch_add(1, Ordering::Relaxed);
        }));

        // Exhaust the bucket (capacity 1 * 4 max)
        let held: Vec<Slab> = (0..4).map(|_| pool.allocate(16).unwrap()).collect();
        assert!(held.iter().all(|s| s.is_pooled()));

        let fallback = pool.allocate(16).unwrap();
        assert!(!fallback.is_pooled());
        assert_eq!(hook_hits.load(Ordering::Relaxed), 1);

        // try_allocate never falls back
        assert!(pool.try_allocate(16).is_none());

        for slab in held {
            pool.release(slab);
        }
        pool.release(fallback);
    }

    #[test]
    fn test_stats_aggregate() {
        let pool = BufferPool::new(3, 2);
        let a = pool.allocate(32).unwrap();
        let b = pool.allocate(100).unwrap();
        let stats = pool.get_stats();
        assert_eq!(stats.buckets.len(), 3);
        assert_eq!(stats.buckets[0].allocated, 1);
        assert_eq!(stats.buckets[2].allocated, 1);
        // 100 of 128 bytes requested: fragmentation below 25%
        assert!(stats.buckets[2].fragmentation < 0.25);
        pool.release(a);
        pool.release(b);
    }

    #[test]
    fn test_dispose_final() {
        let pool = BufferPool::new(2, 2);
        pool.dispose();
        pool.dispose(); // idempotent
        assert!(pool.is_disposed());
        assert!(matches!(
            pool.allocate(16),
            Err(PoolError::PoolDisposed { .. })
        ));
    }

    #[test]
    fn test_resize_bucket_exact_match_only() {
        let pool = BufferPool::new(2, 2);
        pool.resize_bucket(64, 8).unwrap();
        assert!(pool.resize_bucket(48, 8).is_err());
    }

    #[test]
    fn test_global_singleton_identity() {
        let a = BufferPool::global() as *const BufferPool;
        let b = BufferPool::global() as *const BufferPool;
        assert_eq!(a, b);
    }
}
