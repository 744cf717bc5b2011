//! Generic object pool with watermark-driven expansion and eviction
//!
//! Lends resettable objects through `PoolItem` loans. Slot metadata
//! (status, access times, acquisition tickets) lives behind a single
//! mutex; async acquirers park on a `Notify` until a slot frees up.

use crate::core::Clock;
use crate::pool::error::PoolError;
use crate::pool::metrics::{PoolMetrics, PoolMetricsSnapshot};
use crate::pool::options::{AllocationStrategy, EvictionPolicy, PoolOptions};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Process-wide pool identity counter; ids never repeat
static POOL_IDS: AtomicU64 = AtomicU64::new(1);

/// Capability required of pooled objects: return to a reusable state
pub trait Poolable: Send + 'static {
    fn reset(&mut self);
}

impl Poolable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Byte slabs are zero-filled on recycle so stale contents never leak
/// into the next borrower.
impl Poolable for Box<[u8]> {
    fn reset(&mut self) {
        self.fill(0);
    }
}

/// Slot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Free,
    Allocated,
    /// Headroom claimed by an in-flight async factory
    Reserved,
}

#[derive(Debug)]
struct Slot<T> {
    /// None while the object is loaned out or pending lazy creation
    value: Option<T>,
    status: SlotStatus,
    last_accessed: u64,
    alloc_count: u64,
    created_at: u64,
    ticket: u64,
}

/// A loan from the pool; gives the borrower exclusive access to the object
///
/// Return it with [`ObjectPool::release`]. Dropping the item without
/// releasing leaves its slot allocated until `release_all` or `dispose`
/// reclaims it.
#[derive(Debug)]
pub struct PoolItem<T: Poolable> {
    value: Option<T>,
    slot: u32,
    ticket: u64,
    pool_id: u64,
}

impl<T: Poolable> Deref for PoolItem<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Invariant: value is Some for the entire public life of the loan;
        // release() consumes self before taking it.
        self.value.as_ref().expect("pool item accessed after release")
    }
}

impl<T: Poolable> DerefMut for PoolItem<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pool item accessed after release")
    }
}

struct PoolCore<T> {
    /// Stable-index slot table; None entries are vacated slots
    slots: Vec<Option<Slot<T>>>,
    /// Indices of vacated slots, reused before the table grows
    vacant: Vec<u32>,
    rr_cursor: usize,
    free_count: usize,
    allocated_count: usize,
    reserved_count: usize,
    next_ticket: u64,
    disposed: bool,
}

impl<T> PoolCore<T> {
    /// free + allocated + reserved
    fn total(&self) -> usize {
        self.free_count + self.allocated_count + self.reserved_count
    }
}

struct PoolShared<T: Poolable> {
    core: Mutex<PoolCore<T>>,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    options: PoolOptions<T>,
    metrics: PoolMetrics,
    clock: Clock,
    id: u64,
    notify: Notify,
}

/// Generic pool of resettable objects
///
/// Cloning shares the underlying pool.
///
/// # Example
/// ```
/// use sim_core::pool::{ObjectPool, PoolOptions};
///
/// let pool = ObjectPool::new(PoolOptions::named("scratch"), || vec![0u8; 256]);
/// let mut buf = pool.acquire().unwrap();
/// buf.push(42);
/// pool.release(buf).unwrap();
/// ```
pub struct ObjectPool<T: Poolable> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Poolable> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Occupancy snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total: usize,
    pub free: usize,
    pub allocated: usize,
    pub reserved: usize,
    pub max_capacity: usize,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create a pool; `preallocate` controls whether `initial_capacity`
    /// objects are created up front
    pub fn new<F>(options: PoolOptions<T>, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let clock = Clock::new();
        let mut core = PoolCore {
            slots: Vec::with_capacity(options.initial_capacity),
            vacant: Vec::new(),
            rr_cursor: 0,
            free_count: 0,
            allocated_count: 0,
            reserved_count: 0,
            next_ticket: 1,
            disposed: false,
        };

        let factory: Arc<dyn Fn() -> T + Send + Sync> = Arc::new(factory);
        let metrics = PoolMetrics::new();
        if options.preallocate {
            let now = clock.now_millis();
            for _ in 0..options.initial_capacity {
                core.slots.push(Some(Slot {
                    value: Some((factory)()),
                    status: SlotStatus::Free,
                    last_accessed: now,
                    alloc_count: 0,
                    created_at: now,
                    ticket: 0,
                }));
            }
            core.free_count = options.initial_capacity;
            if options.enable_metrics {
                metrics.record_creation(options.initial_capacity as u64);
            }
        }

        Self {
            shared: Arc::new(PoolShared {
                core: Mutex::new(core),
                factory,
                options,
                metrics,
                clock,
                id: POOL_IDS.fetch_add(1, Ordering::Relaxed),
                notify: Notify::new(),
            }),
        }
    }

    fn m(&self) -> Option<&PoolMetrics> {
        self.shared
            .options
            .enable_metrics
            .then_some(&self.shared.metrics)
    }

    /// Acquire an object, expanding the pool if allowed
    ///
    /// Fails with `PoolDepleted` when no free slot exists and expansion is
    /// not possible, `ValidationFailed` when the configured validator
    /// rejects every candidate.
    pub fn acquire(&self) -> Result<PoolItem<T>, PoolError> {
        let started = self.shared.clock.now_micros();
        let result = self.acquire_inner();
        if let Some(m) = self.m() {
            m.record_acquire_time(self.shared.clock.now_micros().saturating_sub(started));
        }
        match result {
            Ok(Some(item)) => Ok(item),
            Ok(None) => {
                let core = self.shared.core.lock();
                Err(PoolError::PoolDepleted {
                    name: self.shared.options.name.clone(),
                    allocated: core.allocated_count,
                    total: core.total(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// As `acquire`, but returns `None` instead of failing when no object
    /// is available and expansion is not possible
    pub fn try_acquire(&self) -> Result<Option<PoolItem<T>>, PoolError> {
        match self.acquire_inner() {
            // Exhausting candidates through the validator also counts as
            // "no object available" on the try path.
            Err(PoolError::ValidationFailed { .. }) => Ok(None),
            other => other,
        }
    }

    fn acquire_inner(&self) -> Result<Option<PoolItem<T>>, PoolError> {
        let shared = &self.shared;
        let opts = &shared.options;
        let mut core = shared.core.lock();
        if core.disposed {
            return Err(PoolError::PoolDisposed {
                name: opts.name.clone(),
            });
        }

        let now = shared.clock.now_millis();
        self.sweep_expired(&mut core, now);

        let mut rejected = 0usize;
        let mut expanded = false;
        loop {
            let candidate = self.select_free(&mut core);
            let idx = match candidate {
                Some(idx) => idx,
                None => {
                    if opts.auto_expand && core.total() < opts.max_capacity {
                        self.expand(&mut core, now);
                        expanded = true;
                        if let Some(m) = self.m() {
                            m.record_miss();
                        }
                        continue;
                    }
                    if let Some(m) = self.m() {
                        m.record_miss();
                    }
                    if let Some(hook) = &opts.hooks.on_out_of_memory {
                        hook(core.allocated_count);
                    }
                    if rejected > 0 {
                        return Err(PoolError::ValidationFailed {
                            name: opts.name.clone(),
                            rejected,
                        });
                    }
                    return Ok(None);
                }
            };

            // Lazy refill for slots whose object left with release_all or a
            // panicking reset.
            let freshly_created = {
                let slot = match core.slots[idx].as_mut() {
                    Some(s) => s,
                    None => continue,
                };
                if slot.value.is_none() {
                    slot.value = Some((shared.factory)());
                    slot.created_at = now;
                    slot.alloc_count = 0;
                    if let Some(m) = self.m() {
                        m.record_creation(1);
                    }
                    true
                } else {
                    false
                }
            };

            if let Some(validator) = &opts.validator {
                let valid = core.slots[idx]
                    .as_ref()
                    .and_then(|s| s.value.as_ref())
                    .map(|v| validator(v))
                    .unwrap_or(false);
                if !valid {
                    rejected += 1;
                    if let Some(m) = self.m() {
                        m.record_validation_failure();
                    }
                    self.vacate(&mut core, idx, false);
                    if freshly_created {
                        // The factory itself produces invalid objects;
                        // retrying cannot converge.
                        return Err(PoolError::ValidationFailed {
                            name: opts.name.clone(),
                            rejected,
                        });
                    }
                    continue;
                }
            }

            let ticket = core.next_ticket;
            core.next_ticket += 1;
            let slot = match core.slots[idx].as_mut() {
                Some(s) => s,
                None => {
                    return Err(PoolError::InternalError {
                        name: opts.name.clone(),
                        reason: "selected slot vanished".into(),
                    })
                }
            };
            slot.status = SlotStatus::Allocated;
            slot.last_accessed = now;
            slot.alloc_count += 1;
            slot.ticket = ticket;
            let mut value = match slot.value.take() {
                Some(v) => v,
                None => {
                    return Err(PoolError::InternalError {
                        name: opts.name.clone(),
                        reason: "free slot had no value".into(),
                    })
                }
            };
            core.free_count -= 1;
            core.allocated_count += 1;

            if let Some(hook) = &opts.hooks.on_acquire {
                hook(&mut value);
            }
            if let Some(m) = self.m() {
                m.record_allocation();
                m.record_high_water(core.allocated_count);
                if !expanded && !freshly_created {
                    m.record_hit();
                }
            }

            // Occupancy above the high watermark: grow ahead of the next miss.
            if opts.auto_expand
                && core.total() < opts.max_capacity
                && core.free_count == 0
                && occupancy(&core) > opts.high_watermark_ratio
            {
                self.expand(&mut core, now);
            }

            return Ok(Some(PoolItem {
                value: Some(value),
                slot: idx as u32,
                ticket,
                pool_id: shared.id,
            }));
        }
    }

    /// Return a loan to the pool
    ///
    /// Fails with `ForeignObject` when the loan came from another pool and
    /// `AlreadyReleased` when its slot was reclaimed in the meantime
    /// (`release_all`, `resize`, `dispose`). Silent no-op on a disposed pool.
    pub fn release(&self, mut item: PoolItem<T>) -> Result<(), PoolError> {
        let shared = &self.shared;
        let opts = &shared.options;
        let started = shared.clock.now_micros();
        let mut core = shared.core.lock();
        if core.disposed {
            return Ok(());
        }
        if item.pool_id != shared.id {
            return Err(PoolError::ForeignObject {
                name: opts.name.clone(),
            });
        }

        let idx = item.slot as usize;
        let live = core
            .slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .map(|s| s.ticket == item.ticket && s.status == SlotStatus::Allocated)
            .unwrap_or(false);
        if !live {
            return Err(PoolError::AlreadyReleased {
                name: opts.name.clone(),
            });
        }

        let mut value = match item.value.take() {
            Some(v) => v,
            None => {
                return Err(PoolError::InternalError {
                    name: opts.name.clone(),
                    reason: "loan carried no value".into(),
                })
            }
        };

        let now = shared.clock.now_millis();
        let mut retained = true;
        if opts.reset_on_recycle {
            let reset_ok = catch_unwind(AssertUnwindSafe(|| value.reset())).is_ok();
            if !reset_ok {
                // Object state is unknown after a panicking reset; drop it
                // and let the slot refill lazily.
                retained = false;
                if let Some(m) = self.m() {
                    m.record_reset_failure();
                }
                tracing::warn!(
                    target: "pool",
                    pool = %opts.name,
                    "reset panicked; discarding object"
                );
            }
        }
        if retained {
            if let Some(hook) = &opts.hooks.on_release {
                hook(&mut value);
            }
        }

        let mut lifetime = 0;
        if let Some(slot) = core.slots[idx].as_mut() {
            lifetime = now.saturating_sub(slot.last_accessed);
            slot.value = retained.then_some(value);
            slot.status = SlotStatus::Free;
            slot.last_accessed = now;
        }
        core.allocated_count -= 1;
        core.free_count += 1;
        if let Some(m) = self.m() {
            m.record_release();
            m.record_lifetime(lifetime);
            m.record_release_time(shared.clock.now_micros().saturating_sub(started));
        }

        // Low occupancy: trim surplus free slots toward min_free.
        if occupancy(&core) < opts.low_watermark_ratio
            && core.total() > opts.initial_capacity
            && core.free_count > opts.min_free
        {
            self.compact_free(&mut core, opts.min_free.max(opts.initial_capacity));
        }

        drop(core);
        shared.notify.notify_one();
        Ok(())
    }

    /// Release every allocated slot back to free; never fails
    ///
    /// Outstanding loans are orphaned: their eventual `release` reports
    /// `AlreadyReleased` and their objects are dropped by the borrower.
    pub fn release_all(&self) {
        let shared = &self.shared;
        let mut core = shared.core.lock();
        if core.disposed {
            return;
        }
        let now = shared.clock.now_millis();
        let mut released = 0u64;
        for slot in core.slots.iter_mut().flatten() {
            if slot.status == SlotStatus::Allocated {
                slot.status = SlotStatus::Free;
                slot.last_accessed = now;
                slot.ticket = 0;
                released += 1;
            }
        }
        core.free_count += released as usize;
        core.allocated_count -= released as usize;
        if let Some(m) = self.m() {
            for _ in 0..released {
                m.record_release();
            }
        }
        drop(core);
        shared.notify.notify_waiters();
    }

    /// Discard all currently-free slots; allocated slots persist
    pub fn drain(&self) {
        let mut core = self.shared.core.lock();
        if core.disposed {
            return;
        }
        let free: Vec<usize> = indices_with_status(&core, SlotStatus::Free);
        for idx in free {
            self.vacate(&mut core, idx, true);
        }
    }

    /// Discard every slot; fails while objects are loaned out
    pub fn clear(&self) -> Result<(), PoolError> {
        let mut core = self.shared.core.lock();
        if core.disposed {
            return Err(PoolError::PoolDisposed {
                name: self.shared.options.name.clone(),
            });
        }
        if core.allocated_count > 0 {
            return Err(PoolError::InUseDuringOperation {
                name: self.shared.options.name.clone(),
                allocated: core.allocated_count,
                operation: "clear",
            });
        }
        core.slots.clear();
        core.vacant.clear();
        core.free_count = 0;
        core.rr_cursor = 0;
        Ok(())
    }

    /// Grow or shrink total capacity; shrink discards free slots only
    pub fn resize(&self, new_total: usize) -> Result<(), PoolError> {
        let shared = &self.shared;
        let opts = &shared.options;
        let mut core = shared.core.lock();
        if core.disposed {
            return Err(PoolError::PoolDisposed {
                name: opts.name.clone(),
            });
        }
        if new_total > opts.max_capacity {
            return Err(PoolError::InvalidOperation {
                name: opts.name.clone(),
                reason: format!(
                    "resize({}) exceeds max_capacity {}",
                    new_total, opts.max_capacity
                ),
            });
        }

        let now = shared.clock.now_millis();
        let total = core.total();
        if new_total > total {
            let mut created = 0u64;
            for _ in total..new_total {
                self.insert_free_slot(&mut core, (shared.factory)(), now);
                created += 1;
            }
            if let Some(m) = self.m() {
                m.record_creation(created);
                m.record_expansion();
            }
        } else if new_total < total {
            let floor = new_total.max(core.allocated_count + core.reserved_count);
            let amount = floor.saturating_sub(core.allocated_count);
            self.compact_free(&mut core, amount);
            if let Some(m) = self.m() {
                m.record_contraction();
            }
        }
        Ok(())
    }

    /// Vacate free slots until at most `min_free` remain, respecting the
    /// eviction policy's ordering; never touches allocated slots
    pub fn force_compact(&self) {
        let mut core = self.shared.core.lock();
        if core.disposed {
            return;
        }
        let target = self.shared.options.min_free;
        self.compact_free(&mut core, target);
        if let Some(m) = self.m() {
            m.record_contraction();
        }
    }

    /// Dispose the pool; final and idempotent
    ///
    /// Subsequent `acquire` fails with `PoolDisposed`; `release`,
    /// `release_all`, and `drain` become silent no-ops.
    pub fn dispose(&self) {
        let mut core = self.shared.core.lock();
        if core.disposed {
            return;
        }
        core.disposed = true;
        core.slots.clear();
        core.vacant.clear();
        core.free_count = 0;
        core.allocated_count = 0;
        core.reserved_count = 0;
        drop(core);
        self.shared.notify.notify_waiters();
        tracing::debug!(target: "pool", pool = %self.shared.options.name, "pool disposed");
    }

    /// Whether a loan originated from this pool and is still outstanding
    pub fn is_from_pool(&self, item: &PoolItem<T>) -> bool {
        if item.pool_id != self.shared.id {
            return false;
        }
        let core = self.shared.core.lock();
        core.slots
            .get(item.slot as usize)
            .and_then(|s| s.as_ref())
            .map(|s| s.ticket == item.ticket && s.status == SlotStatus::Allocated)
            .unwrap_or(false)
    }

    /// Acquire, suspending until a slot frees up
    ///
    /// When an `async_factory` is configured it is used to create headroom
    /// instead of waiting, up to `max_capacity`.
    pub async fn acquire_async(&self) -> Result<PoolItem<T>, PoolError> {
        loop {
            if let Some(item) = self.try_acquire()? {
                return Ok(item);
            }

            if let Some(async_factory) = self.shared.options.async_factory.clone() {
                let reserved = {
                    let mut core = self.shared.core.lock();
                    if !core.disposed && core.total() < self.shared.options.max_capacity {
                        core.reserved_count += 1;
                        true
                    } else {
                        false
                    }
                };
                if reserved {
                    let value = async_factory().await;
                    let now = self.shared.clock.now_millis();
                    let mut core = self.shared.core.lock();
                    core.reserved_count -= 1;
                    if core.disposed {
                        return Err(PoolError::PoolDisposed {
                            name: self.shared.options.name.clone(),
                        });
                    }
                    self.insert_free_slot(&mut core, value, now);
                    if let Some(m) = self.m() {
                        m.record_creation(1);
                        m.record_expansion();
                    }
                    continue;
                }
            }

            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            // Re-check after arming the waiter so a release between the
            // failed try and the await cannot be missed.
            if let Some(item) = self.try_acquire()? {
                return Ok(item);
            }
            notified.await;
        }
    }

    /// As `acquire_async`, waiting at most `timeout`; `None` on expiry
    pub async fn try_acquire_async(
        &self,
        timeout: Duration,
    ) -> Result<Option<PoolItem<T>>, PoolError> {
        match tokio::time::timeout(timeout, self.acquire_async()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// As `acquire_async`, failing with `TimeoutExceeded` on expiry
    pub async fn acquire_async_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PoolItem<T>, PoolError> {
        match tokio::time::timeout(timeout, self.acquire_async()).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::TimeoutExceeded {
                name: self.shared.options.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Occupancy snapshot
    pub fn stats(&self) -> PoolStats {
        let core = self.shared.core.lock();
        PoolStats {
            total: core.total(),
            free: core.free_count,
            allocated: core.allocated_count,
            reserved: core.reserved_count,
            max_capacity: self.shared.options.max_capacity,
        }
    }

    /// Metrics snapshot; all-zero when metrics are disabled
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.shared.options.name
    }

    pub fn free_count(&self) -> usize {
        self.shared.core.lock().free_count
    }

    pub fn allocated_count(&self) -> usize {
        self.shared.core.lock().allocated_count
    }

    pub fn total(&self) -> usize {
        self.shared.core.lock().total()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.core.lock().disposed
    }

    // -- internals ---------------------------------------------------------

    fn select_free(&self, core: &mut PoolCore<T>) -> Option<usize> {
        if core.free_count == 0 {
            return None;
        }
        let strategy = self.shared.options.allocation_strategy;
        match strategy {
            AllocationStrategy::FirstAvailable => core
                .slots
                .iter()
                .position(|s| matches!(s, Some(slot) if slot.status == SlotStatus::Free)),
            AllocationStrategy::LeastRecentlyUsed => free_extreme(core, |a, b| a < b),
            AllocationStrategy::MostRecentlyUsed => free_extreme(core, |a, b| a > b),
            AllocationStrategy::RoundRobin => {
                let len = core.slots.len();
                for step in 0..len {
                    let idx = (core.rr_cursor + step) % len;
                    if matches!(&core.slots[idx], Some(slot) if slot.status == SlotStatus::Free) {
                        core.rr_cursor = idx + 1;
                        return Some(idx);
                    }
                }
                None
            }
        }
    }

    fn expand(&self, core: &mut PoolCore<T>, now: u64) {
        let opts = &self.shared.options;
        let total = core.total();
        let target = opts.next_capacity(total);
        let mut created = 0u64;
        for _ in total..target {
            self.insert_free_slot(core, (self.shared.factory)(), now);
            created += 1;
        }
        if created > 0 {
            if let Some(m) = self.m() {
                m.record_creation(created);
                m.record_expansion();
            }
            tracing::debug!(
                target: "pool",
                pool = %opts.name,
                added = created,
                total = core.total(),
                "pool expanded"
            );
        }
    }

    fn insert_free_slot(&self, core: &mut PoolCore<T>, value: T, now: u64) {
        let slot = Slot {
            value: Some(value),
            status: SlotStatus::Free,
            last_accessed: now,
            alloc_count: 0,
            created_at: now,
            ticket: 0,
        };
        if let Some(idx) = core.vacant.pop() {
            core.slots[idx as usize] = Some(slot);
        } else {
            core.slots.push(Some(slot));
        }
        core.free_count += 1;
    }

    /// Remove a slot from the table. Only free slots are ever vacated.
    fn vacate(&self, core: &mut PoolCore<T>, idx: usize, run_evict_hook: bool) {
        if let Some(mut slot) = core.slots[idx].take() {
            if run_evict_hook {
                if let (Some(hook), Some(value)) =
                    (&self.shared.options.hooks.on_evict, slot.value.as_mut())
                {
                    hook(value);
                }
                if let Some(m) = self.m() {
                    m.record_eviction(1);
                }
            }
            core.free_count -= 1;
            core.vacant.push(idx as u32);
        }
    }

    /// Ttl policy: discard free slots whose last access is older than ttl
    fn sweep_expired(&self, core: &mut PoolCore<T>, now: u64) {
        let opts = &self.shared.options;
        if opts.eviction_policy != EvictionPolicy::Ttl {
            return;
        }
        let Some(ttl) = opts.ttl else { return };
        let ttl_ms = ttl.as_millis() as u64;
        let expired: Vec<usize> = core
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(slot)
                    if slot.status == SlotStatus::Free
                        && slot.last_accessed.saturating_add(ttl_ms) < now =>
                {
                    Some(i)
                }
                _ => None,
            })
            .collect();
        for idx in expired {
            self.vacate(core, idx, true);
        }
    }

    /// Discard free slots in eviction-policy order until at most
    /// `target_free` remain
    fn compact_free(&self, core: &mut PoolCore<T>, target_free: usize) {
        if core.free_count <= target_free {
            return;
        }
        let opts = &self.shared.options;
        let now = self.shared.clock.now_millis();
        let mut candidates: Vec<(usize, u64)> = core
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(slot) if slot.status == SlotStatus::Free => {
                    let key = match opts.eviction_policy {
                        EvictionPolicy::Fifo => slot.created_at,
                        // Lru, Ttl, and None all discard the coldest first
                        _ => slot.last_accessed,
                    };
                    Some((i, key))
                }
                _ => None,
            })
            .collect();
        candidates.sort_by_key(|&(_, key)| key);

        if opts.eviction_policy == EvictionPolicy::Ttl {
            if let Some(ttl) = opts.ttl {
                let ttl_ms = ttl.as_millis() as u64;
                candidates.retain(|&(_, key)| key.saturating_add(ttl_ms) < now);
            }
        }

        let excess = core.free_count - target_free;
        for &(idx, _) in candidates.iter().take(excess) {
            self.vacate(core, idx, true);
        }
    }
}

#[inline]
fn occupancy<T>(core: &PoolCore<T>) -> f64 {
    let total = core.total();
    if total == 0 {
        0.0
    } else {
        core.allocated_count as f64 / total as f64
    }
}

fn free_extreme<T>(core: &PoolCore<T>, better: impl Fn(u64, u64) -> bool) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, slot) in core.slots.iter().enumerate() {
        if let Some(slot) = slot {
            if slot.status == SlotStatus::Free {
                match best {
                    Some((_, key)) if !better(slot.last_accessed, key) => {}
                    _ => best = Some((i, slot.last_accessed)),
                }
            }
        }
    }
    best.map(|(i, _)| i)
}

fn indices_with_status<T>(core: &PoolCore<T>, status: SlotStatus) -> Vec<usize> {
    core.slots
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            Some(slot) if slot.status == status => Some(i),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::options::ExpansionStrategy;

    impl Poolable for u64 {
        fn reset(&mut self) {
            *self = 0;
        }
    }

    fn small_pool() -> ObjectPool<Vec<u8>> {
        ObjectPool::new(
            PoolOptions {
                name: "test".into(),
                initial_capacity: 4,
                max_capacity: 8,
                auto_expand: false,
                ..Default::default()
            },
            || vec![0u8; 16],
        )
    }

    #[test]
    fn test_preallocation() {
        let pool = small_pool();
        let stats = pool.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.free, 4);
        assert_eq!(stats.allocated, 0);
    }

    #[test]
    fn test_acquire_release_roundtrip() {
        let pool = small_pool();
        let mut item = pool.acquire().unwrap();
        item.push(1);
        assert_eq!(pool.allocated_count(), 1);
        assert!(pool.is_from_pool(&item));

        pool.release(item).unwrap();
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), 4);

        // reset_on_recycle cleared the vec
        let item = pool.acquire().unwrap();
        assert!(item.is_empty());
        pool.release(item).unwrap();
    }

    #[test]
    fn test_depletion_without_expansion() {
        let pool = small_pool();
        let items: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        assert!(matches!(
            pool.acquire(),
            Err(PoolError::PoolDepleted { .. })
        ));
        assert!(pool.try_acquire().unwrap().is_none());
        for item in items {
            pool.release(item).unwrap();
        }
    }

    #[test]
    fn test_auto_expansion() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "grow".into(),
                initial_capacity: 2,
                max_capacity: 16,
                expansion_strategy: ExpansionStrategy::Multiplicative,
                expansion_factor: 2.0,
                ..Default::default()
            },
            || 0u64,
        );

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap(); // triggers expansion
        assert!(pool.total() > 2);
        assert!(pool.metrics().expansions >= 1);
        for item in [a, b, c] {
            pool.release(item).unwrap();
        }
    }

    #[test]
    fn test_foreign_object_rejected() {
        let pool_a = small_pool();
        let pool_b = small_pool();
        let item = pool_a.acquire().unwrap();
        assert!(matches!(
            pool_b.release(item),
            Err(PoolError::ForeignObject { .. })
        ));
    }

    #[test]
    fn test_release_after_release_all() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        pool.release_all();
        assert_eq!(pool.free_count(), 4);
        // The loan was orphaned by release_all
        assert!(matches!(
            pool.release(item),
            Err(PoolError::AlreadyReleased { .. })
        ));
    }

    #[test]
    fn test_clear_fails_while_in_use() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        assert!(matches!(
            pool.clear(),
            Err(PoolError::InUseDuringOperation { .. })
        ));
        pool.release(item).unwrap();
        pool.clear().unwrap();
        assert_eq!(pool.total(), 0);
    }

    #[test]
    fn test_drain_preserves_allocated() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        pool.drain();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.allocated_count(), 1);
        pool.release(item).unwrap();
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_resize_shrink_keeps_allocated() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        pool.resize(1).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert!(stats.total <= 2);
        pool.release(item).unwrap();
    }

    #[test]
    fn test_dispose_semantics() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        pool.dispose();
        pool.dispose(); // idempotent
        assert!(matches!(
            pool.acquire(),
            Err(PoolError::PoolDisposed { .. })
        ));
        // Silent no-ops after dispose
        assert!(pool.release(item).is_ok());
        pool.release_all();
        pool.drain();
    }

    #[test]
    fn test_validator_discards_and_errors() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "validated".into(),
                initial_capacity: 2,
                auto_expand: false,
                validator: Some(Arc::new(|v: &Vec<u8>| !v.is_empty())),
                ..Default::default()
            },
            Vec::new,
        );
        // Factory makes empty vecs which the validator rejects
        assert!(matches!(
            pool.acquire(),
            Err(PoolError::ValidationFailed { .. })
        ));
        assert!(pool.metrics().validation_failures >= 1);
    }

    #[test]
    fn test_lru_allocation_strategy() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "lru".into(),
                initial_capacity: 2,
                auto_expand: false,
                allocation_strategy: AllocationStrategy::LeastRecentlyUsed,
                ..Default::default()
            },
            || vec![0u8; 4],
        );
        // Touch slot order: acquire+release both, then the least recently
        // released slot comes back first.
        let a = pool.acquire().unwrap();
        let a_slot = a.slot;
        std::thread::sleep(Duration::from_millis(2));
        pool.release(a).unwrap();
        let b = pool.acquire().unwrap();
        let b_slot = b.slot;
        // b was the stale slot, not the one just released
        assert_ne!(a_slot, b_slot);
        pool.release(b).unwrap();
    }

    #[test]
    fn test_hooks_fire() {
        use std::sync::atomic::AtomicUsize;
        let acquired = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&acquired);
        let r = Arc::clone(&released);
        let pool = ObjectPool::new(
            PoolOptions {
                name: "hooked".into(),
                initial_capacity: 1,
                auto_expand: false,
                hooks: crate::pool::options::PoolHooks {
                    on_acquire: Some(Arc::new(move |_: &mut Vec<u8>| {
                        a.fetch_add(1, Ordering::Relaxed);
                    })),
                    on_release: Some(Arc::new(move |_: &mut Vec<u8>| {
                        r.fetch_add(1, Ordering::Relaxed);
                    })),
                    ..Default::default()
                },
                ..Default::default()
            },
            Vec::new,
        );
        let item = pool.acquire().unwrap();
        pool.release(item).unwrap();
        assert_eq!(acquired.load(Ordering::Relaxed), 1);
        assert_eq!(released.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_metrics_hit_ratio() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        pool.release(item).unwrap();
        let snap = pool.metrics();
        assert_eq!(snap.hits, 1);
        assert!(snap.hit_ratio > 0.99);
    }

    #[test]
    fn test_slot_conservation_invariant() {
        // free + allocated + reserved == total after arbitrary traffic
        let pool = ObjectPool::new(
            PoolOptions {
                name: "conserve".into(),
                initial_capacity: 4,
                max_capacity: 32,
                ..Default::default()
            },
            || vec![0u8; 8],
        );
        let mut held = Vec::new();
        for round in 0..50 {
            if round % 3 == 0 && !held.is_empty() {
                pool.release(held.pop().unwrap()).unwrap();
            } else {
                held.push(pool.acquire().unwrap());
            }
            let stats = pool.stats();
            assert_eq!(stats.free + stats.allocated + stats.reserved, stats.total);
        }
        for item in held {
            pool.release(item).unwrap();
        }
    }

    #[test]
    fn test_round_robin_cycles_slots() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "rr".into(),
                initial_capacity: 3,
                auto_expand: false,
                allocation_strategy: AllocationStrategy::RoundRobin,
                ..Default::default()
            },
            || vec![0u8; 4],
        );
        let mut seen = Vec::new();
        for _ in 0..3 {
            let item = pool.acquire().unwrap();
            seen.push(item.slot);
            pool.release(item).unwrap();
        }
        // The cursor advances instead of reusing the freshest slot
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_mru_prefers_freshest_slot() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "mru".into(),
                initial_capacity: 2,
                auto_expand: false,
                allocation_strategy: AllocationStrategy::MostRecentlyUsed,
                ..Default::default()
            },
            || vec![0u8; 4],
        );
        let a = pool.acquire().unwrap();
        let a_slot = a.slot;
        std::thread::sleep(Duration::from_millis(2));
        pool.release(a).unwrap();
        // The just-released slot is the warmest
        let b = pool.acquire().unwrap();
        assert_eq!(b.slot, a_slot);
        pool.release(b).unwrap();
    }

    #[test]
    fn test_ttl_eviction_sweeps_expired() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "ttl".into(),
                initial_capacity: 3,
                min_free: 0,
                eviction_policy: EvictionPolicy::Ttl,
                ttl: Some(Duration::from_millis(5)),
                ..Default::default()
            },
            || vec![0u8; 4],
        );
        assert_eq!(pool.free_count(), 3);
        std::thread::sleep(Duration::from_millis(10));
        // The sweep runs on the next acquire; expired slots are vacated
        // and one fresh object is created to serve the request.
        let item = pool.acquire().unwrap();
        assert!(pool.metrics().evictions >= 2);
        pool.release(item).unwrap();
    }

    #[test]
    fn test_force_compact_respects_min_free() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "compact".into(),
                initial_capacity: 8,
                min_free: 2,
                auto_expand: false,
                ..Default::default()
            },
            || vec![0u8; 4],
        );
        pool.force_compact();
        assert_eq!(pool.free_count(), 2);
        assert!(pool.metrics().evictions >= 6);
        // Compaction never touches allocated slots
        let item = pool.acquire().unwrap();
        pool.force_compact();
        assert_eq!(pool.allocated_count(), 1);
        pool.release(item).unwrap();
    }

    #[test]
    fn test_fifo_compaction_discards_oldest_first() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "fifo".into(),
                initial_capacity: 2,
                max_capacity: 4,
                min_free: 3,
                eviction_policy: EvictionPolicy::Fifo,
                ..Default::default()
            },
            || vec![0u8; 4],
        );
        // Grow past the initial pair so the slots have two creation ages
        let held: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        for item in held {
            pool.release(item).unwrap();
        }
        pool.force_compact();
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_reset_on_recycle_disabled_keeps_state() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "dirty".into(),
                initial_capacity: 1,
                auto_expand: false,
                reset_on_recycle: false,
                ..Default::default()
            },
            Vec::new,
        );
        let mut item = pool.acquire().unwrap();
        item.push(9u8);
        pool.release(item).unwrap();
        let item = pool.acquire().unwrap();
        assert_eq!(*item, vec![9u8]);
        pool.release(item).unwrap();
    }

    #[test]
    fn test_timing_metrics_recorded() {
        let pool = small_pool();
        let item = pool.acquire().unwrap();
        pool.release(item).unwrap();
        let snap = pool.metrics();
        assert_eq!(snap.acquire.count, 1);
        assert_eq!(snap.release.count, 1);
        assert!(snap.acquire.min_micros <= snap.acquire.max_micros);
    }

    #[tokio::test]
    async fn test_acquire_async_waits_for_release() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "async".into(),
                initial_capacity: 1,
                max_capacity: 1,
                auto_expand: false,
                ..Default::default()
            },
            || vec![0u8; 8],
        );
        let item = pool.acquire().unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire_async().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(item).unwrap();

        let item = waiter.await.unwrap().unwrap();
        pool.release(item).unwrap();
    }

    #[tokio::test]
    async fn test_try_acquire_async_times_out() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "timeout".into(),
                initial_capacity: 1,
                max_capacity: 1,
                auto_expand: false,
                ..Default::default()
            },
            || vec![0u8; 8],
        );
        let _held = pool.acquire().unwrap();
        let got = pool
            .try_acquire_async(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());

        let err = pool
            .acquire_async_with_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::TimeoutExceeded { .. }));
    }

    #[tokio::test]
    async fn test_async_factory_creates_headroom() {
        let pool = ObjectPool::new(
            PoolOptions {
                name: "asyncfac".into(),
                initial_capacity: 1,
                max_capacity: 2,
                auto_expand: false,
                async_factory: Some(Arc::new(|| {
                    Box::pin(async { vec![7u8; 8] }) as futures_util::future::BoxFuture<'static, _>
                })),
                ..Default::default()
            },
            || vec![0u8; 8],
        );
        let first = pool.acquire().unwrap();
        // Sync path is exhausted; async factory supplies the second object
        let second = pool.acquire_async().await.unwrap();
        assert_eq!(second[0], 7);
        pool.release(first).unwrap();
        pool.release(second).unwrap();
    }
}
