//! Object pool configuration
//!
//! Plain option structs with defaults, following the crate's config style.
//! Hooks and the validator are shared closures so options can be cloned
//! into the pool without re-wiring callbacks.

use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the pool grows when a miss occurs and expansion is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStrategy {
    /// Add `expansion_rate` slots
    Fixed,
    /// Multiply total by `expansion_factor`
    Multiplicative,
    /// Grow to the next Fibonacci number above the current total
    Fibonacci,
    /// Grow to the next prime above the current total
    Prime,
}

/// How a free slot is chosen on acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Any free slot
    FirstAvailable,
    /// Smallest `last_accessed`
    LeastRecentlyUsed,
    /// Largest `last_accessed`
    MostRecentlyUsed,
    /// Advancing cursor over the slot table
    RoundRobin,
}

/// Which free slots are discarded under memory pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Never evict
    None,
    /// Evict the free slot with the smallest `last_accessed`
    Lru,
    /// Evict free slots with `last_accessed + ttl < now`
    Ttl,
    /// Evict by `created_at`
    Fifo,
}

/// Shared object validator
pub type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Shared lifecycle hook receiving the object
pub type ObjectHook<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Hook invoked when the pool cannot satisfy a request; receives the
/// allocated slot count at the time of the failure
pub type OutOfMemoryHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Factory producing objects asynchronously, used by the async acquire path
pub type AsyncFactory<T> = Arc<dyn Fn() -> BoxFuture<'static, T> + Send + Sync>;

/// Lifecycle hooks
pub struct PoolHooks<T> {
    pub on_acquire: Option<ObjectHook<T>>,
    pub on_release: Option<ObjectHook<T>>,
    pub on_evict: Option<ObjectHook<T>>,
    pub on_out_of_memory: Option<OutOfMemoryHook>,
}

// Manual impls: the shared closures clone without any bound on T
impl<T> Clone for PoolHooks<T> {
    fn clone(&self) -> Self {
        Self {
            on_acquire: self.on_acquire.clone(),
            on_release: self.on_release.clone(),
            on_evict: self.on_evict.clone(),
            on_out_of_memory: self.on_out_of_memory.clone(),
        }
    }
}

impl<T> Default for PoolHooks<T> {
    fn default() -> Self {
        Self {
            on_acquire: None,
            on_release: None,
            on_evict: None,
            on_out_of_memory: None,
        }
    }
}

impl<T> fmt::Debug for PoolHooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHooks")
            .field("on_acquire", &self.on_acquire.is_some())
            .field("on_release", &self.on_release.is_some())
            .field("on_evict", &self.on_evict.is_some())
            .field("on_out_of_memory", &self.on_out_of_memory.is_some())
            .finish()
    }
}

/// Full option set for an `ObjectPool`
pub struct PoolOptions<T> {
    /// Name used in errors, logs, and metrics
    pub name: String,
    /// Slots created up front when `preallocate` is set
    pub initial_capacity: usize,
    /// Hard ceiling on total slots
    pub max_capacity: usize,
    /// Free slots `force_compact` keeps around
    pub min_free: usize,
    /// Allocated/total ratio above which expansion is preferred on a miss
    pub high_watermark_ratio: f64,
    /// Allocated/total ratio below which free slots are trimmed toward `min_free`
    pub low_watermark_ratio: f64,
    pub expansion_strategy: ExpansionStrategy,
    /// Multiplier for `Multiplicative` expansion
    pub expansion_factor: f64,
    /// Step for `Fixed` expansion
    pub expansion_rate: usize,
    pub allocation_strategy: AllocationStrategy,
    pub eviction_policy: EvictionPolicy,
    /// Age bound for the `Ttl` policy
    pub ttl: Option<Duration>,
    /// Reset objects when they come back (default true)
    pub reset_on_recycle: bool,
    pub validator: Option<Validator<T>>,
    /// Create `initial_capacity` objects at construction
    pub preallocate: bool,
    /// Expand on miss instead of failing
    pub auto_expand: bool,
    pub enable_metrics: bool,
    pub hooks: PoolHooks<T>,
    /// Optional async factory used by `acquire_async` for expansion
    pub async_factory: Option<AsyncFactory<T>>,
}

impl<T> Default for PoolOptions<T> {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            initial_capacity: 16,
            max_capacity: 4096,
            min_free: 4,
            high_watermark_ratio: 0.85,
            low_watermark_ratio: 0.25,
            expansion_strategy: ExpansionStrategy::Multiplicative,
            expansion_factor: 2.0,
            expansion_rate: 16,
            allocation_strategy: AllocationStrategy::FirstAvailable,
            eviction_policy: EvictionPolicy::None,
            ttl: None,
            reset_on_recycle: true,
            validator: None,
            preallocate: true,
            auto_expand: true,
            enable_metrics: true,
            hooks: PoolHooks::default(),
            async_factory: None,
        }
    }
}

impl<T> Clone for PoolOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            initial_capacity: self.initial_capacity,
            max_capacity: self.max_capacity,
            min_free: self.min_free,
            high_watermark_ratio: self.high_watermark_ratio,
            low_watermark_ratio: self.low_watermark_ratio,
            expansion_strategy: self.expansion_strategy,
            expansion_factor: self.expansion_factor,
            expansion_rate: self.expansion_rate,
            allocation_strategy: self.allocation_strategy,
            eviction_policy: self.eviction_policy,
            ttl: self.ttl,
            reset_on_recycle: self.reset_on_recycle,
            validator: self.validator.clone(),
            preallocate: self.preallocate,
            auto_expand: self.auto_expand,
            enable_metrics: self.enable_metrics,
            hooks: self.hooks.clone(),
            async_factory: self.async_factory.clone(),
        }
    }
}

impl<T> PoolOptions<T> {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by the loaded configuration
    pub fn from_config(name: impl Into<String>, config: &crate::infrastructure::config::PoolConfig) -> Self {
        Self {
            name: name.into(),
            initial_capacity: config.initial_capacity,
            max_capacity: config.max_capacity,
            high_watermark_ratio: config.high_watermark_ratio,
            low_watermark_ratio: config.low_watermark_ratio,
            ..Self::default()
        }
    }

    /// Next total slot count under the configured strategy, capped at
    /// `max_capacity`. Always at least `current + 1` so a miss can be served.
    pub fn next_capacity(&self, current: usize) -> usize {
        let grown = match self.expansion_strategy {
            ExpansionStrategy::Fixed => current + self.expansion_rate.max(1),
            ExpansionStrategy::Multiplicative => {
                let scaled = (current as f64 * self.expansion_factor).ceil() as usize;
                scaled.max(current + 1)
            }
            ExpansionStrategy::Fibonacci => next_fibonacci(current),
            ExpansionStrategy::Prime => next_prime(current),
        };
        grown.max(current + 1).min(self.max_capacity)
    }
}

impl<T> fmt::Debug for PoolOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("name", &self.name)
            .field("initial_capacity", &self.initial_capacity)
            .field("max_capacity", &self.max_capacity)
            .field("min_free", &self.min_free)
            .field("expansion_strategy", &self.expansion_strategy)
            .field("allocation_strategy", &self.allocation_strategy)
            .field("eviction_policy", &self.eviction_policy)
            .field("auto_expand", &self.auto_expand)
            .field("preallocate", &self.preallocate)
            .field("validator", &self.validator.is_some())
            .field("async_factory", &self.async_factory.is_some())
            .finish()
    }
}

/// Smallest Fibonacci number strictly greater than `n`
fn next_fibonacci(n: usize) -> usize {
    let (mut a, mut b) = (1usize, 1usize);
    while b <= n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    b
}

/// Smallest prime strictly greater than `n`
fn next_prime(n: usize) -> usize {
    let mut candidate = n.saturating_add(1).max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_expansion() {
        let opts = PoolOptions::<u32> {
            expansion_strategy: ExpansionStrategy::Fixed,
            expansion_rate: 8,
            ..Default::default()
        };
        assert_eq!(opts.next_capacity(16), 24);
    }

    #[test]
    fn test_multiplicative_expansion() {
        let opts = PoolOptions::<u32> {
            expansion_strategy: ExpansionStrategy::Multiplicative,
            expansion_factor: 1.5,
            ..Default::default()
        };
        assert_eq!(opts.next_capacity(16), 24);
        // Factor below 1 still makes progress
        let opts = PoolOptions::<u32> {
            expansion_factor: 0.5,
            ..opts
        };
        assert_eq!(opts.next_capacity(16), 17);
    }

    #[test]
    fn test_fibonacci_expansion() {
        assert_eq!(next_fibonacci(0), 1);
        assert_eq!(next_fibonacci(1), 2);
        assert_eq!(next_fibonacci(8), 13);
        assert_eq!(next_fibonacci(13), 21);
    }

    #[test]
    fn test_prime_expansion() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(16), 17);
        assert_eq!(next_prime(17), 19);
        assert_eq!(next_prime(89), 97);
    }

    #[test]
    fn test_from_config() {
        let config = crate::infrastructure::config::PoolConfig::default();
        let opts = PoolOptions::<String>::from_config("configured", &config);
        assert_eq!(opts.name, "configured");
        assert_eq!(opts.initial_capacity, config.initial_capacity);
        assert_eq!(opts.max_capacity, config.max_capacity);
    }

    #[test]
    fn test_max_capacity_cap() {
        let opts = PoolOptions::<u32> {
            max_capacity: 20,
            expansion_strategy: ExpansionStrategy::Multiplicative,
            expansion_factor: 4.0,
            ..Default::default()
        };
        assert_eq!(opts.next_capacity(16), 20);
    }
}
