//! Object pooling with watermarks, expansion, and eviction
//!
//! A generic pool of resettable objects with pluggable allocation and
//! eviction policies. The bucketed byte-slab pool in `buffer` builds on
//! this, one pool per bucket.

pub mod error;
pub mod metrics;
pub mod object_pool;
pub mod options;

pub use error::PoolError;
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};
pub use object_pool::{ObjectPool, PoolItem, PoolStats, Poolable, SlotStatus};
pub use options::{
    AllocationStrategy, AsyncFactory, EvictionPolicy, ExpansionStrategy, PoolHooks, PoolOptions,
    Validator,
};
