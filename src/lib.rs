//! High-throughput in-process building blocks for simulation engines
//!
//! Core library for zero-allocation resource pooling, binary codecs,
//! priority-ordered event dispatch, and spatial particle indexing.

pub mod buffer;
pub mod core;
pub mod event;
pub mod infrastructure;
pub mod particle;
pub mod pool;

// Re-export commonly used types
pub use buffer::{BufferPool, ByteBuffer, ByteOrder, TypedView};
pub use event::{EventEmitter, EventPriority, PriorityQueue};
pub use infrastructure::config::SimConfig;
pub use particle::{ParticleBuffer, ParticleId, UniformSpatialGrid};
pub use pool::{ObjectPool, Poolable};

use thiserror::Error;

/// Main error type for the simulation core
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Buffer(#[from] buffer::BufferError),

    #[error(transparent)]
    Pool(#[from] pool::PoolError),

    #[error(transparent)]
    Queue(#[from] event::QueueError),

    #[error(transparent)]
    Particle(#[from] particle::ParticleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Stable machine-readable code for the underlying error
    pub fn code(&self) -> &'static str {
        match self {
            SimError::Buffer(e) => e.code(),
            SimError::Pool(e) => e.code(),
            SimError::Queue(e) => e.code(),
            SimError::Particle(e) => e.code(),
            SimError::Config(_) => "CONFIG_ERROR",
            SimError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SimError>;
