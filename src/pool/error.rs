//! Object pool error taxonomy
//!
//! Every variant carries the pool name so callers can tell which of the
//! process-wide pools misbehaved.

use thiserror::Error;

/// Errors surfaced by `ObjectPool` and the bucketed `BufferPool`
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("pool '{name}' is depleted ({allocated}/{total} slots allocated)")]
    PoolDepleted {
        name: String,
        allocated: usize,
        total: usize,
    },

    #[error("pool '{name}' has been disposed")]
    PoolDisposed { name: String },

    #[error("pool '{name}' exhausted candidates: {rejected} objects failed validation")]
    ValidationFailed { name: String, rejected: usize },

    #[error("object does not belong to pool '{name}'")]
    ForeignObject { name: String },

    #[error("object was already released to pool '{name}'")]
    AlreadyReleased { name: String },

    #[error("pool '{name}' has {allocated} objects in use during {operation}")]
    InUseDuringOperation {
        name: String,
        allocated: usize,
        operation: &'static str,
    },

    #[error("pool '{name}' failed to initialize: {reason}")]
    InitializationFailed { name: String, reason: String },

    #[error("pool '{name}' acquire timed out after {timeout_ms} ms")]
    TimeoutExceeded { name: String, timeout_ms: u64 },

    #[error("invalid operation on pool '{name}': {reason}")]
    InvalidOperation { name: String, reason: String },

    #[error("internal error in pool '{name}': {reason}")]
    InternalError { name: String, reason: String },
}

impl PoolError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::PoolDepleted { .. } => "POOL_DEPLETED",
            PoolError::PoolDisposed { .. } => "POOL_DISPOSED",
            PoolError::ValidationFailed { .. } => "VALIDATION_FAILED",
            PoolError::ForeignObject { .. } => "FOREIGN_OBJECT",
            PoolError::AlreadyReleased { .. } => "ALREADY_RELEASED",
            PoolError::InUseDuringOperation { .. } => "IN_USE_DURING_OPERATION",
            PoolError::InitializationFailed { .. } => "INITIALIZATION_FAILED",
            PoolError::TimeoutExceeded { .. } => "TIMEOUT_EXCEEDED",
            PoolError::InvalidOperation { .. } => "INVALID_OPERATION",
            PoolError::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Name of the pool the error originated from
    pub fn pool_name(&self) -> &str {
        match self {
            PoolError::PoolDepleted { name, .. }
            | PoolError::PoolDisposed { name }
            | PoolError::ValidationFailed { name, .. }
            | PoolError::ForeignObject { name }
            | PoolError::AlreadyReleased { name }
            | PoolError::InUseDuringOperation { name, .. }
            | PoolError::InitializationFailed { name, .. }
            | PoolError::TimeoutExceeded { name, .. }
            | PoolError::InvalidOperation { name, .. }
            | PoolError::InternalError { name, .. } => name,
        }
    }
}
