//! Buffer error taxonomy

use thiserror::Error;

/// Errors surfaced by `ByteBuffer`, `TypedView`, and `BufferPool` sizing
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("write of {requested} bytes exceeds remaining capacity {available}")]
    Overflow { requested: usize, available: usize },

    #[error("read of {requested} bytes exceeds remaining {available}")]
    Underflow { requested: usize, available: usize },

    #[error("write attempted on read-only buffer")]
    ReadOnly,

    #[error("reset called without a mark")]
    InvalidMark,

    #[error("invalid alignment {alignment}: must be a power of two within bounds")]
    Alignment { alignment: usize },

    #[error("operation on released buffer")]
    Released,

    #[error("buffer in state '{state}' cannot perform {operation}")]
    State {
        state: &'static str,
        operation: &'static str,
    },

    #[error("capacity {requested} outside supported range (max {max})")]
    Capacity { requested: usize, max: usize },

    #[error("range [{begin}, {end}) out of bounds for length {len}")]
    Range {
        begin: usize,
        end: usize,
        len: usize,
    },

    #[error("JSON codec failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("string codec produced invalid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl BufferError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::Overflow { .. } => "BUFFER_OVERFLOW",
            BufferError::Underflow { .. } => "BUFFER_UNDERFLOW",
            BufferError::ReadOnly => "BUFFER_READ_ONLY",
            BufferError::InvalidMark => "BUFFER_INVALID_MARK",
            BufferError::Alignment { .. } => "BUFFER_ALIGNMENT",
            BufferError::Released => "BUFFER_RELEASED",
            BufferError::State { .. } => "BUFFER_STATE",
            BufferError::Capacity { .. } => "BUFFER_CAPACITY",
            BufferError::Range { .. } => "BUFFER_RANGE",
            BufferError::Json(_) => "BUFFER_JSON",
            BufferError::Utf8(_) => "BUFFER_UTF8",
        }
    }
}
