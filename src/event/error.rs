//! Event queue and emitter error taxonomy

use std::fmt;
use thiserror::Error;

/// Boxed error produced by a failing handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler returns
pub type HandlerResult = Result<(), HandlerError>;

/// A handler failure captured during an emission
#[derive(Debug)]
pub struct EventHandlerError {
    /// Event the failing handler was subscribed to
    pub event: String,
    pub source: HandlerError,
}

impl fmt::Display for EventHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler for event '{}' failed: {}", self.event, self.source)
    }
}

impl std::error::Error for EventHandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Errors surfaced by `PriorityQueue` and `EventEmitter`
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue is empty")]
    EmptyQueue,

    #[error("invalid queue capacity {requested}")]
    InvalidCapacity { requested: usize },

    #[error("event buffer full ({capacity} events queued)")]
    QueueFull { capacity: usize },

    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

impl QueueError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::EmptyQueue => "QUEUE_EMPTY",
            QueueError::InvalidCapacity { .. } => "QUEUE_INVALID_CAPACITY",
            QueueError::QueueFull { .. } => "QUEUE_FULL",
            QueueError::Handler(_) => "QUEUE_HANDLER_ERROR",
        }
    }
}
