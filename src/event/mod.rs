//! Priority-ordered eventing
//!
//! A comparator-driven binary heap and the event emitter built on it:
//! priority dispatch, pause/resume buffering, batch operations, and an
//! error-capture channel.

pub mod emitter;
pub mod error;
pub mod priority_queue;
pub mod subscription;

pub use emitter::{
    EmitterMetrics, EmitterMetricsSnapshot, EmitterOptions, EventEmitter, QueuedEvent,
    SubscriptionHandle,
};
pub use error::{EventHandlerError, HandlerError, HandlerResult, QueueError};
pub use priority_queue::{Comparator, PriorityQueue, QueueOptions};
pub use subscription::{DropToken, EventPriority, SubscribeOptions, SubscriptionId};
