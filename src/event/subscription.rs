//! Subscription identity and options

use crate::event::error::HandlerResult;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque subscription identity, unique within an emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    #[inline]
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Dispatch priority; `High` handlers run before `Normal` before `Low`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl EventPriority {
    /// Heap rank; lower dispatches first
    #[inline]
    pub const fn rank(self) -> u8 {
        match self {
            EventPriority::High => 0,
            EventPriority::Normal => 1,
            EventPriority::Low => 2,
        }
    }
}

/// Options for `on` / `once`
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    pub priority: EventPriority,
    pub once: bool,
}

impl SubscribeOptions {
    pub fn priority(priority: EventPriority) -> Self {
        Self {
            priority,
            once: false,
        }
    }
}

/// Liveness token for weak subscriptions
///
/// The subscriber keeps the token and invalidates it when the handler's
/// target goes away; the emitter's sweep drops the subscription.
#[derive(Debug, Clone)]
pub struct DropToken(Arc<AtomicBool>);

impl DropToken {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Mark the subscription dead; idempotent
    pub fn invalidate(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Stored handler: every callback is normalised to a future-returning form
pub(crate) type BoxedHandler<T> =
    Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A registered subscription
pub(crate) struct Subscription<T> {
    pub id: SubscriptionId,
    pub callback: BoxedHandler<T>,
    pub once: bool,
    pub priority: EventPriority,
    /// Tie-break within a priority class
    pub insertion: u64,
    pub execution_count: u64,
    pub last_executed_at: Option<u64>,
    #[allow(dead_code)]
    pub created_at: u64,
    /// Present when the emitter runs with weak references
    pub drop_token: Option<DropToken>,
}

impl<T> Subscription<T> {
    pub fn is_alive(&self) -> bool {
        self.drop_token.as_ref().map(DropToken::is_alive).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ranks() {
        assert!(EventPriority::High.rank() < EventPriority::Normal.rank());
        assert!(EventPriority::Normal.rank() < EventPriority::Low.rank());
    }

    #[test]
    fn test_drop_token() {
        let token = DropToken::new();
        assert!(token.is_alive());
        token.invalidate();
        token.invalidate();
        assert!(!token.is_alive());
    }
}
