//! Priority-ordered event emitter with pause/resume buffering
//!
//! Handlers for a single emission run in priority order (`High`, `Normal`,
//! `Low`), insertion order within a class. While paused (or with immediate
//! dispatch off) emissions land in a bounded priority queue and drain on
//! resume in `(priority, timestamp, sequence)` order.

use crate::core::Clock;
use crate::event::error::{EventHandlerError, HandlerResult, QueueError};
use crate::event::priority_queue::{PriorityQueue, QueueOptions};
use crate::event::subscription::{
    BoxedHandler, DropToken, EventPriority, SubscribeOptions, Subscription, SubscriptionId,
};
use crate::infrastructure::config::EmitterConfig;
use crate::infrastructure::{OpStats, OpStatsSnapshot};
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::task::noop_waker_ref;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Emitter configuration
#[derive(Debug, Clone)]
pub struct EmitterOptions {
    /// Redirect handler failures to the error channel instead of
    /// propagating them out of `emit`
    pub capture_rejections: bool,
    /// Soft cap per event; exceeding logs a warning
    pub max_listeners: usize,
    /// Hand each subscription a drop token and sweep invalidated ones
    pub weak_references: bool,
    /// When false, every emission is buffered until drained
    pub immediate_dispatch: bool,
    /// Bound on in-flight handler executions across all events
    pub concurrency_limit: Option<usize>,
    /// Total bound on queued events while paused
    pub buffer_size: usize,
    /// Sweep cadence for dead handlers and empty event entries
    pub gc_interval: Duration,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            capture_rejections: false,
            max_listeners: 10,
            weak_references: false,
            immediate_dispatch: true,
            concurrency_limit: None,
            buffer_size: 1000,
            gc_interval: Duration::from_millis(60_000),
        }
    }
}

impl EmitterOptions {
    /// Defaults overridden by the loaded configuration
    pub fn from_config(config: &EmitterConfig) -> Self {
        Self {
            max_listeners: config.max_listeners,
            buffer_size: config.buffer_size,
            gc_interval: Duration::from_millis(config.gc_interval_ms),
            ..Self::default()
        }
    }
}

/// Heap key: (priority rank, enqueue timestamp, sequence)
type QueueKey = (u8, u64, u64);

/// An emission parked in the pause buffer
pub struct QueuedEvent<T> {
    pub sequence: u64,
    pub event: String,
    pub payload: Arc<T>,
    pub timestamp: u64,
    pub priority: EventPriority,
}

impl<T> QueuedEvent<T> {
    fn key(&self) -> QueueKey {
        (self.priority.rank(), self.timestamp, self.sequence)
    }
}

impl<T> Clone for QueuedEvent<T> {
    fn clone(&self) -> Self {
        Self {
            sequence: self.sequence,
            event: self.event.clone(),
            payload: Arc::clone(&self.payload),
            timestamp: self.timestamp,
            priority: self.priority,
        }
    }
}

impl<T> std::fmt::Debug for QueuedEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("sequence", &self.sequence)
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

struct ErrorSubscription {
    id: SubscriptionId,
    callback: Arc<dyn Fn(&EventHandlerError) + Send + Sync>,
    priority: EventPriority,
    insertion: u64,
}

struct EmitterCore<T> {
    subscriptions: HashMap<String, Vec<Subscription<T>>>,
    error_subs: Vec<ErrorSubscription>,
    queue: PriorityQueue<QueuedEvent<T>, QueueKey>,
    paused: bool,
    last_gc: u64,
}

/// Emission/handler counters
#[derive(Debug, Default)]
pub struct EmitterMetrics {
    emissions: AtomicU64,
    buffered: AtomicU64,
    handler_invocations: AtomicU64,
    handler_errors: AtomicU64,
    emission_stats: OpStats,
    handler_stats: OpStats,
}

/// Snapshot of emitter metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitterMetricsSnapshot {
    pub emissions: u64,
    pub buffered: u64,
    pub handler_invocations: u64,
    pub handler_errors: u64,
    pub emission: OpStatsSnapshot,
    pub handler: OpStatsSnapshot,
}

struct EmitterShared<T> {
    core: Mutex<EmitterCore<T>>,
    options: EmitterOptions,
    semaphore: Option<Arc<Semaphore>>,
    clock: Clock,
    metrics: EmitterMetrics,
    sequence: AtomicU64,
    ids: AtomicU64,
    insertions: AtomicU64,
    disposed: AtomicBool,
}

/// Typed publish/subscribe with priority-ordered dispatch
///
/// Cloning shares the emitter. Payloads are distributed as `Arc<T>`.
///
/// # Example
/// ```
/// use sim_core::event::{EventEmitter, SubscribeOptions};
///
/// # tokio_test::block_on(async {
/// let emitter: EventEmitter<u32> = EventEmitter::with_defaults();
/// let sub = emitter.on("tick", |n| {
///     assert_eq!(*n, 42);
///     Ok(())
/// }, SubscribeOptions::default());
/// assert!(emitter.emit("tick", 42).await.unwrap());
/// sub.unsubscribe();
/// # });
/// ```
pub struct EventEmitter<T> {
    shared: Arc<EmitterShared<T>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Removal guard returned by `on` / `once` / `on_error`
pub struct SubscriptionHandle<T> {
    id: SubscriptionId,
    shared: Weak<EmitterShared<T>>,
    token: Option<DropToken>,
}

/// Snapshot of one handler for a dispatch pass
struct HandlerEntry<T> {
    id: SubscriptionId,
    callback: BoxedHandler<T>,
    token: Option<DropToken>,
}

impl<T> HandlerEntry<T> {
    fn is_alive(&self) -> bool {
        self.token.as_ref().map(DropToken::is_alive).unwrap_or(true)
    }
}

impl<T: Send + Sync + 'static> EventEmitter<T> {
    pub fn new(options: EmitterOptions) -> Self {
        let semaphore = options
            .concurrency_limit
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        Self {
            shared: Arc::new(EmitterShared {
                core: Mutex::new(EmitterCore {
                    subscriptions: HashMap::new(),
                    error_subs: Vec::new(),
                    queue: PriorityQueue::with_options(
                        Arc::new(|a: &QueueKey, b: &QueueKey| a.cmp(b)),
                        QueueOptions {
                            initial_capacity: 0,
                            auto_trim: true,
                        },
                    ),
                    paused: false,
                    last_gc: 0,
                }),
                options,
                semaphore,
                clock: Clock::new(),
                metrics: EmitterMetrics::default(),
                sequence: AtomicU64::new(0),
                ids: AtomicU64::new(1),
                insertions: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EmitterOptions::default())
    }

    // -- subscription ------------------------------------------------------

    /// Subscribe a synchronous handler; returns a removal guard
    pub fn on<F>(&self, event: &str, callback: F, opts: SubscribeOptions) -> SubscriptionHandle<T>
    where
        F: Fn(Arc<T>) -> HandlerResult + Send + Sync + 'static,
    {
        let boxed: BoxedHandler<T> =
            Arc::new(move |payload| future::ready(callback(payload)).boxed());
        self.subscribe_boxed(event, boxed, opts)
    }

    /// Subscribe a future-returning handler
    pub fn on_async<F>(
        &self,
        event: &str,
        callback: F,
        opts: SubscribeOptions,
    ) -> SubscriptionHandle<T>
    where
        F: Fn(Arc<T>) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
    {
        self.subscribe_boxed(event, Arc::new(callback), opts)
    }

    /// Subscribe for exactly one emission
    pub fn once<F>(&self, event: &str, callback: F, opts: SubscribeOptions) -> SubscriptionHandle<T>
    where
        F: Fn(Arc<T>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(
            event,
            callback,
            SubscribeOptions {
                once: true,
                ..opts
            },
        )
    }

    fn subscribe_boxed(
        &self,
        event: &str,
        callback: BoxedHandler<T>,
        opts: SubscribeOptions,
    ) -> SubscriptionHandle<T> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return SubscriptionHandle {
                id: SubscriptionId(0),
                shared: Weak::new(),
                token: None,
            };
        }
        let id = SubscriptionId(self.shared.ids.fetch_add(1, Ordering::Relaxed));
        let insertion = self.shared.insertions.fetch_add(1, Ordering::Relaxed);
        let now = self.shared.clock.now_millis();
        let token = self.shared.options.weak_references.then(DropToken::new);

        let mut core = self.shared.core.lock();
        self.maybe_gc(&mut core, now);
        let subs = core.subscriptions.entry(event.to_string()).or_default();
        subs.push(Subscription {
            id,
            callback,
            once: opts.once,
            priority: opts.priority,
            insertion,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            drop_token: token.clone(),
        });
        if subs.len() > self.shared.options.max_listeners {
            tracing::warn!(
                target: "emitter",
                event,
                listeners = subs.len(),
                max = self.shared.options.max_listeners,
                "listener count exceeds max_listeners"
            );
        }
        drop(core);

        SubscriptionHandle {
            id,
            shared: Arc::downgrade(&self.shared),
            token,
        }
    }

    /// Remove one subscription by id, or every subscription for the event
    pub fn off(&self, event: &str, id: Option<SubscriptionId>) -> bool {
        let mut core = self.shared.core.lock();
        let Some(subs) = core.subscriptions.get_mut(event) else {
            return false;
        };
        let before = subs.len();
        match id {
            Some(id) => {
                if let Some(pos) = subs.iter().position(|s| s.id == id) {
                    subs.remove(pos);
                }
            }
            None => subs.clear(),
        }
        let removed = before != subs.len() || (id.is_none() && before > 0);
        if subs.is_empty() {
            core.subscriptions.remove(event);
        }
        removed
    }

    /// Live listener count for an event
    pub fn listener_count(&self, event: &str) -> usize {
        let core = self.shared.core.lock();
        core.subscriptions
            .get(event)
            .map(|subs| subs.iter().filter(|s| s.is_alive()).count())
            .unwrap_or(0)
    }

    /// Subscribe a batch of callbacks to one event
    pub fn batch_subscribe(
        &self,
        event: &str,
        callbacks: Vec<Box<dyn Fn(Arc<T>) -> HandlerResult + Send + Sync>>,
    ) -> Vec<SubscriptionId> {
        callbacks
            .into_iter()
            .map(|callback| {
                let boxed: BoxedHandler<T> =
                    Arc::new(move |payload| future::ready(callback(payload)).boxed());
                self.subscribe_boxed(event, boxed, SubscribeOptions::default())
                    .id
            })
            .collect()
    }

    /// Remove subscriptions by id across all events; returns removals
    pub fn batch_unsubscribe(&self, ids: &[SubscriptionId]) -> usize {
        let mut core = self.shared.core.lock();
        let mut removed = 0;
        for list in core.subscriptions.values_mut() {
            let before = list.len();
            list.retain(|s| !ids.contains(&s.id));
            removed += before - list.len();
        }
        core.subscriptions.retain(|_, list| !list.is_empty());
        let before = core.error_subs.len();
        core.error_subs.retain(|s| !ids.contains(&s.id));
        removed += before - core.error_subs.len();
        removed
    }

    /// Subscribe to captured handler failures (the reserved error channel)
    pub fn on_error<F>(&self, callback: F, priority: EventPriority) -> SubscriptionHandle<T>
    where
        F: Fn(&EventHandlerError) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.ids.fetch_add(1, Ordering::Relaxed));
        let insertion = self.shared.insertions.fetch_add(1, Ordering::Relaxed);
        let mut core = self.shared.core.lock();
        core.error_subs.push(ErrorSubscription {
            id,
            callback: Arc::new(callback),
            priority,
            insertion,
        });
        drop(core);
        SubscriptionHandle {
            id,
            shared: Arc::downgrade(&self.shared),
            token: None,
        }
    }

    // -- state machine -----------------------------------------------------

    /// Buffer subsequent emissions instead of dispatching
    pub fn pause(&self) {
        self.shared.core.lock().paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.shared.core.lock().paused
    }

    /// Return to active and dispatch all queued events in heap order
    pub async fn resume(&self) -> Result<usize, QueueError> {
        self.shared.core.lock().paused = false;
        self.drain_impl(None).await
    }

    /// Process the queue to empty regardless of state
    pub async fn drain(&self) -> Result<usize, QueueError> {
        self.drain_impl(None).await
    }

    /// Dispatch queued events for a single event name, keeping state
    pub async fn flush(&self, event: &str) -> Result<usize, QueueError> {
        self.drain_impl(Some(event)).await
    }

    /// Release all subscriptions and buffers; final and idempotent
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut core = self.shared.core.lock();
        core.subscriptions.clear();
        core.error_subs.clear();
        core.queue.clear();
        tracing::debug!(target: "emitter", "emitter disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    // -- emission ----------------------------------------------------------

    /// Emit with normal priority
    pub async fn emit(&self, event: &str, data: T) -> Result<bool, QueueError> {
        self.emit_with(event, data, EventPriority::Normal).await
    }

    /// Emit with explicit priority
    ///
    /// Returns `Ok(true)` when at least one handler ran, or when the event
    /// was buffered in paused/deferred mode.
    pub async fn emit_with(
        &self,
        event: &str,
        data: T,
        priority: EventPriority,
    ) -> Result<bool, QueueError> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Ok(false);
        }
        let payload = Arc::new(data);
        if self.should_defer() {
            return self.enqueue_event(event, payload, priority);
        }
        self.dispatch_now(event, payload).await
    }

    /// Synchronous emission; async handlers are polled once
    ///
    /// A handler that does not complete immediately logs a warning. With
    /// `capture_rejections` on and a runtime available, the pending future
    /// is spawned so an eventual failure still reaches the error channel.
    pub fn emit_sync(&self, event: &str, data: T) -> Result<bool, QueueError> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Ok(false);
        }
        let payload = Arc::new(data);
        if self.should_defer() {
            return self.enqueue_event(event, payload, EventPriority::Normal);
        }

        let started = self.shared.clock.now_micros();
        let work = self.collect_handlers(event);
        let mut invoked = 0usize;
        for entry in work {
            if !entry.is_alive() {
                continue;
            }
            let handler_started = self.shared.clock.now_micros();
            let mut fut = (entry.callback)(Arc::clone(&payload));
            // Single poll with a no-op waker: completed-synchronously
            // handlers resolve here, async ones stay pending.
            let mut cx = Context::from_waker(noop_waker_ref());
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(result) => {
                    invoked += 1;
                    self.shared
                        .metrics
                        .handler_invocations
                        .fetch_add(1, Ordering::Relaxed);
                    self.shared.metrics.handler_stats.record(
                        self.shared
                            .clock
                            .now_micros()
                            .saturating_sub(handler_started),
                    );
                    self.note_execution(event, entry.id);
                    if let Err(source) = result {
                        self.shared
                            .metrics
                            .handler_errors
                            .fetch_add(1, Ordering::Relaxed);
                        let err = EventHandlerError {
                            event: event.to_string(),
                            source,
                        };
                        if self.shared.options.capture_rejections {
                            self.dispatch_error(&err);
                        } else {
                            return Err(QueueError::Handler(err));
                        }
                    }
                }
                Poll::Pending => {
                    invoked += 1;
                    tracing::warn!(
                        target: "emitter",
                        event,
                        "emit_sync invoked an asynchronous handler"
                    );
                    if self.shared.options.capture_rejections {
                        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                            let emitter = self.clone();
                            let event = event.to_string();
                            runtime.spawn(async move {
                                if let Err(source) = fut.await {
                                    emitter
                                        .shared
                                        .metrics
                                        .handler_errors
                                        .fetch_add(1, Ordering::Relaxed);
                                    emitter.dispatch_error(&EventHandlerError { event, source });
                                }
                            });
                        }
                    }
                }
            }
        }
        self.shared.metrics.emissions.fetch_add(1, Ordering::Relaxed);
        self.shared
            .metrics
            .emission_stats
            .record(self.shared.clock.now_micros().saturating_sub(started));
        Ok(invoked > 0)
    }

    /// One dispatch per element, in order, with per-element results
    pub async fn emit_batch(
        &self,
        events: Vec<(String, T)>,
    ) -> Vec<Result<bool, QueueError>> {
        let mut results = Vec::with_capacity(events.len());
        for (event, data) in events {
            results.push(self.emit(&event, data).await);
        }
        results
    }

    // -- queue inspection --------------------------------------------------

    /// Snapshot of the pause buffer in dispatch order
    pub fn queued_events(&self) -> Vec<QueuedEvent<T>> {
        let core = self.shared.core.lock();
        core.queue.iter_sorted().collect()
    }

    /// Queued event count, total or for one event
    pub fn pending_count(&self, event: Option<&str>) -> usize {
        let core = self.shared.core.lock();
        match event {
            None => core.queue.len(),
            Some(name) => core
                .queue
                .to_array()
                .iter()
                .filter(|e| e.event == name)
                .count(),
        }
    }

    /// Remove queued events (all, or one event's); returns the count removed
    pub fn clear_buffer(&self, event: Option<&str>) -> usize {
        let mut core = self.shared.core.lock();
        match event {
            None => {
                let removed = core.queue.len();
                core.queue.clear();
                removed
            }
            Some(name) => {
                let drained = core.queue.dequeue_all();
                let mut removed = 0;
                for entry in drained {
                    if entry.event == name {
                        removed += 1;
                    } else {
                        let key = entry.key();
                        core.queue.enqueue(entry, key);
                    }
                }
                removed
            }
        }
    }

    /// Metrics snapshot
    pub fn metrics(&self) -> EmitterMetricsSnapshot {
        let m = &self.shared.metrics;
        EmitterMetricsSnapshot {
            emissions: m.emissions.load(Ordering::Relaxed),
            buffered: m.buffered.load(Ordering::Relaxed),
            handler_invocations: m.handler_invocations.load(Ordering::Relaxed),
            handler_errors: m.handler_errors.load(Ordering::Relaxed),
            emission: m.emission_stats.snapshot(),
            handler: m.handler_stats.snapshot(),
        }
    }

    /// Drop dead weak handlers and empty per-event entries now
    pub fn sweep(&self) {
        let mut core = self.shared.core.lock();
        Self::gc(&mut core);
    }

    // -- internals ---------------------------------------------------------

    fn should_defer(&self) -> bool {
        !self.shared.options.immediate_dispatch || self.shared.core.lock().paused
    }

    fn enqueue_event(
        &self,
        event: &str,
        payload: Arc<T>,
        priority: EventPriority,
    ) -> Result<bool, QueueError> {
        let mut core = self.shared.core.lock();
        if core.queue.len() >= self.shared.options.buffer_size {
            return Err(QueueError::QueueFull {
                capacity: self.shared.options.buffer_size,
            });
        }
        let entry = QueuedEvent {
            sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
            event: event.to_string(),
            payload,
            timestamp: self.shared.clock.now_millis(),
            priority,
        };
        let key = entry.key();
        core.queue.enqueue(entry, key);
        self.shared.metrics.buffered.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn drain_impl(&self, only_event: Option<&str>) -> Result<usize, QueueError> {
        let mut processed = 0usize;
        loop {
            let next = {
                let mut core = self.shared.core.lock();
                match only_event {
                    None => core.queue.try_dequeue(),
                    Some(name) => {
                        // Selective pop: drain and re-enqueue non-matching
                        // entries with their original keys.
                        let drained = core.queue.dequeue_all();
                        let mut selected = None;
                        for entry in drained {
                            if selected.is_none() && entry.event == name {
                                selected = Some(entry);
                            } else {
                                let key = entry.key();
                                core.queue.enqueue(entry, key);
                            }
                        }
                        selected
                    }
                }
            };
            let Some(entry) = next else { break };
            self.dispatch_now(&entry.event, entry.payload).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn dispatch_now(&self, event: &str, payload: Arc<T>) -> Result<bool, QueueError> {
        let started = self.shared.clock.now_micros();
        let work = self.collect_handlers(event);
        let mut invoked = 0usize;
        for entry in work {
            if !entry.is_alive() {
                continue;
            }
            let _permit = match &self.shared.semaphore {
                Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
                None => None,
            };
            let handler_started = self.shared.clock.now_micros();
            let result = (entry.callback)(Arc::clone(&payload)).await;
            invoked += 1;
            self.shared
                .metrics
                .handler_invocations
                .fetch_add(1, Ordering::Relaxed);
            self.shared.metrics.handler_stats.record(
                self.shared
                    .clock
                    .now_micros()
                    .saturating_sub(handler_started),
            );
            self.note_execution(event, entry.id);
            if let Err(source) = result {
                self.shared
                    .metrics
                    .handler_errors
                    .fetch_add(1, Ordering::Relaxed);
                let err = EventHandlerError {
                    event: event.to_string(),
                    source,
                };
                if self.shared.options.capture_rejections {
                    self.dispatch_error(&err);
                } else {
                    return Err(QueueError::Handler(err));
                }
            }
        }
        self.shared.metrics.emissions.fetch_add(1, Ordering::Relaxed);
        self.shared
            .metrics
            .emission_stats
            .record(self.shared.clock.now_micros().saturating_sub(started));
        Ok(invoked > 0)
    }

    /// Working copy for one emission: alive handlers sorted by
    /// (priority rank, insertion order); `once` entries leave the live set
    /// before any callback runs
    fn collect_handlers(&self, event: &str) -> Vec<HandlerEntry<T>> {
        let now = self.shared.clock.now_millis();
        let mut core = self.shared.core.lock();
        self.maybe_gc(&mut core, now);
        let Some(subs) = core.subscriptions.get_mut(event) else {
            return Vec::new();
        };
        let mut work: Vec<(u8, u64, HandlerEntry<T>)> = subs
            .iter()
            .filter(|s| s.is_alive())
            .map(|s| {
                (
                    s.priority.rank(),
                    s.insertion,
                    HandlerEntry {
                        id: s.id,
                        callback: Arc::clone(&s.callback),
                        token: s.drop_token.clone(),
                    },
                )
            })
            .collect();
        work.sort_by_key(|(rank, insertion, _)| (*rank, *insertion));

        subs.retain(|s| !(s.once && s.is_alive()));
        if subs.is_empty() {
            core.subscriptions.remove(event);
        }

        work.into_iter().map(|(_, _, entry)| entry).collect()
    }

    fn note_execution(&self, event: &str, id: SubscriptionId) {
        let now = self.shared.clock.now_millis();
        let mut core = self.shared.core.lock();
        if let Some(subs) = core.subscriptions.get_mut(event) {
            if let Some(sub) = subs.iter_mut().find(|s| s.id == id) {
                sub.execution_count += 1;
                sub.last_executed_at = Some(now);
            }
        }
    }

    /// Run captured-failure callbacks in priority order
    fn dispatch_error(&self, err: &EventHandlerError) {
        let callbacks: Vec<Arc<dyn Fn(&EventHandlerError) + Send + Sync>> = {
            let mut core = self.shared.core.lock();
            core.error_subs
                .sort_by_key(|s| (s.priority.rank(), s.insertion));
            core.error_subs
                .iter()
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in callbacks {
            callback(err);
        }
    }

    fn maybe_gc(&self, core: &mut EmitterCore<T>, now: u64) {
        let interval = self.shared.options.gc_interval.as_millis() as u64;
        if now.saturating_sub(core.last_gc) < interval {
            return;
        }
        core.last_gc = now;
        Self::gc(core);
    }

    fn gc(core: &mut EmitterCore<T>) {
        for list in core.subscriptions.values_mut() {
            list.retain(|s| s.is_alive());
        }
        core.subscriptions.retain(|_, list| !list.is_empty());
    }
}

impl<T: Send + Sync + 'static> SubscriptionHandle<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The liveness token, when the emitter runs with weak references
    pub fn drop_token(&self) -> Option<DropToken> {
        self.token.clone()
    }

    /// Remove the subscription; returns false when it was already gone
    pub fn unsubscribe(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut core = shared.core.lock();
        let mut removed = false;
        for list in core.subscriptions.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == self.id) {
                list.remove(pos);
                removed = true;
                break;
            }
        }
        if !removed {
            if let Some(pos) = core.error_subs.iter().position(|s| s.id == self.id) {
                core.error_subs.remove(pos);
                removed = true;
            }
        }
        core.subscriptions.retain(|_, list| !list.is_empty());
        removed
    }
}
