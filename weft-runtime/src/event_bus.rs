//! Synchronous publish/subscribe bus.

use crate::event::{Event, EventKind, EventPayload};
use crate::subscription::{isolate, lock, Subscribers, Subscription};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Callback invoked for each delivered event.
pub type EventHandler = dyn Fn(&Event) + Send + Sync;

/// `None` marks a wildcard subscriber.
type Handlers = Subscribers<Option<EventKind>, EventHandler>;

/// Fan-out bus for runtime events.
///
/// `emit` delivers on the caller's stack to the subscribers registered at the
/// moment of the call, in registration order. Subscribing or unsubscribing
/// from inside a handler takes effect for the next emit. Events with no
/// subscribers are dropped.
#[derive(Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Handlers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(Some(kind), Arc::new(handler))
    }

    /// Subscribes to every event.
    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(handler))
    }

    fn subscribe(&self, key: Option<EventKind>, handler: Arc<EventHandler>) -> Subscription {
        let id = lock(&self.handlers).insert(key, handler);
        let handlers = Arc::downgrade(&self.handlers);
        Subscription::new(id, move || {
            if let Some(handlers) = handlers.upgrade() {
                lock(&handlers).remove(id);
            }
        })
    }

    /// Emits an event and returns the number of handlers that received it.
    pub fn emit(&self, payload: EventPayload) -> usize {
        let event = Event::new(payload);
        let kind = event.kind();
        let targets = lock(&self.handlers).snapshot(|k| k.is_none_or(|k| k == kind));
        if targets.is_empty() {
            trace!("dropped {} event: no subscribers", kind);
            return 0;
        }

        let label = format!("event {kind}");
        for handler in &targets {
            isolate(&label, || handler(&event));
        }
        targets.len()
    }

    /// Number of handlers that would receive an event of `kind`, wildcards
    /// included.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.handlers).count(|k| k.is_none_or(|k| k == kind))
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every handler.
    pub fn clear(&self) {
        lock(&self.handlers).clear();
    }
}
