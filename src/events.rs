//! Scheduler lifecycle events.
//!
//! Two ways to listen: [`EventBus::on`] registers a synchronous handler that
//! runs inline on emit, in registration order; [`EventBus::subscribe`] hands out
//! a `tokio::sync::broadcast` receiver for async consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerEventKind {
    IngestionStarted,
    IngestionCompleted,
    EnrichmentStarted,
    EnrichmentCompleted,
    RefreshCompleted,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerEvent {
    #[serde(rename = "type")]
    pub kind: SchedulerEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SchedulerEvent {
    pub fn new(kind: SchedulerEventKind, data: Option<Value>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: SchedulerEventKind::Error,
            timestamp: Utc::now(),
            data,
            error: Some(message.into()),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&SchedulerEvent) + Send + Sync>;

struct Registry {
    handlers: Mutex<Vec<(u64, EventHandler)>>,
    next_id: AtomicU64,
}

pub struct EventBus {
    registry: Arc<Registry>,
    sender: broadcast::Sender<SchedulerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(Registry {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            sender,
        }
    }

    /// Registers `handler` until [`Subscription::unsubscribe`] is called on
    /// the returned handle.
    pub fn on<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Async receiver for every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }

    pub fn handler_count(&self) -> usize {
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every handler, then to broadcast receivers.
    ///
    /// A panicking handler is logged and skipped; later handlers still run.
    pub fn emit(&self, event: SchedulerEvent) {
        let handlers: Vec<EventHandler> = self
            .registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::warn!("Event handler panicked on {:?}", event.kind);
            }
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }
}

/// Registration handle returned by [`EventBus::on`].
#[must_use = "dropping the subscription without unsubscribing keeps the handler registered"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let _a = bus.on(move |_| s1.lock().unwrap().push("first"));
        let s2 = Arc::clone(&seen);
        let _b = bus.on(move |_| s2.lock().unwrap().push("second"));

        bus.emit(SchedulerEvent::new(SchedulerEventKind::IngestionStarted, None));

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = Arc::clone(&count);
        let sub = bus.on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(SchedulerEvent::new(SchedulerEventKind::RefreshCompleted, None));
        sub.unsubscribe();
        bus.emit(SchedulerEvent::new(SchedulerEventKind::RefreshCompleted, None));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let _bad = bus.on(|_| panic!("handler failure"));
        let c = Arc::clone(&count);
        let _good = bus.on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(SchedulerEvent::error("boom", None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SchedulerEvent::error("ingestion failed", None));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SchedulerEventKind::Error);
        assert_eq!(event.error.as_deref(), Some("ingestion failed"));
    }

    #[test]
    fn test_event_serializes_type_tag() {
        let event = SchedulerEvent::new(SchedulerEventKind::EnrichmentCompleted, None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "enrichment-completed");
        assert!(json.get("error").is_none());
    }
}
