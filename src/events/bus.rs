//! Event bus: the single publish point for lifecycle events.
//!
//! Listeners are plain callbacks invoked synchronously in registration
//! order: all `Topic::Any` listeners first, then the listeners registered
//! for the event's own type (when type emission is enabled). A broadcast
//! channel mirrors every event for async consumers.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::warn;

use super::event::Event;
use super::kind::{Channel, EventType};
use super::sink::{EventSink, TracingSink};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// A bus listener.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// What a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every published event.
    Any,
    /// Only events of one type.
    Type(EventType),
}

impl From<EventType> for Topic {
    fn from(kind: EventType) -> Self {
        Topic::Type(kind)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    listener: Listener,
}

pub struct EventBus {
    listeners: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    emit_event_types: AtomicBool,
    sinks: HashMap<Channel, Arc<dyn EventSink>>,
    default_sink: Arc<dyn EventSink>,
    tx: broadcast::Sender<Arc<Event>>,
}

impl EventBus {
    /// A bus with a `TracingSink` per channel and type emission enabled.
    pub fn new() -> Self {
        EventBusBuilder::default().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Register a listener. Returns an id usable with [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(Subscription {
            id,
            topic: topic.into(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|s| s.id != id);
        listeners.len() != before
    }

    pub fn unsubscribe_all(&self) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Subscribe to every published event as an async stream.
    pub fn stream(&self) -> broadcast::Receiver<Arc<Event>> {
        self.tx.subscribe()
    }

    pub fn emit_event_types(&self) -> bool {
        self.emit_event_types.load(Ordering::Relaxed)
    }

    pub fn set_emit_event_types(&self, enabled: bool) {
        self.emit_event_types.store(enabled, Ordering::Relaxed);
    }

    /// Publish an event and return the frozen copy every consumer saw.
    pub fn publish(&self, event: Event) -> Arc<Event> {
        debug_assert!(
            !event.kind.is_failure() || event.error.is_some(),
            "failure event {} published without an error",
            event.kind
        );

        let event = Arc::new(event);

        // Snapshot so listeners can (un)subscribe without deadlocking.
        let targets = self.matching_listeners(event.kind);
        for listener in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(event = %event.kind, "Event listener panicked; continuing");
            }
        }

        let sink = self.sink_for(event.kind.channel());
        if catch_unwind(AssertUnwindSafe(|| sink.record(&event))).is_err() {
            warn!(event = %event.kind, "Event sink panicked; continuing");
        }

        // Ok if nobody is listening on the stream.
        let _ = self.tx.send(Arc::clone(&event));

        event
    }

    fn matching_listeners(&self, kind: EventType) -> Vec<Listener> {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        let mut targets: Vec<Listener> = listeners
            .iter()
            .filter(|s| s.topic == Topic::Any)
            .map(|s| Arc::clone(&s.listener))
            .collect();

        if self.emit_event_types() {
            targets.extend(
                listeners
                    .iter()
                    .filter(|s| s.topic == Topic::Type(kind))
                    .map(|s| Arc::clone(&s.listener)),
            );
        }
        targets
    }

    fn sink_for(&self, channel: Channel) -> &Arc<dyn EventSink> {
        self.sinks.get(&channel).unwrap_or(&self.default_sink)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("emit_event_types", &self.emit_event_types())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves the channel → sink mapping once, at construction.
pub struct EventBusBuilder {
    sinks: HashMap<Channel, Arc<dyn EventSink>>,
    default_sink: Arc<dyn EventSink>,
    emit_event_types: bool,
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        let sinks = [
            Channel::Service,
            Channel::Inbox,
            Channel::Message,
            Channel::Response,
        ]
        .into_iter()
        .map(|c| (c, Arc::new(TracingSink::new(c.as_str())) as Arc<dyn EventSink>))
        .collect();

        Self {
            sinks,
            default_sink: Arc::new(TracingSink::new("default")),
            emit_event_types: true,
        }
    }
}

impl EventBusBuilder {
    /// Route one channel to `sink`.
    pub fn sink(mut self, channel: Channel, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.insert(channel, sink);
        self
    }

    /// Drop a channel's dedicated sink so it falls back to the default.
    pub fn without_sink(mut self, channel: Channel) -> Self {
        self.sinks.remove(&channel);
        self
    }

    pub fn default_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.default_sink = sink;
        self
    }

    pub fn emit_event_types(mut self, enabled: bool) -> Self {
        self.emit_event_types = enabled;
        self
    }

    pub fn build(self) -> EventBus {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        EventBus {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            emit_event_types: AtomicBool::new(self.emit_event_types),
            sinks: self.sinks,
            default_sink: self.default_sink,
            tx,
        }
    }
}
