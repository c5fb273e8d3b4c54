//! Lifecycle events and the bus that carries them.

pub mod bus;
pub mod event;
pub mod kind;
pub mod sink;

pub use bus::{EventBus, EventBusBuilder, Listener, SubscriptionId, Topic};
pub use event::{BatchSummary, Event, Payload, WaitTime, now_millis};
pub use kind::{Channel, EventType};
pub use sink::{EventSink, NoopSink, TracingSink};
