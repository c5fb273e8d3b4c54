//! Backoff gate: decides whether the loop pauses before the next poll.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::events::{Event, EventBus, EventType, Payload, WaitTime};

/// Pauses after empty or failed polls, never after real work.
pub struct WaitGate {
    bus: Arc<EventBus>,
    wait_time: Duration,
}

impl WaitGate {
    pub fn new(bus: Arc<EventBus>, wait_time: Duration) -> Self {
        Self { bus, wait_time }
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// A batch that completed processing, directly or wrapped in
    /// `service:process:completed`.
    pub fn is_productive(event: &Event) -> bool {
        match event.kind {
            EventType::ResponseProcessCompleted => true,
            EventType::ServiceProcessCompleted => event
                .result_event()
                .is_some_and(|inner| inner.kind == EventType::ResponseProcessCompleted),
            _ => false,
        }
    }

    /// Return immediately for productive outcomes; otherwise publish
    /// `service:wait` and sleep for the configured wait time.
    ///
    /// Returns how long it waited.
    pub async fn wait(&self, event: &Event) -> Duration {
        if Self::is_productive(event) {
            return Duration::ZERO;
        }

        let wait_ms = u64::try_from(self.wait_time.as_millis()).unwrap_or(u64::MAX);
        self.bus.publish(
            Event::new(EventType::ServiceWait).with_result(Payload::Wait(WaitTime { wait_time: wait_ms })),
        );
        debug!(after = %event.kind, wait_ms, "Backing off");

        tokio::time::sleep(self.wait_time).await;
        self.wait_time
    }
}
