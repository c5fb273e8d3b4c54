//! Diagnostic sinks, one per event channel.

use tracing::{debug, warn};

use super::event::Event;

/// Receives every event published on its channel, after listeners ran.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Logs events through `tracing`, tagged with the channel name.
#[derive(Debug, Clone)]
pub struct TracingSink {
    channel: &'static str,
}

impl TracingSink {
    pub fn new(channel: &'static str) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }
}

impl EventSink for TracingSink {
    fn record(&self, event: &Event) {
        if let Some(error) = &event.error {
            warn!(
                channel = self.channel,
                event = %event.kind,
                error = %error,
                payload = %event.to_json(),
                "Event failed"
            );
        } else {
            debug!(
                channel = self.channel,
                event = %event.kind,
                payload = %event.to_json(),
                "Event"
            );
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: &Event) {}
}
