//! The event record that crosses every component boundary.

use std::sync::Arc;

use serde::Serialize;

use super::kind::EventType;
use crate::error::PollerError;
use crate::inbox::FetchResult;

/// One lifecycle event.
///
/// Built with the `with_*` methods, then handed to the bus which freezes it
/// behind an `Arc`. Consumers only ever see `&Event`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PollerError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

/// Subject or product of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Opaque value: a message, a URL, a handler result.
    Json(serde_json::Value),
    Fetch(FetchResult),
    Batch(BatchSummary),
    Wait(WaitTime),
    /// A previously published event, e.g. the batch outcome inside
    /// `service:process:completed`.
    Event(Arc<Event>),
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub messages_processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Delay announced by `service:wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitTime {
    pub wait_time: u64,
}

impl Event {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            object: None,
            result: None,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    /// A failure event. Failures always carry their error.
    pub fn failed(kind: EventType, error: PollerError) -> Self {
        Self::new(kind).with_error(error)
    }

    pub fn with_object(mut self, object: Payload) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_result(mut self, result: Payload) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: PollerError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_start_time(mut self, millis: i64) -> Self {
        self.start_time = Some(millis);
        self
    }

    pub fn with_end_time(mut self, millis: i64) -> Self {
        self.end_time = Some(millis);
        self
    }

    /// The nested event in `result`, if any.
    pub fn result_event(&self) -> Option<&Arc<Event>> {
        match &self.result {
            Some(Payload::Event(event)) => Some(event),
            _ => None,
        }
    }

    pub fn fetch_result(&self) -> Option<&FetchResult> {
        match &self.result {
            Some(Payload::Fetch(fetch)) => Some(fetch),
            _ => None,
        }
    }

    pub fn batch(&self) -> Option<&BatchSummary> {
        match &self.result {
            Some(Payload::Batch(batch)) => Some(batch),
            _ => None,
        }
    }

    /// Serialize for diagnostics. Never fails for well-formed events.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Arc<Event>> for Payload {
    fn from(event: Arc<Event>) -> Self {
        Payload::Event(event)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_wire_names() {
        let inner = Arc::new(
            Event::new(EventType::ResponseProcessCompleted).with_result(Payload::Batch(
                BatchSummary {
                    messages_processed: 2,
                    succeeded: 2,
                    failed: 0,
                },
            )),
        );
        let event = Event::new(EventType::ServiceProcessCompleted)
            .with_start_time(1)
            .with_end_time(2)
            .with_result(inner.into());

        let v = event.to_json();
        assert_eq!(v["type"], "service:process:completed");
        assert_eq!(v["startTime"], 1);
        assert_eq!(v["endTime"], 2);
        assert_eq!(v["result"]["type"], "response:process:completed");
        assert_eq!(v["result"]["result"]["messagesProcessed"], 2);
        assert!(v.get("error").is_none());
        assert!(v.get("object").is_none());
    }

    #[test]
    fn failed_carries_error() {
        let event = Event::failed(
            EventType::MessageProcessFailed,
            PollerError::handler("boom"),
        )
        .with_object(json!({"id": "a"}).into());

        assert_eq!(event.error, Some(PollerError::handler("boom")));
        assert_eq!(event.to_json()["error"]["message"], "boom");
        assert_eq!(event.to_json()["object"]["id"], "a");
    }

    #[test]
    fn accessors_match_payload_variant() {
        let event = Event::new(EventType::ServiceWait)
            .with_result(Payload::Wait(WaitTime { wait_time: 5000 }));
        assert!(event.batch().is_none());
        assert!(event.result_event().is_none());
        assert!(event.fetch_result().is_none());
        assert_eq!(event.to_json()["result"]["waitTime"], 5000);
    }
}
