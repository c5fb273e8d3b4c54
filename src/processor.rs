//! Message and response processing.
//!
//! `process_message` runs the handler over one message; `process_response`
//! interprets a poll event, fans the batch out to `process_message` and
//! publishes the aggregate outcome. Every path ends in exactly one
//! published event.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::PollerError;
use crate::events::{BatchSummary, Event, EventBus, EventType, Payload};
use crate::handler::MessageHandler;
use crate::inbox::{FetchResult, Message};
use crate::service::Halt;

/// Reported when a fetch-completed event carries no usable fetch result.
pub const UNEXPECTED_RESPONSE: &str = "processMessages received an unexpected response from inbox";

/// Reported when a fetch succeeded but `messages` is not a list.
pub const PROCESSING_FAILED: &str = "an unexpected error occurred while processing messages";

/// Runs the caller's handler and reports each outcome on the bus.
pub struct Processor {
    bus: Arc<EventBus>,
    handler: Arc<dyn MessageHandler>,
}

impl Processor {
    pub fn new(bus: Arc<EventBus>, handler: Arc<dyn MessageHandler>) -> Self {
        Self { bus, handler }
    }

    /// Handle one message. Handler errors and panics both become
    /// `message:process:failed`; nothing escapes.
    pub async fn process_message(&self, message: Message) -> Arc<Event> {
        let outcome = AssertUnwindSafe(self.handler.handle(message.clone()))
            .catch_unwind()
            .await;

        let event = match outcome {
            Ok(Ok(result)) => Event::new(EventType::MessageProcessCompleted)
                .with_object(Payload::Json(message))
                .with_result(Payload::Json(result)),
            Ok(Err(e)) => {
                debug!(error = %e, "Message handler failed");
                Event::failed(
                    EventType::MessageProcessFailed,
                    PollerError::handler(format!("{e:#}")),
                )
                .with_object(Payload::Json(message))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(reason = %reason, "Message handler panicked");
                Event::failed(
                    EventType::MessageProcessFailed,
                    PollerError::handler(format!("handler panicked: {reason}")),
                )
                .with_object(Payload::Json(message))
            }
        };

        self.bus.publish(event)
    }

    /// Turn a poll event into a batch outcome.
    ///
    /// Anything other than `inbox:fetch:completed` passes through untouched.
    /// Malformed fetch payloads publish `response:process:failed` and come
    /// back as `Err`; the caller decides what stopping means.
    pub async fn process_response(&self, poll: &Arc<Event>) -> Result<Arc<Event>, Halt> {
        if poll.kind != EventType::InboxFetchCompleted {
            return Ok(Arc::clone(poll));
        }

        let Some(fetch) = poll.fetch_result() else {
            return Err(self.reject(UNEXPECTED_RESPONSE, Payload::Event(Arc::clone(poll))));
        };
        let FetchResult::Messages { messages, .. } = fetch else {
            return Err(self.reject(UNEXPECTED_RESPONSE, Payload::Event(Arc::clone(poll))));
        };

        let Some(items) = messages.messages() else {
            return Err(self.reject(PROCESSING_FAILED, Payload::Fetch(fetch.clone())));
        };

        if items.is_empty() {
            return Ok(self
                .bus
                .publish(Event::new(EventType::InboxEmpty).with_object(Payload::Fetch(fetch.clone()))));
        }

        // Messages run concurrently; the batch completes once all have reported.
        let outcomes = join_all(items.iter().cloned().map(|m| self.process_message(m))).await;
        let failed = outcomes
            .iter()
            .filter(|e| e.kind == EventType::MessageProcessFailed)
            .count();
        let summary = BatchSummary {
            messages_processed: items.len(),
            succeeded: items.len() - failed,
            failed,
        };
        debug!(
            processed = summary.messages_processed,
            failed = summary.failed,
            "Batch processed"
        );

        Ok(self.bus.publish(
            Event::new(EventType::ResponseProcessCompleted)
                .with_object(Payload::Fetch(fetch.clone()))
                .with_result(Payload::Batch(summary)),
        ))
    }

    fn reject(&self, reason: &str, object: Payload) -> Halt {
        let error = PollerError::protocol(reason);
        warn!(error = %error, "Inbox response rejected");
        let event = self
            .bus
            .publish(Event::failed(EventType::ResponseProcessFailed, error.clone()).with_object(object));
        Halt {
            error,
            event: Some(event),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::events::Topic;
    use crate::inbox::MessageBatch;

    /// Fails for messages whose `fail` field is true, panics on `panic`.
    struct ScriptedHandler;

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        async fn handle(&self, message: Message) -> anyhow::Result<serde_json::Value> {
            if message["panic"] == json!(true) {
                panic!("handler exploded");
            }
            if message["fail"] == json!(true) {
                anyhow::bail!("cannot handle {}", message["id"]);
            }
            Ok(json!({ "handled": message["id"] }))
        }
    }

    fn processor() -> (Processor, Arc<Mutex<Vec<EventType>>>) {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bus.subscribe(Topic::Any, move |e: &Event| log.lock().unwrap().push(e.kind));
        (Processor::new(bus, Arc::new(ScriptedHandler)), seen)
    }

    fn fetched(messages: MessageBatch) -> Arc<Event> {
        Arc::new(
            Event::new(EventType::InboxFetchCompleted).with_result(Payload::Fetch(
                FetchResult::Messages {
                    status: 200,
                    status_text: "OK".into(),
                    messages,
                },
            )),
        )
    }

    #[tokio::test]
    async fn process_message_success() {
        let (p, seen) = processor();
        let event = p.process_message(json!({"id": "a"})).await;

        assert_eq!(event.kind, EventType::MessageProcessCompleted);
        assert_eq!(event.object, Some(Payload::Json(json!({"id": "a"}))));
        assert_eq!(event.result, Some(Payload::Json(json!({"handled": "a"}))));
        assert!(event.error.is_none());
        assert_eq!(*seen.lock().unwrap(), vec![EventType::MessageProcessCompleted]);
    }

    #[tokio::test]
    async fn process_message_handler_error() {
        let (p, _) = processor();
        let event = p.process_message(json!({"id": "b", "fail": true})).await;

        assert_eq!(event.kind, EventType::MessageProcessFailed);
        assert_eq!(event.object, Some(Payload::Json(json!({"id": "b", "fail": true}))));
        assert!(event.result.is_none());
        assert_eq!(
            event.error,
            Some(PollerError::handler("cannot handle \"b\""))
        );
    }

    #[tokio::test]
    async fn process_message_handler_panic_is_normalized() {
        let (p, _) = processor();
        let event = p.process_message(json!({"id": "c", "panic": true})).await;

        assert_eq!(event.kind, EventType::MessageProcessFailed);
        let error = event.error.as_ref().unwrap();
        assert!(error.message().contains("handler exploded"));
    }

    #[tokio::test]
    async fn non_fetch_events_pass_through() {
        let (p, seen) = processor();
        let input = Arc::new(Event::failed(
            EventType::InboxFetchFailed,
            PollerError::transport(None, "Network Error"),
        ));

        let output = p.process_response(&input).await.unwrap();
        assert!(Arc::ptr_eq(&input, &output));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_publishes_inbox_empty() {
        let (p, seen) = processor();
        let output = p.process_response(&fetched(MessageBatch::new(vec![]))).await.unwrap();

        assert_eq!(output.kind, EventType::InboxEmpty);
        assert_eq!(*seen.lock().unwrap(), vec![EventType::InboxEmpty]);
    }

    #[tokio::test]
    async fn batch_counts_every_message_and_isolates_failures() {
        let (p, seen) = processor();
        let batch = MessageBatch::new(vec![
            json!({"id": 1}),
            json!({"id": 2, "fail": true}),
            json!({"id": 3, "panic": true}),
        ]);

        let output = p.process_response(&fetched(batch)).await.unwrap();
        assert_eq!(output.kind, EventType::ResponseProcessCompleted);
        assert_eq!(
            output.batch(),
            Some(&BatchSummary {
                messages_processed: 3,
                succeeded: 1,
                failed: 2,
            })
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last(), Some(&EventType::ResponseProcessCompleted));
        let failed = seen
            .iter()
            .filter(|k| **k == EventType::MessageProcessFailed)
            .count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn malformed_messages_are_rejected() {
        let (p, seen) = processor();
        let halt = p
            .process_response(&fetched(MessageBatch::from_raw(json!("oops"))))
            .await
            .unwrap_err();

        assert_eq!(halt.error, PollerError::protocol(PROCESSING_FAILED));
        let event = halt.event.unwrap();
        assert_eq!(event.kind, EventType::ResponseProcessFailed);
        assert_eq!(*seen.lock().unwrap(), vec![EventType::ResponseProcessFailed]);
    }

    #[tokio::test]
    async fn fetch_completed_without_result_is_rejected() {
        let (p, seen) = processor();
        let garbage = Arc::new(Event::new(EventType::InboxFetchCompleted));

        let halt = p.process_response(&garbage).await.unwrap_err();
        assert_eq!(halt.error.message(), UNEXPECTED_RESPONSE);
        assert_eq!(*seen.lock().unwrap(), vec![EventType::ResponseProcessFailed]);
    }
}
