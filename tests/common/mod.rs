//! Shared fixtures for poller integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use inbox_poller::events::Event;
use inbox_poller::{EventType, FetchResult, Inbox, PollerError};

pub const INBOX_URL: &str = "http://inbox.test/messages";

/// Longest a test waits for an event before declaring the loop hung.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Replays queued fetch outcomes, then reports an empty inbox forever.
#[derive(Default)]
pub struct ScriptedInbox {
    responses: Mutex<VecDeque<Result<FetchResult, PollerError>>>,
    calls: AtomicUsize,
}

impl ScriptedInbox {
    pub fn new(responses: impl IntoIterator<Item = Result<FetchResult, PollerError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Inbox for ScriptedInbox {
    fn url(&self) -> &str {
        INBOX_URL
    }

    async fn fetch(&self, _url: Option<&str>) -> Result<FetchResult, PollerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchResult::messages(200, "OK", vec![])))
    }
}

/// Receive events until one of `kind` arrives.
pub async fn next_of(rx: &mut broadcast::Receiver<Arc<Event>>, kind: EventType) -> Arc<Event> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("bus closed");
            if event.kind == kind {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}
