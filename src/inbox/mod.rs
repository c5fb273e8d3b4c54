//! Inbox collaborator: fetches one batch of pending messages.
//!
//! Ordinary transport and status failures are encoded in the returned
//! [`FetchResult`]. An `Err` from [`Inbox::fetch`] is reserved for failures
//! the client did not anticipate; the poll loop still turns it into an
//! `inbox:fetch:failed` event.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PollerError;

pub use http::HttpInbox;

/// An inbox message. Opaque to the poller; handed verbatim to the handler.
pub type Message = serde_json::Value;

/// The `messages` field of a successful fetch, as the collaborator sent it.
///
/// Well-formed batches are JSON arrays. Anything else is a protocol
/// violation the response processor reports instead of crashing on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MessageBatch(serde_json::Value);

impl MessageBatch {
    pub fn new(messages: Vec<Message>) -> Self {
        Self(serde_json::Value::Array(messages))
    }

    /// Wrap whatever the collaborator produced, well-formed or not.
    pub fn from_raw(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The messages, or `None` if the batch is not an array.
    pub fn messages(&self) -> Option<&[Message]> {
        self.0.as_array().map(Vec::as_slice)
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<Vec<Message>> for MessageBatch {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

/// Outcome of one fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FetchResult {
    #[serde(rename_all = "camelCase")]
    Messages {
        status: u16,
        status_text: String,
        messages: MessageBatch,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        status: Option<u16>,
        status_text: String,
        error: PollerError,
    },
}

impl FetchResult {
    pub fn messages(status: u16, status_text: impl Into<String>, messages: impl Into<MessageBatch>) -> Self {
        Self::Messages {
            status,
            status_text: status_text.into(),
            messages: messages.into(),
        }
    }

    pub fn failed(status: Option<u16>, status_text: impl Into<String>, error: PollerError) -> Self {
        Self::Failed {
            status,
            status_text: status_text.into(),
            error,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Messages { status, .. } => Some(*status),
            Self::Failed { status, .. } => *status,
        }
    }

    pub fn status_text(&self) -> &str {
        match self {
            Self::Messages { status_text, .. } | Self::Failed { status_text, .. } => status_text,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Messages { .. })
    }
}

/// Source of message batches.
#[async_trait]
pub trait Inbox: Send + Sync {
    /// The URL fetched when no override is given.
    fn url(&self) -> &str;

    /// Fetch pending messages from `url`, or from [`Inbox::url`] when `None`.
    async fn fetch(&self, url: Option<&str>) -> Result<FetchResult, PollerError>;
}
