//! The closed event vocabulary.
//!
//! Tags follow `domain:action:outcome`. The domain segment selects a
//! [`Channel`], which the bus uses to pick a diagnostic sink.

use std::fmt;

use serde::{Serialize, Serializer};

/// Every lifecycle event the poller can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ServiceStart,
    ServiceProcessStart,
    ServiceProcessCompleted,
    ServiceProcessFailed,
    ServiceStop,
    ServiceStopCompleted,
    ServiceWait,
    InboxFetchCompleted,
    InboxFetchFailed,
    InboxEmpty,
    MessageProcessCompleted,
    MessageProcessFailed,
    ResponseProcessCompleted,
    ResponseProcessFailed,
}

impl EventType {
    pub const ALL: [EventType; 14] = [
        EventType::ServiceStart,
        EventType::ServiceProcessStart,
        EventType::ServiceProcessCompleted,
        EventType::ServiceProcessFailed,
        EventType::ServiceStop,
        EventType::ServiceStopCompleted,
        EventType::ServiceWait,
        EventType::InboxFetchCompleted,
        EventType::InboxFetchFailed,
        EventType::InboxEmpty,
        EventType::MessageProcessCompleted,
        EventType::MessageProcessFailed,
        EventType::ResponseProcessCompleted,
        EventType::ResponseProcessFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceStart => "service:start",
            Self::ServiceProcessStart => "service:process:start",
            Self::ServiceProcessCompleted => "service:process:completed",
            Self::ServiceProcessFailed => "service:process:failed",
            Self::ServiceStop => "service:stop",
            Self::ServiceStopCompleted => "service:stop:completed",
            Self::ServiceWait => "service:wait",
            Self::InboxFetchCompleted => "inbox:fetch:completed",
            Self::InboxFetchFailed => "inbox:fetch:failed",
            Self::InboxEmpty => "inbox:empty",
            Self::MessageProcessCompleted => "message:process:completed",
            Self::MessageProcessFailed => "message:process:failed",
            Self::ResponseProcessCompleted => "response:process:completed",
            Self::ResponseProcessFailed => "response:process:failed",
        }
    }

    /// Parse a wire tag back into its type.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::ServiceStart
            | Self::ServiceProcessStart
            | Self::ServiceProcessCompleted
            | Self::ServiceProcessFailed
            | Self::ServiceStop
            | Self::ServiceStopCompleted
            | Self::ServiceWait => Channel::Service,
            Self::InboxFetchCompleted | Self::InboxFetchFailed | Self::InboxEmpty => Channel::Inbox,
            Self::MessageProcessCompleted | Self::MessageProcessFailed => Channel::Message,
            Self::ResponseProcessCompleted | Self::ResponseProcessFailed => Channel::Response,
        }
    }

    /// Whether this tag reports a failed step.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ServiceProcessFailed
                | Self::InboxFetchFailed
                | Self::MessageProcessFailed
                | Self::ResponseProcessFailed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// First segment of an event tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Service,
    Inbox,
    Message,
    Response,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Inbox => "inbox",
            Self::Message => "message",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
