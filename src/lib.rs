//! Inbox poller: fetch pending messages, hand each to a handler, back off
//! when there is nothing to do, and report every step on an event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod handler;
pub mod inbox;
pub mod processor;
pub mod service;

pub use config::PollerConfig;
pub use error::{ConfigError, PollerError};
pub use events::{Event, EventBus, EventType, Payload, Topic};
pub use handler::MessageHandler;
pub use inbox::{FetchResult, HttpInbox, Inbox, Message};
pub use service::{Halt, Poller, PollerBuilder};
