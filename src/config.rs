//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::inbox::http::DEFAULT_REQUEST_TIMEOUT;

/// Default pause between non-productive polls.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(5);

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Inbox to poll.
    pub inbox_url: String,
    /// Backoff after an empty or failed poll.
    pub wait_time: Duration,
    /// HTTP request timeout for the default inbox client.
    pub request_timeout: Duration,
    /// Sent as `x-api-key` by the default inbox client.
    pub api_key: Option<SecretString>,
    /// Also emit each event on its type-specific topic.
    pub emit_event_types: bool,
}

impl PollerConfig {
    pub fn new(inbox_url: impl Into<String>) -> Self {
        Self {
            inbox_url: inbox_url.into(),
            wait_time: DEFAULT_WAIT_TIME,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            api_key: None,
            emit_event_types: true,
        }
    }

    /// Load from environment. Returns `None` when `INBOX_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let inbox_url = std::env::var("INBOX_URL").ok().filter(|s| !s.trim().is_empty())?;

        let wait_time = std::env::var("INBOX_WAIT_TIME_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .map(normalize_wait_time)
            .unwrap_or(DEFAULT_WAIT_TIME);

        let request_timeout = std::env::var("INBOX_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let api_key = std::env::var("INBOX_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let emit_event_types = std::env::var("INBOX_EMIT_EVENT_TYPES")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(true);

        Some(Self {
            inbox_url,
            wait_time,
            request_timeout,
            api_key,
            emit_event_types,
        })
    }
}

/// A zero wait means "use the default", never "spin".
pub fn normalize_wait_time(wait_time: Duration) -> Duration {
    if wait_time.is_zero() {
        DEFAULT_WAIT_TIME
    } else {
        wait_time
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
