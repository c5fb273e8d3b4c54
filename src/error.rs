//! Error types for the inbox poller.

/// Error kinds carried by failure events.
///
/// Every failure that leaves a component is one of these, never a bare
/// string, so listeners can match on the kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollerError {
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport { status: Option<u16>, message: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("service:stopped")]
    Stopped,
}

impl PollerError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// The human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. } => message,
            Self::Protocol(message) | Self::Handler(message) => message,
            Self::Stopped => "service:stopped",
        }
    }

    /// Short machine-friendly kind name, used in serialized events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Protocol(_) => "protocol",
            Self::Handler(_) => "handler",
            Self::Stopped => "stopped",
        }
    }
}

impl serde::Serialize for PollerError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("PollerError", 3)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", self.message())?;
        if let Self::Transport { status, .. } = self {
            state.serialize_field("status", status)?;
        } else {
            state.skip_field("status")?;
        }
        state.end()
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is required. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_includes_status() {
        let err = PollerError::transport(Some(403), "FORBIDDEN");
        assert_eq!(err.to_string(), "Transport error (status 403): FORBIDDEN");

        let err = PollerError::transport(None, "Network Error");
        assert_eq!(err.to_string(), "Transport error: Network Error");
    }

    #[test]
    fn message_strips_kind_prefix() {
        let err = PollerError::protocol("bad payload");
        assert_eq!(err.message(), "bad payload");
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn serializes_kind_and_message() {
        let v = serde_json::to_value(PollerError::transport(Some(500), "boom")).unwrap();
        assert_eq!(v["kind"], "transport");
        assert_eq!(v["message"], "boom");
        assert_eq!(v["status"], 500);

        let v = serde_json::to_value(PollerError::handler("nope")).unwrap();
        assert_eq!(v["kind"], "handler");
        assert!(v.get("status").is_none());
    }

    #[test]
    fn missing_required_mentions_key() {
        let err = ConfigError::MissingRequired {
            key: "inbox_url".into(),
            hint: "Set INBOX_URL.".into(),
        };
        assert!(err.to_string().starts_with("inbox_url is required"));
    }
}
