//! HTTP inbox client: `GET`s the inbox URL and reads the `contains` list.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{FetchResult, Inbox};
use crate::error::{ConfigError, PollerError};

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(6000);

/// Header carrying the inbox API key.
const API_KEY_HEADER: &str = "x-api-key";

const CONTAINS_REQUIRED: &str = "inbox.response.contains (array) is required";

/// Inbox backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpInbox {
    inbox_url: String,
    client: reqwest::Client,
}

impl HttpInbox {
    /// Client with the default timeout and no credentials.
    pub fn new(inbox_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::builder(inbox_url).build()
    }

    pub fn builder(inbox_url: impl Into<String>) -> HttpInboxBuilder {
        HttpInboxBuilder {
            inbox_url: inbox_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            api_key: None,
            headers: Vec::new(),
        }
    }

    /// Absolute overrides are used as-is; relative ones join the inbox URL.
    fn resolve(&self, url: Option<&str>) -> String {
        let Some(url) = url else {
            return self.inbox_url.clone();
        };
        if Url::parse(url).is_ok() {
            return url.to_string();
        }
        Url::parse(&self.inbox_url)
            .and_then(|base| base.join(url))
            .map(String::from)
            .unwrap_or_else(|_| url.to_string())
    }
}

#[async_trait]
impl Inbox for HttpInbox {
    fn url(&self) -> &str {
        &self.inbox_url
    }

    async fn fetch(&self, url: Option<&str>) -> Result<FetchResult, PollerError> {
        let target = self.resolve(url);

        let resp = match self.client.get(&target).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %target, error = %e, "Inbox request failed");
                let status_text = if e.is_timeout() {
                    "Request Timeout"
                } else {
                    "Network Error"
                };
                return Ok(FetchResult::failed(
                    None,
                    status_text,
                    PollerError::transport(None, e.to_string()),
                ));
            }
        };

        let status = resp.status();
        let code = status.as_u16();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();

        if code >= 400 {
            debug!(url = %target, status = code, "Inbox returned error status");
            return Ok(FetchResult::failed(
                Some(code),
                status_text.clone(),
                PollerError::transport(Some(code), status_text),
            ));
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %target, error = %e, "Inbox response was not JSON");
                return Ok(FetchResult::failed(
                    Some(code),
                    status_text,
                    PollerError::protocol(CONTAINS_REQUIRED),
                ));
            }
        };

        match body.get("contains").and_then(serde_json::Value::as_array) {
            Some(messages) => {
                debug!(url = %target, count = messages.len(), "Fetched inbox");
                Ok(FetchResult::messages(code, status_text, messages.clone()))
            }
            None => Ok(FetchResult::failed(
                Some(code),
                status_text,
                PollerError::protocol(CONTAINS_REQUIRED),
            )),
        }
    }
}

/// Builder for [`HttpInbox`].
pub struct HttpInboxBuilder {
    inbox_url: String,
    timeout: Duration,
    api_key: Option<SecretString>,
    headers: Vec<(String, String)>,
}

impl HttpInboxBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Extra header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<HttpInbox, ConfigError> {
        if self.inbox_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "inbox_url".into(),
                hint: "Pass the inbox URL to poll.".into(),
            });
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let mut value = HeaderValue::from_str(key.expose_secret()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "api_key".into(),
                    message: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: format!("header {name}"),
                    message: e.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidValue {
                key: format!("header {name}"),
                message: e.to_string(),
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "http_client".into(),
                message: e.to_string(),
            })?;

        Ok(HttpInbox {
            inbox_url: self.inbox_url,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_override_joins_inbox_url() {
        let inbox = HttpInbox::new("http://example.com/inbox/").unwrap();
        assert_eq!(inbox.resolve(None), "http://example.com/inbox/");
        assert_eq!(
            inbox.resolve(Some("/status/408")),
            "http://example.com/status/408"
        );
        assert_eq!(
            inbox.resolve(Some("http://other.test/x")),
            "http://other.test/x"
        );
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = HttpInbox::new("  ").unwrap_err();
        assert!(err.to_string().contains("inbox_url is required"));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = HttpInbox::builder("http://example.com")
            .header("bad header", "v")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
