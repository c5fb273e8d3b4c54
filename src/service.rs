//! Poll loop: owns the run/stop state and sequences one iteration
//! (fetch, process response, report, back off).
//!
//! State is a single `stopped` flag. `start()` flips it and spawns a driver
//! task that calls `run()` until an iteration halts; an iteration only
//! halts once the flag is set (by `stop()` or by a fatal step, which routes
//! through `stop()` first). `stop()` never interrupts an iteration in
//! flight; the driver notices at the top of the next `run()`. Each `start()`
//! begins a new generation, so a driver left over from before a restart
//! halts instead of polling alongside the new one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{PollerConfig, normalize_wait_time};
use crate::error::{ConfigError, PollerError};
use crate::events::{Event, EventBus, EventType, Payload, now_millis};
use crate::gate::WaitGate;
use crate::handler::MessageHandler;
use crate::inbox::{FetchResult, HttpInbox, Inbox, Message};
use crate::processor::Processor;

/// Terminal outcome of an iteration.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct Halt {
    pub error: PollerError,
    /// The event describing the failure, when one was published.
    pub event: Option<Arc<Event>>,
}

impl Halt {
    fn stopped() -> Self {
        Self {
            error: PollerError::Stopped,
            event: None,
        }
    }
}

/// Result of one [`Poller::run`] iteration.
pub type RunResult = Result<Arc<Event>, Halt>;

/// Polls an inbox and hands each message to a handler.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

struct Inner {
    inbox_url: String,
    bus: Arc<EventBus>,
    inbox: Arc<dyn Inbox>,
    processor: Processor,
    gate: WaitGate,
    stopped: AtomicBool,
    /// Bumped by every `start()` and `stop()`; a driver only runs for the
    /// generation it was spawned with.
    generation: AtomicU64,
}

impl Poller {
    pub fn builder() -> PollerBuilder {
        PollerBuilder::default()
    }

    /// Poller with default options over the HTTP inbox at `inbox_url`.
    pub fn create(
        inbox_url: impl Into<String>,
        handler: impl MessageHandler + 'static,
    ) -> Result<Self, ConfigError> {
        Self::builder().inbox_url(inbox_url).handler(handler).build()
    }

    pub fn from_config(
        config: PollerConfig,
        handler: impl MessageHandler + 'static,
    ) -> Result<Self, ConfigError> {
        Self::builder().config(config).handler(handler).build()
    }

    pub fn inbox_url(&self) -> &str {
        &self.inner.inbox_url
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn wait_time(&self) -> Duration {
        self.inner.gate.wait_time()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Start polling on the current tokio runtime.
    ///
    /// Returns the driver's handle, or `None` if already running. The
    /// handle resolves to the [`Halt`] that ended the loop.
    pub fn start(&self) -> Option<JoinHandle<Halt>> {
        if self
            .inner
            .stopped
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(url = %self.inner.inbox_url, "Poller already running");
            return None;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .bus
            .publish(Event::new(EventType::ServiceStart).with_start_time(now_millis()));
        info!(
            url = %self.inner.inbox_url,
            wait_secs = self.wait_time().as_secs_f64(),
            "Poller started"
        );

        let poller = self.clone();
        Some(tokio::spawn(async move { poller.drive(generation).await }))
    }

    /// Stop polling. Returns `false` if already stopped.
    pub fn stop(&self, error: Option<PollerError>, value: Option<Payload>) -> bool {
        if self
            .inner
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        // Retire the current driver even if `start()` runs before it wakes.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let mut event = Event::new(EventType::ServiceStop).with_start_time(now_millis());
        if let Some(error) = error {
            warn!(error = %error, "Poller stopping on error");
            event = event.with_error(error);
        } else {
            info!(url = %self.inner.inbox_url, "Poller stopping");
        }
        if let Some(value) = value {
            event = event.with_result(value);
        }
        self.inner.bus.publish(event);
        true
    }

    /// Iterate until an iteration halts, then report the exit.
    async fn drive(self, generation: u64) -> Halt {
        loop {
            match self.iterate(generation).await {
                Ok(_) => tokio::task::yield_now().await,
                Err(halt) => {
                    self.exit(&halt);
                    return halt;
                }
            }
        }
    }

    fn exit(&self, halt: &Halt) {
        let mut event = Event::new(EventType::ServiceStopCompleted).with_error(halt.error.clone());
        if let Some(cause) = &halt.event {
            event = event.with_result(Payload::Event(Arc::clone(cause)));
        }
        self.inner.bus.publish(event);
        info!(reason = %halt.error, "Poller stopped");
    }

    /// One iteration.
    ///
    /// `Ok` carries `service:process:completed` and returns after any
    /// backoff. `Err` means the loop must end: the poller was already
    /// stopped, or a step failed fatally (which stops it).
    pub async fn run(&self) -> RunResult {
        self.iterate(self.inner.generation.load(Ordering::SeqCst)).await
    }

    async fn iterate(&self, generation: u64) -> RunResult {
        if self.is_stopped() || self.inner.generation.load(Ordering::SeqCst) != generation {
            return Err(Halt::stopped());
        }

        let start_time = now_millis();
        self.inner
            .bus
            .publish(Event::new(EventType::ServiceProcessStart).with_start_time(start_time));

        let poll = self.poll(None).await;

        match self.process_response(&poll).await {
            Ok(outcome) => {
                let completed = self.inner.bus.publish(
                    Event::new(EventType::ServiceProcessCompleted)
                        .with_start_time(start_time)
                        .with_end_time(now_millis())
                        .with_result(Payload::Event(Arc::clone(&outcome))),
                );
                self.inner.gate.wait(&outcome).await;
                Ok(completed)
            }
            Err(halt) => {
                let failed = self.inner.bus.publish(
                    Event::failed(EventType::ServiceProcessFailed, halt.error.clone())
                        .with_end_time(now_millis()),
                );
                self.stop(
                    Some(halt.error.clone()),
                    Some(Payload::Event(Arc::clone(&failed))),
                );
                Err(Halt {
                    error: halt.error,
                    event: Some(failed),
                })
            }
        }
    }

    /// Fetch once and publish `inbox:fetch:completed` or `inbox:fetch:failed`.
    ///
    /// Never fails: a client error, including an unexpected `Err`, becomes
    /// `inbox:fetch:failed`.
    pub async fn poll(&self, url: Option<&str>) -> Arc<Event> {
        let target = url.unwrap_or(self.inner.inbox.url()).to_string();
        let object = Payload::Json(serde_json::Value::String(target.clone()));

        let event = match self.inner.inbox.fetch(url).await {
            Ok(fetch) => {
                let event = match &fetch {
                    FetchResult::Messages { .. } => Event::new(EventType::InboxFetchCompleted),
                    FetchResult::Failed { error, status, .. } => {
                        debug!(url = %target, status = ?status, error = %error, "Inbox fetch failed");
                        Event::failed(EventType::InboxFetchFailed, error.clone())
                    }
                };
                event.with_object(object).with_result(Payload::Fetch(fetch))
            }
            Err(error) => {
                warn!(url = %target, error = %error, "Inbox fetch errored");
                Event::failed(EventType::InboxFetchFailed, error).with_object(object)
            }
        };

        self.inner.bus.publish(event)
    }

    pub async fn process_message(&self, message: Message) -> Arc<Event> {
        self.inner.processor.process_message(message).await
    }

    /// Process a poll event. A malformed response stops the poller before
    /// the error is returned.
    pub async fn process_response(&self, poll: &Arc<Event>) -> RunResult {
        self.inner.processor.process_response(poll).await.inspect_err(|halt| {
            self.stop(
                Some(halt.error.clone()),
                halt.event.as_ref().map(|e| Payload::Event(Arc::clone(e))),
            );
        })
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("inbox_url", &self.inner.inbox_url)
            .field("wait_time", &self.wait_time())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Builds a [`Poller`], failing fast on missing required options.
#[derive(Default)]
pub struct PollerBuilder {
    inbox_url: Option<String>,
    handler: Option<Arc<dyn MessageHandler>>,
    wait_time: Option<Duration>,
    inbox: Option<Arc<dyn Inbox>>,
    bus: Option<Arc<EventBus>>,
    config: Option<PollerConfig>,
}

impl PollerBuilder {
    pub fn inbox_url(mut self, inbox_url: impl Into<String>) -> Self {
        self.inbox_url = Some(inbox_url.into());
        self
    }

    pub fn handler(self, handler: impl MessageHandler + 'static) -> Self {
        self.shared_handler(Arc::new(handler))
    }

    pub fn shared_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Backoff after empty or failed polls. Zero means the default.
    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }

    /// Use a custom inbox client instead of [`HttpInbox`].
    pub fn inbox(mut self, inbox: Arc<dyn Inbox>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Publish on an existing bus instead of a fresh one.
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Take URL, wait time, HTTP options and type emission from `config`.
    /// Explicit builder calls win over config values.
    pub fn config(mut self, config: PollerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Poller, ConfigError> {
        let config = self.config;

        let inbox_url = self
            .inbox_url
            .or_else(|| config.as_ref().map(|c| c.inbox_url.clone()))
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "inbox_url".into(),
                hint: "Pass the inbox URL to poll.".into(),
            })?;

        let handler = self.handler.ok_or_else(|| ConfigError::MissingRequired {
            key: "handle_message".into(),
            hint: "Pass a handler for inbox messages.".into(),
        })?;

        let wait_time = normalize_wait_time(
            self.wait_time
                .or_else(|| config.as_ref().map(|c| c.wait_time))
                .unwrap_or(Duration::ZERO),
        );

        let inbox: Arc<dyn Inbox> = match self.inbox {
            Some(inbox) => inbox,
            None => {
                let mut http = HttpInbox::builder(inbox_url.clone());
                if let Some(c) = &config {
                    http = http.timeout(c.request_timeout).api_key(c.api_key.clone());
                }
                Arc::new(http.build()?)
            }
        };

        let bus = match self.bus {
            Some(bus) => {
                if let Some(c) = &config {
                    bus.set_emit_event_types(c.emit_event_types);
                }
                bus
            }
            None => Arc::new(
                EventBus::builder()
                    .emit_event_types(config.as_ref().is_none_or(|c| c.emit_event_types))
                    .build(),
            ),
        };

        Ok(Poller {
            inner: Arc::new(Inner {
                inbox_url,
                processor: Processor::new(Arc::clone(&bus), handler),
                gate: WaitGate::new(Arc::clone(&bus), wait_time),
                bus,
                inbox,
                stopped: AtomicBool::new(true),
                generation: AtomicU64::new(0),
            }),
        })
    }
}
