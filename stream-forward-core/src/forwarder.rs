//! The stream forwarder loop.
//!
//! The forwarder owns one source and one sink for its whole lifetime:
//! - opens a filtered subscription and handles payloads one at a time, in arrival order
//! - turns each post into an [`OutboundRecord`] and submits it before reading the next payload
//! - on any subscription error, waits the fixed reconnect delay and opens a new subscription
//! - stops only when its cancellation token fires

use crate::message::{ParsedMessage, StreamNotice};
use crate::{
    ForwarderConfig, ForwarderError, ForwarderMetrics, ForwarderResult, OutboundRecord,
    RecordSink, StreamFilter, StreamSource, Subscription,
};
use std::io::Write;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state of the forwarder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderState {
    /// No subscription open; about to (re)connect
    Disconnected,
    /// A subscription is open and payloads are being handled
    Connected,
    /// Cancelled; the loop has exited
    Stopped,
}

/// What happened to a single inbound payload
#[derive(Debug)]
pub enum MessageOutcome {
    /// The record was accepted by the sink
    Forwarded(OutboundRecord),
    /// Not a post; nothing was submitted
    Skipped(StreamNotice),
    /// The payload or its submission failed; the subscription is unaffected
    Failed(ForwarderError),
}

/// Why a subscription ended
enum SessionEnd {
    Cancelled,
    Failed(ForwarderError),
}

/// Bridges one inbound stream to one outbound sink
pub struct StreamForwarder<S: StreamSource, K: RecordSink> {
    source: S,
    sink: K,
    config: ForwarderConfig,
    filter: StreamFilter,
    metrics: ForwarderMetrics,
    state: ForwarderState,
    shutdown: CancellationToken,
}

impl<S: StreamSource, K: RecordSink> StreamForwarder<S, K> {
    /// Create a new forwarder
    pub fn new(
        source: S,
        sink: K,
        config: ForwarderConfig,
        shutdown: CancellationToken,
    ) -> ForwarderResult<Self> {
        config.validate()?;

        Self::init_tracing(&config);

        info!("Initializing Stream Forwarder");
        info!("Keywords: {:?}", config.keywords);
        info!("Languages: {:?}", config.languages);
        info!("Destination: {}", config.destination);

        let filter = config.filter();
        let metrics = ForwarderMetrics::new(&config.destination);
        metrics.set_connected(false);

        Ok(Self {
            source,
            sink,
            config,
            filter,
            metrics,
            state: ForwarderState::Disconnected,
            shutdown,
        })
    }

    pub fn state(&self) -> ForwarderState {
        self.state
    }

    /// Token that stops the forwarder when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until cancelled.
    ///
    /// Reconnectable and message-level errors from the source lead to a reconnect after
    /// the fixed delay. Anything else (a configuration error) stops the loop and is returned.
    pub async fn run(&mut self) -> ForwarderResult<()> {
        info!("Starting Stream Forwarder");
        let delay = self.config.reconnect_delay();

        while !self.shutdown.is_cancelled() {
            let err = match self.run_session().await {
                SessionEnd::Cancelled => break,
                SessionEnd::Failed(err) => err,
            };

            self.set_state(ForwarderState::Disconnected);
            self.on_source_error(&err);

            if !err.is_reconnectable() && !err.is_message_level() {
                self.set_state(ForwarderState::Stopped);
                return Err(err);
            }

            info!("Disconnected, reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.metrics.record_reconnect();
        }

        self.set_state(ForwarderState::Stopped);
        info!("Stream Forwarder stopped");
        Ok(())
    }

    /// Open one subscription and drain it until it fails or the token fires
    async fn run_session(&mut self) -> SessionEnd {
        info!("Opening stream subscription");

        let opened = tokio::select! {
            _ = self.shutdown.cancelled() => return SessionEnd::Cancelled,
            opened = self.source.open(&self.filter) => opened,
        };

        let mut subscription = match opened {
            Ok(subscription) => subscription,
            Err(err) => return SessionEnd::Failed(err),
        };

        self.set_state(ForwarderState::Connected);
        info!("Stream subscription open");

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => return SessionEnd::Cancelled,
                next = subscription.next_message() => next,
            };

            match next {
                Ok(Some(raw)) => {
                    self.on_message(&raw).await;
                }
                Ok(None) => {
                    return SessionEnd::Failed(ForwarderError::connection("Stream closed by remote"))
                }
                Err(err) => return SessionEnd::Failed(err),
            }
        }
    }

    /// Handle one raw payload.
    ///
    /// Payloads without a `text` key are skipped. Posts are formatted, echoed to stdout
    /// when enabled, and submitted to the sink. Failures are logged and reported in the
    /// outcome; they never propagate.
    pub async fn on_message(&mut self, raw: &[u8]) -> MessageOutcome {
        self.metrics.record_received();

        let message = match ParsedMessage::parse(raw) {
            Ok(ParsedMessage::Post(message)) => message,
            Ok(ParsedMessage::Notice(notice)) => {
                if notice.is_warning() {
                    warn!("Stream notice: {:?}", notice);
                } else {
                    debug!("Skipping stream notice: {:?}", notice);
                }
                self.metrics.record_skipped();
                return MessageOutcome::Skipped(notice);
            }
            Err(err) => return self.message_failed(err),
        };

        let record = OutboundRecord::from_message(&message);

        if self.config.echo_records {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(record.as_bytes()).and_then(|_| stdout.flush()) {
                debug!("Failed to echo record: {}", e);
            }
        }

        let start = Instant::now();
        match self
            .sink
            .submit(&self.config.destination, record.as_bytes())
            .await
        {
            Ok(()) => {
                self.metrics.record_forwarded(start.elapsed());
                debug!("Forwarded message {} ({} bytes)", message.id, record.len());
                MessageOutcome::Forwarded(record)
            }
            Err(err) => self.message_failed(err),
        }
    }

    /// Log a protocol status or connection failure reported by the source
    pub fn on_source_error(&self, err: &ForwarderError) {
        match err {
            ForwarderError::SourceStatus { code, description } => {
                error!("Source reported status {}: {}", code, description);
            }
            err if err.is_reconnectable() => {
                warn!("Stream connection lost: {}", err);
            }
            err if err.is_message_level() => {
                error!("Unexpected {} error from source: {}", err.kind(), err);
            }
            err => {
                error!("Source misconfigured: {}", err);
            }
        }
    }

    fn message_failed(&self, err: ForwarderError) -> MessageOutcome {
        match &err {
            ForwarderError::Extraction { message, payload } => {
                warn!(
                    "Skipping malformed message ({} bytes): {}",
                    payload.len(),
                    message
                );
            }
            err if err.is_message_level() => error!("Failed to forward message: {}", err),
            err => error!("Unexpected {} error while forwarding: {}", err.kind(), err),
        }
        self.metrics.record_failed(err.kind());
        MessageOutcome::Failed(err)
    }

    fn set_state(&mut self, state: ForwarderState) {
        if self.state != state {
            debug!("Forwarder state {:?} -> {:?}", self.state, state);
        }
        self.metrics
            .set_connected(state == ForwarderState::Connected);
        self.state = state;
    }

    /// Initialize tracing/logging
    fn init_tracing(config: &ForwarderConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}
