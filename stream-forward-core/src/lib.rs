//! # Stream Forward Core
//!
//! Core runtime for forwarding a keyword-filtered message stream into a durable
//! ingestion sink.
//!
//! A [`StreamForwarder`] owns exactly one [`StreamSource`] and one [`RecordSink`]. It
//! opens a filtered subscription, turns every post into a tab-separated
//! [`OutboundRecord`] and submits it, one message at a time. When the subscription
//! fails it waits a fixed delay and reconnects, until its cancellation token fires.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use stream_forward_core::{
//!     ForwarderConfig, ForwarderResult, RecordSink, StreamForwarder, StreamSource,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct StdoutSink;
//!
//! #[async_trait]
//! impl RecordSink for StdoutSink {
//!     async fn submit(&mut self, destination: &str, payload: &[u8]) -> ForwarderResult<()> {
//!         println!("{} <- {} bytes", destination, payload.len());
//!         Ok(())
//!     }
//! }
//!
//! async fn forward<S: StreamSource>(source: S) -> ForwarderResult<()> {
//!     let config = ForwarderConfig::default();
//!     let mut forwarder =
//!         StreamForwarder::new(source, StdoutSink, config, CancellationToken::new())?;
//!     forwarder.run().await
//! }
//! ```
//!
//! ## Failure handling
//!
//! - malformed posts and sink rejections are logged and skipped; the subscription stays open
//! - source errors (status codes, network failures, stream end) trigger a reconnect
//! - nothing is retried or persisted; a record that fails to submit is lost

mod config;
mod error;
mod forwarder;
mod message;
mod metrics;
mod record;
mod traits;

// Re-export public API
pub use config::ForwarderConfig;
pub use error::{ForwarderError, ForwarderResult};
pub use forwarder::{ForwarderState, MessageOutcome, StreamForwarder};
pub use message::{Author, Entities, InboundMessage, ParsedMessage, StreamNotice};
pub use metrics::ForwarderMetrics;
pub use record::{
    normalize_text, render_value, OutboundRecord, ABSENT_MARKER, FIELD_COUNT, FIELD_SEPARATOR,
    RECORD_TERMINATOR,
};
pub use traits::{RecordSink, StreamFilter, StreamSource, Subscription};
