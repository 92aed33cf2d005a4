//! Error taxonomy for the forwarder.
//!
//! Every variant belongs to exactly one handling class:
//! - message level: the current message is logged and skipped, the subscription stays open
//! - reconnectable: the subscription is dropped and reopened after the reconnect delay
//! - fatal: configuration errors, which no reconnect can fix; `run` returns them

use std::error::Error as StdError;
use thiserror::Error;

/// Result type used throughout the forwarder
pub type ForwarderResult<T> = Result<T, ForwarderError>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised while forwarding a stream into a sink
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// A message carried a body but one of the forwarded fields was missing or mistyped
    #[error("Failed to extract message fields: {message}")]
    Extraction { message: String, payload: Vec<u8> },

    /// The source answered with a protocol-level status (rate limiting, auth failure, ...)
    #[error("Source reported status {code}: {description}")]
    SourceStatus { code: u16, description: String },

    /// Network or transport failure on the source side, including the remote closing the stream
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The sink could not be reached
    #[error("Sink error: {message}")]
    Sink {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The sink was reached but refused the record
    #[error("Sink rejected record (status {status}): {message}")]
    SinkRejected { status: u16, message: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ForwarderError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an extraction error for the given raw payload
    pub fn extraction(message: impl Into<String>, payload: &[u8]) -> Self {
        Self::Extraction {
            message: message.into(),
            payload: payload.to_vec(),
        }
    }

    /// Create a protocol status error reported by the source
    pub fn source_status(code: u16, description: impl Into<String>) -> Self {
        Self::SourceStatus {
            code,
            description: description.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping its cause
    pub fn connection_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            source: None,
        }
    }

    /// Create a sink error wrapping its cause
    pub fn sink_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Sink {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a sink rejection carrying the sink's status code
    pub fn sink_rejected(status: u16, message: impl Into<String>) -> Self {
        Self::SinkRejected {
            status,
            message: message.into(),
        }
    }

    /// Errors that only affect the message being handled
    pub fn is_message_level(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. }
                | Self::Sink { .. }
                | Self::SinkRejected { .. }
                | Self::Serialization(_)
        )
    }

    /// Errors that break the subscription and call for a reconnect
    pub fn is_reconnectable(&self) -> bool {
        matches!(
            self,
            Self::SourceStatus { .. } | Self::Connection { .. }
        )
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction",
            Self::SourceStatus { .. } => "source_status",
            Self::Connection { .. } => "connection",
            Self::Sink { .. } => "sink",
            Self::SinkRejected { .. } => "sink_rejected",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for ForwarderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
