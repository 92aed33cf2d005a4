//! Collaborator traits implemented by concrete sources and sinks.

use crate::ForwarderResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Subscription parameters sent to the source on every (re)connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFilter {
    /// Phrases to track
    pub keywords: Vec<String>,
    /// Language codes to restrict matches to (empty = any)
    pub languages: Vec<String>,
    /// Ask the source to send stall warnings
    pub stall_warnings: bool,
}

/// A streaming source that can be (re)opened with a filter
///
/// # Example
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use stream_forward_core::{ForwarderResult, StreamFilter, StreamSource, Subscription};
///
/// struct Empty;
///
/// #[async_trait]
/// impl Subscription for Empty {
///     async fn next_message(&mut self) -> ForwarderResult<Option<Bytes>> {
///         Ok(None)
///     }
/// }
///
/// struct EmptySource;
///
/// #[async_trait]
/// impl StreamSource for EmptySource {
///     type Subscription = Empty;
///
///     async fn open(&mut self, _filter: &StreamFilter) -> ForwarderResult<Empty> {
///         Ok(Empty)
///     }
/// }
/// ```
#[async_trait]
pub trait StreamSource: Send {
    type Subscription: Subscription;

    /// Open a new subscription.
    ///
    /// Protocol-level refusals (bad credentials, rate limiting) are reported as
    /// [`ForwarderError::SourceStatus`](crate::ForwarderError::SourceStatus).
    async fn open(&mut self, filter: &StreamFilter) -> ForwarderResult<Self::Subscription>;
}

/// An open subscription yielding raw payloads in arrival order
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next payload.
    ///
    /// `Ok(None)` means the remote closed the stream. Errors are terminal for this
    /// subscription.
    async fn next_message(&mut self) -> ForwarderResult<Option<Bytes>>;
}

/// A durable ingestion endpoint accepting discrete records
#[async_trait]
pub trait RecordSink: Send {
    /// Submit one record to the named destination and wait for the outcome
    async fn submit(&mut self, destination: &str, payload: &[u8]) -> ForwarderResult<()>;
}
