//! Twitter filtered-stream source
//!
//! Opens a long-lived `POST statuses/filter` request and splits the chunked response
//! body into `\r\n`-delimited JSON documents.

use crate::config::TwitterConfig;
use crate::oauth::{form_encode, OAuthParams, Token};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use stream_forward_core::{
    ForwarderError, ForwarderResult, StreamFilter, StreamSource, Subscription,
};
use tracing::{debug, info};

const DELIMITER: &[u8] = b"\r\n";

/// Largest accepted frame; posts are a few kilobytes at most
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Source connecting to the filtered statuses stream
pub struct TwitterStreamSource {
    client: reqwest::Client,
    stream_url: String,
    token: Token,
    stall_timeout: Duration,
}

impl TwitterStreamSource {
    pub fn new(config: &TwitterConfig) -> ForwarderResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ForwarderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            stream_url: config.stream_url.clone(),
            token: config.token(),
            stall_timeout: config.stall_timeout(),
        })
    }
}

/// Form parameters for a filter request
pub fn filter_params(filter: &StreamFilter) -> Vec<(String, String)> {
    let mut params = vec![("track".to_string(), filter.keywords.join(","))];

    if !filter.languages.is_empty() {
        params.push(("language".to_string(), filter.languages.join(",")));
    }

    if filter.stall_warnings {
        params.push(("stall_warnings".to_string(), "true".to_string()));
    }

    params
}

#[async_trait]
impl StreamSource for TwitterStreamSource {
    type Subscription = TwitterSubscription;

    async fn open(&mut self, filter: &StreamFilter) -> ForwarderResult<TwitterSubscription> {
        let params = filter_params(filter);
        let authorization = OAuthParams::new().sign(&self.token, "POST", &self.stream_url, &params)?;

        debug!("Connecting to {} with {:?}", self.stream_url, params);

        let response = self
            .client
            .post(&self.stream_url)
            .header(AUTHORIZATION, authorization.to_string())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_encode(&params))
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    ForwarderError::config(format!("Invalid stream request: {}", e))
                } else {
                    ForwarderError::connection_with_source("Failed to connect to stream", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                body.trim().to_string()
            };
            return Err(ForwarderError::source_status(status.as_u16(), description));
        }

        info!("Connected to stream ({})", status);
        Ok(TwitterSubscription::new(
            response.bytes_stream().boxed(),
            self.stall_timeout,
        ))
    }
}

/// An open filtered stream
pub struct TwitterSubscription {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    framer: LineFramer,
    stall_timeout: Duration,
}

impl TwitterSubscription {
    pub fn new(body: BoxStream<'static, reqwest::Result<Bytes>>, stall_timeout: Duration) -> Self {
        Self {
            body,
            framer: LineFramer::default(),
            stall_timeout,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.framer = LineFramer::new(max_frame_size);
        self
    }
}

#[async_trait]
impl Subscription for TwitterSubscription {
    async fn next_message(&mut self) -> ForwarderResult<Option<Bytes>> {
        loop {
            if let Some(frame) = self.framer.next_frame()? {
                return Ok(Some(frame));
            }

            let chunk = tokio::time::timeout(self.stall_timeout, self.body.next())
                .await
                .map_err(|_| {
                    ForwarderError::connection(format!(
                        "No data received for {:?}",
                        self.stall_timeout
                    ))
                })?;

            match chunk {
                Some(Ok(chunk)) => self.framer.push(&chunk),
                Some(Err(e)) => {
                    return Err(ForwarderError::connection_with_source(
                        "Failed to read stream body",
                        e,
                    ))
                }
                None => {
                    if self.framer.pending() > 0 {
                        debug!(
                            "Stream ended with {} undelimited bytes",
                            self.framer.pending()
                        );
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// Splits a byte stream into `\r\n`-delimited frames, dropping blank keep-alive lines
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    /// Leading bytes of `buf` already searched for a delimiter
    scanned: usize,
    max_frame_size: usize,
}

impl LineFramer {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_frame_size,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete, non-blank frame, without its delimiter.
    ///
    /// Fails once a frame grows past the size limit; the stream can't be resynchronised
    /// after that, so the caller should drop the connection.
    pub fn next_frame(&mut self) -> ForwarderResult<Option<Bytes>> {
        loop {
            // a delimiter may straddle the end of the previous scan
            let start = self.scanned.saturating_sub(DELIMITER.len() - 1);
            let found = self.buf[start..]
                .windows(DELIMITER.len())
                .position(|w| w == DELIMITER)
                .map(|idx| start + idx);

            let Some(pos) = found else {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_frame_size + DELIMITER.len() {
                    return Err(self.oversized());
                }
                return Ok(None);
            };

            self.scanned = 0;
            if pos > self.max_frame_size {
                return Err(self.oversized());
            }

            let mut frame = self.buf.split_to(pos + DELIMITER.len());
            frame.truncate(pos);

            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Ok(Some(frame.freeze()));
        }
    }

    /// Bytes buffered without a delimiter yet
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn oversized(&self) -> ForwarderError {
        ForwarderError::connection(format!(
            "Stream frame exceeds {} bytes without a delimiter",
            self.max_frame_size
        ))
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn filter() -> StreamFilter {
        StreamFilter {
            keywords: vec!["Netflix".to_string(), "netflix".to_string()],
            languages: vec!["en".to_string()],
            stall_warnings: true,
        }
    }

    fn config(stream_url: String) -> TwitterConfig {
        TwitterConfig {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            access_token: "at".to_string(),
            access_token_secret: "ats".to_string(),
            stream_url,
            connect_timeout_secs: 5,
            stall_timeout_secs: 5,
        }
    }

    /// Serve one canned HTTP response, returning the request text it received
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/1.1/statuses/filter.json", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }

            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(request).unwrap()
        });

        (url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= content_length
    }

    #[test]
    fn test_filter_params() {
        let params = filter_params(&filter());
        assert_eq!(
            form_encode(&params),
            "track=Netflix%2Cnetflix&language=en&stall_warnings=true"
        );

        let bare = StreamFilter {
            keywords: vec!["rust".to_string()],
            languages: vec![],
            stall_warnings: false,
        };
        assert_eq!(form_encode(&filter_params(&bare)), "track=rust");
    }

    #[test]
    fn test_framer_splits_across_chunks() {
        let mut framer = LineFramer::default();

        framer.push(b"{\"text\":\"a\"}\r");
        assert!(framer.next_frame().unwrap().is_none());

        framer.push(b"\n\r\n{\"te");
        assert_eq!(framer.next_frame().unwrap().unwrap(), &b"{\"text\":\"a\"}"[..]);
        assert!(framer.next_frame().unwrap().is_none());
        assert_eq!(framer.pending(), 5);

        framer.push(b"xt\":\"b\"}\r\n{\"delete\":{}}\r\n");
        assert_eq!(framer.next_frame().unwrap().unwrap(), &b"{\"text\":\"b\"}"[..]);
        assert_eq!(framer.next_frame().unwrap().unwrap(), &b"{\"delete\":{}}"[..]);
        assert!(framer.next_frame().unwrap().is_none());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_framer_keeps_escaped_newlines() {
        let mut framer = LineFramer::default();
        framer.push(b"{\"text\":\"line\\nbreak\"}\r\n");

        assert_eq!(
            framer.next_frame().unwrap().unwrap(),
            &b"{\"text\":\"line\\nbreak\"}"[..]
        );
    }

    #[test]
    fn test_framer_scans_each_chunk_once() {
        let mut framer = LineFramer::new(64);

        for _ in 0..10 {
            framer.push(b"abcd");
            assert!(framer.next_frame().unwrap().is_none());
            assert_eq!(framer.scanned, framer.pending());
        }

        framer.push(b"\r");
        assert!(framer.next_frame().unwrap().is_none());
        framer.push(b"\nrest");
        assert_eq!(framer.next_frame().unwrap().unwrap(), &b"abcd".repeat(10)[..]);
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn test_framer_rejects_oversized_frames() {
        let mut framer = LineFramer::new(16);
        framer.push(&[b'x'; 32]);
        let err = framer.next_frame().unwrap_err();
        assert!(matches!(err, ForwarderError::Connection { .. }));
        assert!(err.is_reconnectable());

        // a complete frame over the limit fails too
        let mut framer = LineFramer::new(16);
        framer.push(&[b'y'; 17]);
        framer.push(b"\r\n");
        assert!(framer.next_frame().is_err());

        let mut framer = LineFramer::new(16);
        framer.push(&[b'z'; 16]);
        framer.push(b"\r\n");
        assert_eq!(framer.next_frame().unwrap().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_subscription_drops_undelimited_stream() {
        let chunks: Vec<reqwest::Result<Bytes>> = (0..8)
            .map(|_| Ok(Bytes::from(vec![b'a'; 1024])))
            .collect();
        let mut subscription =
            TwitterSubscription::new(stream::iter(chunks).boxed(), Duration::from_secs(5))
                .with_max_frame_size(4096);

        let err = subscription.next_message().await.unwrap_err();
        assert!(matches!(err, ForwarderError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_subscription_yields_frames_then_ends() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"\r\n")),
            Ok(Bytes::from_static(b"{\"id\":1}\r\n{\"i")),
            Ok(Bytes::from_static(b"d\":2}\r\n")),
        ];
        let mut subscription =
            TwitterSubscription::new(stream::iter(chunks).boxed(), Duration::from_secs(5));

        assert_eq!(
            subscription.next_message().await.unwrap().unwrap(),
            &b"{\"id\":1}"[..]
        );
        assert_eq!(
            subscription.next_message().await.unwrap().unwrap(),
            &b"{\"id\":2}"[..]
        );
        assert!(subscription.next_message().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_times_out_when_stalled() {
        let body = stream::pending::<reqwest::Result<Bytes>>().boxed();
        let mut subscription = TwitterSubscription::new(body, Duration::from_secs(90));

        let err = subscription.next_message().await.unwrap_err();
        assert!(matches!(err, ForwarderError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_open_reports_http_status() {
        let body = "Exceeded connection limit for user";
        let response = format!(
            "HTTP/1.1 420 Enhance Your Calm\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (url, server) = serve_once(response).await;

        let mut source = TwitterStreamSource::new(&config(url)).unwrap();
        let err = source.open(&filter()).await.err().unwrap();

        match err {
            ForwarderError::SourceStatus { code, description } => {
                assert_eq!(code, 420);
                assert_eq!(description, body);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /1.1/statuses/filter.json"));
    }

    #[tokio::test]
    async fn test_open_streams_messages() {
        let body = "{\"id\":1,\"text\":\"hi\"}\r\n\r\n{\"delete\":{\"status\":{\"id\":9}}}\r\n";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (url, server) = serve_once(response).await;

        let mut source = TwitterStreamSource::new(&config(url)).unwrap();
        let mut subscription = source.open(&filter()).await.unwrap();

        assert_eq!(
            subscription.next_message().await.unwrap().unwrap(),
            &b"{\"id\":1,\"text\":\"hi\"}"[..]
        );
        assert_eq!(
            subscription.next_message().await.unwrap().unwrap(),
            &b"{\"delete\":{\"status\":{\"id\":9}}}"[..]
        );
        assert!(subscription.next_message().await.unwrap().is_none());

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("authorization: oauth oauth_consumer_key=\"ck\""));
        assert!(lower.contains("content-type: application/x-www-form-urlencoded"));
        assert!(request.ends_with("track=Netflix%2Cnetflix&language=en&stall_warnings=true"));
    }

    #[tokio::test]
    async fn test_open_rejects_malformed_url() {
        let mut source = TwitterStreamSource::new(&config("http://".to_string())).unwrap();
        let err = source.open(&filter()).await.err().unwrap();

        assert!(matches!(err, ForwarderError::Config(_)));
    }
}
