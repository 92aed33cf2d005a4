//! Replay source example
//!
//! Replays a handful of canned stream payloads through a forwarder and prints
//! every submitted record instead of sending it anywhere.
//!
//! Usage:
//!   RUST_LOG=debug cargo run --example replay_source

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use stream_forward_core::{
    ForwarderConfig, ForwarderResult, RecordSink, StreamFilter, StreamForwarder, StreamSource,
    Subscription,
};
use tokio_util::sync::CancellationToken;

const PAYLOADS: &[&str] = &[
    r#"{"id":1,"text":"Watching Netflix tonight","created_at":"Mon Jan 01 10:00:00 +0000 2024","user":{"name":"Ann","screen_name":"ann","followers_count":12,"statuses_count":340,"location":"Toronto"},"entities":{"hashtags":[]},"geo":null,"reply_count":0,"retweet_count":1,"favorite_count":4}"#,
    r#"{"limit":{"track":3}}"#,
    r#"{"id":2,"text":"new #netflix\nseason is out","created_at":"Mon Jan 01 10:00:05 +0000 2024","user":{"name":"Bo","screen_name":"bo_","followers_count":7,"statuses_count":21,"location":null},"entities":{"hashtags":[{"text":"netflix","indices":[4,12]}]},"geo":null,"reply_count":2,"retweet_count":0,"favorite_count":9}"#,
    "not json at all",
];

/// Source that serves [`PAYLOADS`] once and then requests shutdown
struct ReplaySource {
    shutdown: CancellationToken,
}

struct ReplaySubscription {
    pending: VecDeque<Bytes>,
    shutdown: CancellationToken,
}

#[async_trait]
impl StreamSource for ReplaySource {
    type Subscription = ReplaySubscription;

    async fn open(&mut self, filter: &StreamFilter) -> ForwarderResult<ReplaySubscription> {
        println!("Opening replay subscription for {:?}", filter.keywords);
        Ok(ReplaySubscription {
            pending: PAYLOADS.iter().map(|p| Bytes::from_static(p.as_bytes())).collect(),
            shutdown: self.shutdown.clone(),
        })
    }
}

#[async_trait]
impl Subscription for ReplaySubscription {
    async fn next_message(&mut self) -> ForwarderResult<Option<Bytes>> {
        if let Some(payload) = self.pending.pop_front() {
            return Ok(Some(payload));
        }

        // Replay finished
        self.shutdown.cancel();
        self.shutdown.cancelled().await;
        Ok(None)
    }
}

/// Sink that prints records instead of submitting them
struct PrintSink {
    submitted: usize,
}

#[async_trait]
impl RecordSink for PrintSink {
    async fn submit(&mut self, destination: &str, payload: &[u8]) -> ForwarderResult<()> {
        self.submitted += 1;
        println!(
            "[{}] record #{}: {:?}",
            destination,
            self.submitted,
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ForwarderResult<()> {
    let config = ForwarderConfig {
        echo_records: false,
        ..ForwarderConfig::default()
    };

    let shutdown = CancellationToken::new();
    let source = ReplaySource {
        shutdown: shutdown.clone(),
    };

    let mut forwarder = StreamForwarder::new(source, PrintSink { submitted: 0 }, config, shutdown)?;
    forwarder.run().await?;

    println!("Replay finished in state {:?}", forwarder.state());
    Ok(())
}
