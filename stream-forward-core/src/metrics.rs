//! Forwarder metrics.
//!
//! Reported through the `metrics` facade; nothing is exported unless the host
//! process installs a recorder.

use ::metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Per-forwarder metric handles, labelled with the sink destination
#[derive(Debug, Clone)]
pub struct ForwarderMetrics {
    destination: String,
}

impl ForwarderMetrics {
    pub fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
        }
    }

    pub fn record_received(&self) {
        counter!("forwarder_messages_received_total", "destination" => self.destination.clone())
            .increment(1);
    }

    pub fn record_forwarded(&self, duration: Duration) {
        counter!("forwarder_records_forwarded_total", "destination" => self.destination.clone())
            .increment(1);
        histogram!("forwarder_submit_duration_seconds", "destination" => self.destination.clone())
            .record(duration.as_secs_f64());
    }

    pub fn record_skipped(&self) {
        counter!("forwarder_messages_skipped_total", "destination" => self.destination.clone())
            .increment(1);
    }

    pub fn record_failed(&self, kind: &'static str) {
        counter!(
            "forwarder_messages_failed_total",
            "destination" => self.destination.clone(),
            "kind" => kind
        )
        .increment(1);
    }

    pub fn record_reconnect(&self) {
        counter!("forwarder_reconnects_total", "destination" => self.destination.clone())
            .increment(1);
    }

    /// 1.0 while a subscription is open
    pub fn set_connected(&self, connected: bool) {
        gauge!("forwarder_connected", "destination" => self.destination.clone())
            .set(if connected { 1.0 } else { 0.0 });
    }
}
