//! Twitter to Kinesis Firehose forwarder
//!
//! Subscribes to the keyword-filtered Twitter stream and submits every post
//! as one tab-separated record to a Firehose delivery stream.

mod config;
mod credentials;
mod oauth;
mod sigv4;
mod sink;
mod source;

use anyhow::Context;
use config::TwitterFirehoseConfig;
use credentials::CredentialsChain;
use sink::FirehoseSink;
use source::TwitterStreamSource;
use stream_forward_core::StreamForwarder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = TwitterFirehoseConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.core.log_level);

    tracing::info!("Starting Twitter Firehose forwarder");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    config.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    tracing::info!("Configuration loaded successfully");
    tracing::info!("Stream URL: {}", config.twitter.stream_url);
    tracing::info!("Firehose endpoint: {}", config.firehose.endpoint_url());

    let mut credentials = CredentialsChain::from_env()?;
    credentials
        .credentials()
        .await
        .context("Failed to load AWS credentials")?;

    let source = TwitterStreamSource::new(&config.twitter)?;
    let sink = FirehoseSink::new(&config.firehose, credentials)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let mut forwarder = StreamForwarder::new(source, sink, config.core, shutdown)?;

    // Run until shutdown signal
    forwarder.run().await?;

    tracing::info!("Twitter Firehose forwarder stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}

/// Initialize tracing/logging
fn init_tracing(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,twitter_firehose=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
