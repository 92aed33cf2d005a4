//! Configuration for the Twitter → Firehose forwarder

use crate::oauth::{KeyPair, Token};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use stream_forward_core::{ForwarderConfig, ForwarderError, ForwarderResult};

/// Default filtered-stream endpoint
pub const DEFAULT_STREAM_URL: &str = "https://stream.twitter.com/1.1/statuses/filter.json";

/// Unified configuration for the forwarder binary
///
/// Combines the core forwarder settings with the stream and Firehose settings
/// in a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterFirehoseConfig {
    /// Core forwarder configuration (flattened at root level)
    #[serde(flatten)]
    pub core: ForwarderConfig,

    /// Streaming API settings
    pub twitter: TwitterConfig,

    /// Delivery stream settings
    #[serde(default)]
    pub firehose: FirehoseConfig,
}

impl TwitterFirehoseConfig {
    /// Load configuration from a single TOML file with optional ENV overrides
    ///
    /// Priority: TOML file (`CONFIG_FILE`) or environment → environment overrides
    ///
    /// # Example
    ///
    /// ```toml
    /// keywords = ["Netflix", "netflix"]
    /// languages = ["en"]
    /// destination = "twitterProjectNetflix"
    ///
    /// [twitter]
    /// consumer_key = "..."
    /// consumer_secret = "..."
    /// access_token = "..."
    /// access_token_secret = "..."
    ///
    /// [firehose]
    /// region = "ca-central-1"
    /// ```
    pub fn load() -> ForwarderResult<Self> {
        let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_file(&config_file)?
        } else {
            Self::from_env()?
        };

        config.core.apply_env_overrides();
        config.twitter.apply_env_overrides();
        config.firehose.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ForwarderResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForwarderError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        Self::from_toml(&content)
            .map_err(|e| ForwarderError::config(format!("Failed to parse config file {}: {}", path, e)))
    }

    fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> ForwarderResult<Self> {
        Ok(Self {
            core: ForwarderConfig::from_env()?,
            twitter: TwitterConfig::from_env()?,
            firehose: FirehoseConfig::from_env(),
        })
    }

    /// Validate all configuration
    pub fn validate(&self) -> ForwarderResult<()> {
        self.core.validate()?;
        self.twitter.validate()?;
        self.firehose.validate()?;
        Ok(())
    }
}

/// Streaming API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,

    /// Filtered-stream endpoint
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// TCP/TLS connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Drop the connection when nothing (not even a keep-alive) arrives for this long
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_stall_timeout() -> u64 {
    90
}

fn required_env(name: &str) -> ForwarderResult<String> {
    env::var(name).map_err(|_| ForwarderError::config(format!("{} is required", name)))
}

impl TwitterConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TWITTER_CONSUMER_KEY`: Required
    /// - `TWITTER_CONSUMER_SECRET`: Required
    /// - `TWITTER_ACCESS_TOKEN`: Required
    /// - `TWITTER_ACCESS_TOKEN_SECRET`: Required
    /// - `TWITTER_STREAM_URL`: Optional, endpoint override
    /// - `TWITTER_CONNECT_TIMEOUT_SECS`: Optional (default: 30)
    /// - `TWITTER_STALL_TIMEOUT_SECS`: Optional (default: 90)
    pub fn from_env() -> ForwarderResult<Self> {
        let mut config = Self {
            consumer_key: required_env("TWITTER_CONSUMER_KEY")?,
            consumer_secret: required_env("TWITTER_CONSUMER_SECRET")?,
            access_token: required_env("TWITTER_ACCESS_TOKEN")?,
            access_token_secret: required_env("TWITTER_ACCESS_TOKEN_SECRET")?,
            stream_url: default_stream_url(),
            connect_timeout_secs: default_connect_timeout(),
            stall_timeout_secs: default_stall_timeout(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TWITTER_CONSUMER_KEY") {
            self.consumer_key = val;
        }
        if let Ok(val) = env::var("TWITTER_CONSUMER_SECRET") {
            self.consumer_secret = val;
        }
        if let Ok(val) = env::var("TWITTER_ACCESS_TOKEN") {
            self.access_token = val;
        }
        if let Ok(val) = env::var("TWITTER_ACCESS_TOKEN_SECRET") {
            self.access_token_secret = val;
        }
        if let Ok(val) = env::var("TWITTER_STREAM_URL") {
            self.stream_url = val;
        }
        if let Ok(val) = env::var("TWITTER_CONNECT_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.connect_timeout_secs = n;
            }
        }
        if let Ok(val) = env::var("TWITTER_STALL_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.stall_timeout_secs = n;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ForwarderResult<()> {
        let credentials = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("access_token", &self.access_token),
            ("access_token_secret", &self.access_token_secret),
        ];
        for (name, value) in credentials {
            if value.is_empty() {
                return Err(ForwarderError::config(format!("{} cannot be empty", name)));
            }
        }

        if !self.stream_url.starts_with("http://") && !self.stream_url.starts_with("https://") {
            return Err(ForwarderError::config(format!(
                "stream_url must be an http(s) URL, got {}",
                self.stream_url
            )));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ForwarderError::config("connect_timeout_secs must be > 0"));
        }

        if self.stall_timeout_secs == 0 {
            return Err(ForwarderError::config("stall_timeout_secs must be > 0"));
        }

        Ok(())
    }

    pub fn token(&self) -> Token {
        Token {
            consumer: KeyPair::new(&self.consumer_key, &self.consumer_secret),
            access: KeyPair::new(&self.access_token, &self.access_token_secret),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

impl std::fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("consumer_key", &self.consumer_key)
            .field("access_token", &self.access_token)
            .field("stream_url", &self.stream_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("stall_timeout_secs", &self.stall_timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Kinesis Data Firehose configuration
///
/// Credentials are not part of the file; they come from the standard AWS
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseConfig {
    /// AWS region hosting the delivery stream
    #[serde(default = "default_region")]
    pub region: String,

    /// Endpoint override (defaults to the regional Firehose endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "ca-central-1".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl FirehoseConfig {
    /// Load configuration from environment variables
    ///
    /// - `FIREHOSE_REGION`: Optional (default: ca-central-1)
    /// - `FIREHOSE_ENDPOINT`: Optional endpoint override
    /// - `FIREHOSE_TIMEOUT_SECS`: Optional (default: 10)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("FIREHOSE_REGION") {
            self.region = val;
        }
        if let Ok(val) = env::var("FIREHOSE_ENDPOINT") {
            self.endpoint = Some(val);
        }
        if let Ok(val) = env::var("FIREHOSE_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.timeout_secs = n;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ForwarderResult<()> {
        if self.region.is_empty() {
            return Err(ForwarderError::config("firehose region cannot be empty"));
        }

        if self.timeout_secs == 0 {
            return Err(ForwarderError::config("firehose timeout_secs must be > 0"));
        }

        Ok(())
    }

    /// The endpoint PutRecord calls are sent to
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://firehose.{}.amazonaws.com/", self.region))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
