//! Configuration management for the forwarder.

use crate::{ForwarderError, ForwarderResult, StreamFilter};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Core forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Keywords tracked by the stream filter
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Language restriction for the stream filter
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Request stall warnings from the source
    #[serde(default = "default_true")]
    pub stall_warnings: bool,

    /// Sink destination every record is submitted to
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Fixed delay before reopening the subscription after an error
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Print each record to stdout before submitting it
    #[serde(default = "default_true")]
    pub echo_records: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_keywords() -> Vec<String> {
    vec!["Netflix".to_string(), "netflix".to_string()]
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_destination() -> String {
    "twitterProjectNetflix".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Split a comma-separated list, dropping blank entries
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ForwarderConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables (all optional, defaults in parentheses):
    /// - `FORWARD_KEYWORDS`: comma-separated keywords (Netflix,netflix)
    /// - `FORWARD_LANGUAGES`: comma-separated language codes (en)
    /// - `FORWARD_STALL_WARNINGS`: request stall warnings (true)
    /// - `FORWARD_DESTINATION`: sink destination name (twitterProjectNetflix)
    /// - `RECONNECT_DELAY_MS`: delay before reconnecting (5000)
    /// - `ECHO_RECORDS`: print records to stdout (true)
    /// - `LOG_LEVEL`: log level (info)
    pub fn from_env() -> ForwarderResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ForwarderResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForwarderError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ForwarderError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides on top of file or default values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("FORWARD_KEYWORDS") {
            self.keywords = parse_list(&val);
        }
        if let Ok(val) = env::var("FORWARD_LANGUAGES") {
            self.languages = parse_list(&val);
        }
        if let Ok(val) = env::var("FORWARD_STALL_WARNINGS") {
            if let Ok(b) = val.parse() {
                self.stall_warnings = b;
            }
        }
        if let Ok(val) = env::var("FORWARD_DESTINATION") {
            self.destination = val;
        }
        if let Ok(val) = env::var("RECONNECT_DELAY_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect_delay_ms = n;
            }
        }
        if let Ok(val) = env::var("ECHO_RECORDS") {
            if let Ok(b) = val.parse() {
                self.echo_records = b;
            }
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ForwarderResult<()> {
        if self.keywords.is_empty() {
            return Err(ForwarderError::config("at least one keyword is required"));
        }

        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ForwarderError::config("keywords cannot be blank"));
        }

        if self.destination.is_empty() {
            return Err(ForwarderError::config("destination cannot be empty"));
        }

        if self.reconnect_delay_ms == 0 {
            return Err(ForwarderError::config("reconnect_delay_ms must be > 0"));
        }

        Ok(())
    }

    /// The filter sent to the source on every connect
    pub fn filter(&self) -> StreamFilter {
        StreamFilter {
            keywords: self.keywords.clone(),
            languages: self.languages.clone(),
            stall_warnings: self.stall_warnings,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            languages: default_languages(),
            stall_warnings: true,
            destination: default_destination(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            echo_records: true,
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_config_default() {
        let config = ForwarderConfig::default();
        assert_eq!(config.keywords, vec!["Netflix", "netflix"]);
        assert_eq!(config.languages, vec!["en"]);
        assert!(config.stall_warnings);
        assert_eq!(config.destination, "twitterProjectNetflix");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ForwarderConfig::default();
        assert_ok!(config.validate());

        config.keywords = vec![];
        assert_err!(config.validate());

        config.keywords = vec!["rust".to_string(), "  ".to_string()];
        assert_err!(config.validate());

        config.keywords = vec!["rust".to_string()];
        config.destination = String::new();
        assert_err!(config.validate());

        config.destination = "stream".to_string();
        config.reconnect_delay_ms = 0;
        assert_err!(config.validate());
    }

    #[test]
    fn test_filter_from_config() {
        let config = ForwarderConfig::default();
        let filter = config.filter();

        assert_eq!(filter.keywords, config.keywords);
        assert_eq!(filter.languages, config.languages);
        assert!(filter.stall_warnings);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("rust, tokio ,,serde"), vec!["rust", "tokio", "serde"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_config_from_file_uses_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
keywords = ["rustlang"]
destination = "rust-posts"
reconnect_delay_ms = 250
"#
        )
        .unwrap();

        let config = ForwarderConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.keywords, vec!["rustlang"]);
        assert_eq!(config.destination, "rust-posts");
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.languages, vec!["en"]);
        assert!(config.echo_records);
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = ForwarderConfig::from_file("/nonexistent/forwarder.toml").unwrap_err();
        assert!(matches!(err, ForwarderError::Config(_)));
    }
}
