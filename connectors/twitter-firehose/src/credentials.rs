//! AWS credential resolution.
//!
//! Sources are tried in order until one yields credentials:
//! 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (+ `AWS_SESSION_TOKEN`)
//! 2. the shared credentials file (`AWS_SHARED_CREDENTIALS_FILE` or `~/.aws/credentials`),
//!    profile `AWS_PROFILE` or `default`
//! 3. the container credentials endpoint (ECS / EKS pod identity)
//! 4. EC2 instance metadata (IMDSv2)
//!
//! Role credentials are cached and refreshed shortly before they expire.

use crate::sigv4::AwsCredentials;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use stream_forward_core::{ForwarderError, ForwarderResult};
use tracing::{debug, warn};

const CONTAINER_ENDPOINT: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_TTL_SECS: &str = "21600";
const IMDS_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";

/// Refresh role credentials this long before they expire
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// One place credentials can come from
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Keys known up front, usually from the environment
    Static(AwsCredentials),
    /// A profile in a shared credentials file
    Profile { path: PathBuf, profile: String },
    /// Container credentials endpoint
    Container {
        url: String,
        auth_token: Option<String>,
    },
    /// EC2 instance metadata service
    InstanceMetadata { endpoint: String },
}

impl CredentialSource {
    fn name(&self) -> &'static str {
        match self {
            Self::Static(_) => "environment",
            Self::Profile { .. } => "shared credentials file",
            Self::Container { .. } => "container endpoint",
            Self::InstanceMetadata { .. } => "instance metadata",
        }
    }
}

/// Credentials document served by the container and instance metadata endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<String>,
}

impl RoleCredentials {
    fn into_credentials(self) -> ForwarderResult<AwsCredentials> {
        let expires_at = self
            .expiration
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|e| {
                        ForwarderError::config(format!("Invalid credential expiration {}: {}", raw, e))
                    })
            })
            .transpose()?;

        Ok(AwsCredentials {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.token,
            expires_at,
        })
    }
}

/// Ordered credential sources with a cache in front
pub struct CredentialsChain {
    sources: Vec<CredentialSource>,
    client: reqwest::Client,
    cached: Option<AwsCredentials>,
}

impl CredentialsChain {
    pub fn new(sources: Vec<CredentialSource>) -> ForwarderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| ForwarderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            sources,
            client,
            cached: None,
        })
    }

    /// The default chain, configured from the standard AWS environment variables
    pub fn from_env() -> ForwarderResult<Self> {
        let mut sources = Vec::new();

        let key = env::var("AWS_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty());
        let secret = env::var("AWS_SECRET_ACCESS_KEY").ok().filter(|v| !v.is_empty());
        if let (Some(key), Some(secret)) = (key, secret) {
            let mut credentials = AwsCredentials::new(key, secret);
            credentials.session_token = env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty());
            sources.push(CredentialSource::Static(credentials));
        }

        let path = env::var("AWS_SHARED_CREDENTIALS_FILE")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".aws").join("credentials")));
        if let Some(path) = path {
            let profile = env::var("AWS_PROFILE").unwrap_or_else(|_| "default".to_string());
            sources.push(CredentialSource::Profile { path, profile });
        }

        let container_url = env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
            .map(|uri| format!("{}{}", CONTAINER_ENDPOINT, uri))
            .or_else(|_| env::var("AWS_CONTAINER_CREDENTIALS_FULL_URI"))
            .ok();
        if let Some(url) = container_url {
            sources.push(CredentialSource::Container {
                url,
                auth_token: env::var("AWS_CONTAINER_AUTHORIZATION_TOKEN").ok(),
            });
        }

        let imds_disabled = env::var("AWS_EC2_METADATA_DISABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !imds_disabled {
            let endpoint = env::var("AWS_EC2_METADATA_SERVICE_ENDPOINT")
                .unwrap_or_else(|_| IMDS_ENDPOINT.to_string());
            sources.push(CredentialSource::InstanceMetadata { endpoint });
        }

        Self::new(sources)
    }

    /// Current credentials, resolving them again when missing or about to expire
    pub async fn credentials(&mut self) -> ForwarderResult<AwsCredentials> {
        let margin = chrono::Duration::minutes(REFRESH_MARGIN_MINUTES);

        if let Some(cached) = &self.cached {
            if !cached.expires_within(Utc::now(), margin) {
                return Ok(cached.clone());
            }
        }

        let credentials = self.resolve().await?;
        self.cached = Some(credentials.clone());
        Ok(credentials)
    }

    async fn resolve(&self) -> ForwarderResult<AwsCredentials> {
        for source in &self.sources {
            match self.load(source).await {
                Ok(Some(credentials)) => {
                    debug!("Using AWS credentials from {}", source.name());
                    return Ok(credentials);
                }
                Ok(None) => debug!("No AWS credentials in {}", source.name()),
                Err(e) => warn!("Skipping {} credentials: {}", source.name(), e),
            }
        }

        Err(ForwarderError::config(
            "No AWS credentials found in the environment, shared credentials file, \
             container endpoint or instance metadata",
        ))
    }

    async fn load(&self, source: &CredentialSource) -> ForwarderResult<Option<AwsCredentials>> {
        match source {
            CredentialSource::Static(credentials) => Ok(Some(credentials.clone())),
            CredentialSource::Profile { path, profile } => {
                let content = match std::fs::read_to_string(path) {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => {
                        return Err(ForwarderError::config(format!(
                            "Failed to read {}: {}",
                            path.display(),
                            e
                        )))
                    }
                };
                parse_profile(&content, profile)
            }
            CredentialSource::Container { url, auth_token } => {
                let mut request = self.client.get(url);
                if let Some(token) = auth_token {
                    request = request.header(reqwest::header::AUTHORIZATION, token);
                }
                let body = send_for_text(request).await?;
                let role: RoleCredentials = serde_json::from_str(&body)?;
                role.into_credentials().map(Some)
            }
            CredentialSource::InstanceMetadata { endpoint } => {
                self.load_instance_metadata(endpoint.trim_end_matches('/')).await
            }
        }
    }

    async fn load_instance_metadata(&self, endpoint: &str) -> ForwarderResult<Option<AwsCredentials>> {
        let token_request = self
            .client
            .put(format!("{}/latest/api/token", endpoint))
            .header("x-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECS);

        // unreachable metadata service: not running on EC2
        let token = match token_request.send().await {
            Ok(response) => text_if_success(response).await?,
            Err(e) if e.is_connect() || e.is_timeout() => return Ok(None),
            Err(e) => return Err(metadata_error(e)),
        };

        let roles_url = format!("{}{}", endpoint, IMDS_CREDENTIALS_PATH);
        let roles = self
            .client
            .get(&roles_url)
            .header("x-aws-ec2-metadata-token", &token)
            .send()
            .await
            .map_err(metadata_error)?;

        // no instance profile attached
        if roles.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let roles = text_if_success(roles).await?;
        let Some(role) = roles.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };

        let body = send_for_text(
            self.client
                .get(format!("{}{}", roles_url, role))
                .header("x-aws-ec2-metadata-token", &token),
        )
        .await?;
        let role: RoleCredentials = serde_json::from_str(&body)?;
        role.into_credentials().map(Some)
    }
}

async fn send_for_text(request: reqwest::RequestBuilder) -> ForwarderResult<String> {
    let response = request.send().await.map_err(metadata_error)?;
    text_if_success(response).await
}

async fn text_if_success(response: reqwest::Response) -> ForwarderResult<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(ForwarderError::config(format!(
            "Credentials endpoint answered {}",
            status
        )));
    }
    response.text().await.map_err(metadata_error)
}

fn metadata_error(e: reqwest::Error) -> ForwarderError {
    ForwarderError::config(format!("Credentials request failed: {}", e))
}

/// Read one profile out of a shared credentials file
fn parse_profile(content: &str, profile: &str) -> ForwarderResult<Option<AwsCredentials>> {
    let mut in_profile = false;
    let mut found = false;
    let mut values: HashMap<String, String> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = name.trim() == profile;
            found |= in_profile;
            continue;
        }

        if in_profile {
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
    }

    if !found {
        return Ok(None);
    }

    let mut take = |key: &str| {
        values
            .remove(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ForwarderError::config(format!("Profile {} has no {}", profile, key)))
    };

    let mut credentials = AwsCredentials::new(
        take("aws_access_key_id")?,
        take("aws_secret_access_key")?,
    );
    credentials.session_token = take("aws_session_token").ok();
    Ok(Some(credentials))
}
