//! Kinesis Data Firehose sink
//!
//! Each record becomes one `PutRecord` call against the regional Firehose endpoint,
//! signed with SigV4.

use crate::config::FirehoseConfig;
use crate::credentials::CredentialsChain;
use crate::sigv4::{amz_date, AwsCredentials, CanonicalRequest, Signer};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use stream_forward_core::{ForwarderError, ForwarderResult, RecordSink};
use tracing::debug;

const SERVICE: &str = "firehose";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const PUT_RECORD_TARGET: &str = "Firehose_20150804.PutRecord";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordRequest<'a> {
    delivery_stream_name: &'a str,
    record: RecordData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RecordData {
    /// Base64 of the raw record bytes
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordResponse {
    record_id: String,
}

/// Error body returned by the JSON protocol
#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Sink submitting records to a Firehose delivery stream
pub struct FirehoseSink {
    client: reqwest::Client,
    endpoint: String,
    host: String,
    path: String,
    signer: Signer,
    credentials: CredentialsChain,
}

impl FirehoseSink {
    pub fn new(config: &FirehoseConfig, credentials: CredentialsChain) -> ForwarderResult<Self> {
        let endpoint = config.endpoint_url();
        let (host, path) = split_endpoint(&endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ForwarderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            host,
            path,
            signer: Signer::new(&config.region, SERVICE),
            credentials,
        })
    }

    fn signed_headers(
        &self,
        credentials: &AwsCredentials,
        body: &[u8],
    ) -> ForwarderResult<HeaderMap> {
        let now = Utc::now();
        let mut request = CanonicalRequest::new("POST", &self.path, body)
            .header("content-type", CONTENT_TYPE)
            .header("host", &self.host)
            .header("x-amz-date", amz_date(now))
            .header("x-amz-target", PUT_RECORD_TARGET);

        if let Some(token) = &credentials.session_token {
            request = request.header("x-amz-security-token", token);
        }

        let authorization = self.signer.authorization(credentials, &request, now)?;

        let mut headers = HeaderMap::new();
        for (name, value) in request
            .headers
            .iter()
            .filter(|(name, _)| name.as_str() != "host")
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .chain(std::iter::once(("authorization", authorization.as_str())))
        {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ForwarderError::config(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ForwarderError::config(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

/// Split an endpoint URL into the `host` header value and request path
fn split_endpoint(endpoint: &str) -> ForwarderResult<(String, String)> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .ok_or_else(|| {
            ForwarderError::config(format!("Firehose endpoint must be http(s): {}", endpoint))
        })?;

    let (host, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };

    if host.is_empty() {
        return Err(ForwarderError::config(format!(
            "Firehose endpoint has no host: {}",
            endpoint
        )));
    }

    Ok((host.to_string(), path.to_string()))
}

/// Build the `PutRecord` request body
fn put_record_body(destination: &str, payload: &[u8]) -> ForwarderResult<Vec<u8>> {
    let request = PutRecordRequest {
        delivery_stream_name: destination,
        record: RecordData {
            data: STANDARD.encode(payload),
        },
    };
    Ok(serde_json::to_vec(&request)?)
}

#[async_trait]
impl RecordSink for FirehoseSink {
    async fn submit(&mut self, destination: &str, payload: &[u8]) -> ForwarderResult<()> {
        let body = put_record_body(destination, payload)?;
        let credentials = self
            .credentials
            .credentials()
            .await
            .map_err(|e| ForwarderError::sink(format!("AWS credentials unavailable: {}", e)))?;
        let headers = self.signed_headers(&credentials, &body)?;

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ForwarderError::sink_with_source("PutRecord request failed", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ForwarderError::sink_with_source("Failed to read PutRecord response", e))?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<ServiceError>(&text);
            let message = match parsed {
                Ok(err) if !err.kind.is_empty() => {
                    let kind = err.kind.rsplit('#').next().unwrap_or(&err.kind);
                    format!("{}: {}", kind, err.message)
                }
                _ => text,
            };
            return Err(ForwarderError::sink_rejected(status.as_u16(), message));
        }

        match serde_json::from_str::<PutRecordResponse>(&text) {
            Ok(put) => debug!("PutRecord accepted, record id {}", put.record_id),
            Err(_) => debug!("PutRecord accepted"),
        }

        Ok(())
    }
}
