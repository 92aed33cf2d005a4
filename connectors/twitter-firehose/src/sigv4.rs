//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use stream_forward_core::{ForwarderError, ForwarderResult};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// AWS credentials, possibly temporary
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Set for role credentials; static keys never expire
    pub expires_at: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    /// Whether these credentials expire within `margin` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at.is_some_and(|at| at - margin <= now)
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The parts of an HTTP request covered by the signature
#[derive(Debug)]
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    /// Header names are lowercased when inserted through [`CanonicalRequest::header`]
    pub headers: BTreeMap<String, String>,
    pub payload: &'a [u8],
}

impl<'a> CanonicalRequest<'a> {
    pub fn new(method: &'a str, path: &'a str, payload: &'a [u8]) -> Self {
        Self {
            method,
            path,
            query: "",
            headers: BTreeMap::new(),
            payload,
        }
    }

    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.as_ref().trim().to_string());
        self
    }

    pub fn signed_headers(&self) -> String {
        self.headers.keys().cloned().collect::<Vec<_>>().join(";")
    }

    fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.method);
        let _ = writeln!(out, "{}", self.path);
        let _ = writeln!(out, "{}", self.query);
        for (name, value) in &self.headers {
            let _ = writeln!(out, "{}:{}", name, value);
        }
        out.push('\n');
        let _ = writeln!(out, "{}", self.signed_headers());
        out.push_str(&hex_sha256(self.payload));
        out
    }
}

/// Signs requests for one service in one region
#[derive(Debug, Clone)]
pub struct Signer {
    region: String,
    service: String,
}

impl Signer {
    pub fn new(region: &str, service: &str) -> Self {
        Self {
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Compute the `Authorization` header value.
    ///
    /// The request must already carry every header that will be sent and signed,
    /// including `host`, `x-amz-date` (see [`amz_date`]) and the session token if any.
    pub fn authorization(
        &self,
        credentials: &AwsCredentials,
        request: &CanonicalRequest<'_>,
        time: DateTime<Utc>,
    ) -> ForwarderResult<String> {
        let date = time.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date(time),
            scope,
            hex_sha256(request.to_canonical_string().as_bytes())
        );

        let key = signing_key(
            &credentials.secret_access_key,
            &date,
            &self.region,
            &self.service,
        )?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            credentials.access_key_id,
            scope,
            request.signed_headers(),
            signature
        ))
    }
}

/// `x-amz-date` header value
pub fn amz_date(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Derive the signing key for a date (`YYYYMMDD`), region and service
pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> ForwarderResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> ForwarderResult<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ForwarderError::config(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
