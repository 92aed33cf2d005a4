//! OAuth 1.0a request signing for the streaming endpoint.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distr::Alphanumeric, Rng};
use sha1::Sha1;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use stream_forward_core::{ForwarderError, ForwarderResult};

/// Everything except the RFC 3986 unreserved characters
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn percent_encode(src: &str) -> String {
    utf8_percent_encode(src, OAUTH_ENCODE_SET).to_string()
}

/// Encode parameters as an `application/x-www-form-urlencoded` body
pub fn form_encode(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// A key and its matching secret
#[derive(Clone)]
pub struct KeyPair {
    pub key: String,
    pub secret: String,
}

impl KeyPair {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        KeyPair {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

// secrets stay out of logs
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Consumer and access keys for user-context requests
#[derive(Debug, Clone)]
pub struct Token {
    pub consumer: KeyPair,
    pub access: KeyPair,
}

/// Per-request OAuth values
#[derive(Debug, Clone)]
pub struct OAuthParams {
    nonce: String,
    timestamp: u64,
}

impl OAuthParams {
    /// Fresh nonce and current timestamp
    pub fn new() -> Self {
        let timestamp = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(dur) => dur,
            Err(err) => err.duration(),
        }
        .as_secs();

        let nonce = rand::rng()
            .sample_iter(Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        OAuthParams { nonce, timestamp }
    }

    pub fn with_values(nonce: impl Into<String>, timestamp: u64) -> Self {
        OAuthParams {
            nonce: nonce.into(),
            timestamp,
        }
    }

    fn protocol_params(&self, token: &Token) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("oauth_consumer_key", token.consumer.key.clone());
        params.insert("oauth_nonce", self.nonce.clone());
        params.insert("oauth_signature_method", "HMAC-SHA1".to_string());
        params.insert("oauth_timestamp", self.timestamp.to_string());
        params.insert("oauth_token", token.access.key.clone());
        params.insert("oauth_version", "1.0".to_string());
        params
    }

    /// The signature base string for a request carrying `params` in its query or form body
    pub fn base_string(
        &self,
        token: &Token,
        method: &str,
        uri: &str,
        params: &[(String, String)],
    ) -> String {
        let mut pairs: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .chain(
                self.protocol_params(token)
                    .into_iter()
                    .map(|(k, v)| (percent_encode(k), percent_encode(&v))),
            )
            .collect();
        pairs.sort();

        let param_string = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}&{}&{}",
            percent_encode(&method.to_ascii_uppercase()),
            percent_encode(uri),
            percent_encode(&param_string)
        )
    }

    /// Sign a request, producing the `Authorization` header
    pub fn sign(
        &self,
        token: &Token,
        method: &str,
        uri: &str,
        params: &[(String, String)],
    ) -> ForwarderResult<SignedHeader> {
        let base_str = self.base_string(token, method, uri, params);
        let key = format!(
            "{}&{}",
            percent_encode(&token.consumer.secret),
            percent_encode(&token.access.secret)
        );

        let mut digest = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .map_err(|e| ForwarderError::config(format!("Invalid OAuth signing key: {}", e)))?;
        digest.update(base_str.as_bytes());
        let signature = STANDARD.encode(digest.finalize().into_bytes());

        let mut params = self.protocol_params(token);
        params.insert("oauth_signature", signature);

        Ok(SignedHeader { params })
    }
}

impl Default for OAuthParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed OAuth parameters, formatted as an `Authorization` header value by `Display`
#[derive(Debug, Clone)]
pub struct SignedHeader {
    params: BTreeMap<&'static str, String>,
}

impl SignedHeader {
    pub fn signature(&self) -> &str {
        self.params
            .get("oauth_signature")
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl fmt::Display for SignedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OAuth ")?;

        let mut first = true;
        for (k, v) in &self.params {
            if first {
                first = false;
            } else {
                write!(f, ", ")?;
            }

            write!(f, "{}=\"{}\"", k, percent_encode(v))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference values from Twitter's "Creating a signature" guide
    fn reference_token() -> Token {
        Token {
            consumer: KeyPair::new(
                "xvz1evFS4wEEPTGEFPHBog",
                "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            ),
            access: KeyPair::new(
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
                "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
            ),
        }
    }

    fn reference_params() -> Vec<(String, String)> {
        vec![
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
            ("include_entities".to_string(), "true".to_string()),
        ]
    }

    const REFERENCE_URI: &str = "https://api.twitter.com/1.1/statuses/update.json";

    fn reference_oauth() -> OAuthParams {
        OAuthParams::with_values("kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg", 1318622958)
    }

    #[test]
    fn test_reference_base_string() {
        let base = reference_oauth().base_string(
            &reference_token(),
            "post",
            REFERENCE_URI,
            &reference_params(),
        );

        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_reference_signature() {
        let header = reference_oauth()
            .sign(&reference_token(), "POST", REFERENCE_URI, &reference_params())
            .unwrap();

        assert_eq!(header.signature(), "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");

        let value = header.to_string();
        assert!(value.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(value.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
    }

    #[test]
    fn test_nonce_is_alphanumeric() {
        let params = OAuthParams::new();
        assert_eq!(params.nonce.len(), 32);
        assert!(params.nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_form_encode() {
        let params = vec![
            ("track".to_string(), "Netflix,netflix".to_string()),
            ("language".to_string(), "en".to_string()),
        ];
        assert_eq!(form_encode(&params), "track=Netflix%2Cnetflix&language=en");
    }

    #[test]
    fn test_key_pair_debug_hides_secret() {
        let pair = KeyPair::new("public", "very-secret");
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("public"));
        assert!(!rendered.contains("very-secret"));
    }
}
