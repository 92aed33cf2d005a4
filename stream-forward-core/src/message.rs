//! Inbound stream messages.
//!
//! Payloads arrive as JSON documents. Only documents with a top-level `text` key are
//! posts; everything else is a control notice that is logged and dropped.

use crate::{ForwarderError, ForwarderResult};
use serde::Deserialize;
use serde_json::Value;

/// A single streamed post, restricted to the fields that get forwarded
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub id: u64,
    #[serde(rename = "user")]
    pub author: Author,
    pub text: String,
    pub entities: Entities,
    /// Nullable, but must be present
    pub geo: Value,
    pub created_at: String,
    pub reply_count: u64,
    pub retweet_count: u64,
    pub favorite_count: u64,
}

/// The posting account
#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    pub screen_name: String,
    pub followers_count: u64,
    pub statuses_count: u64,
    /// Free-form and nullable
    pub location: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entities {
    pub hashtags: Value,
}

/// Non-post payloads the stream may deliver
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    /// Blank keep-alive line
    KeepAlive,
    /// A post was deleted
    Delete { status_id: Option<u64> },
    /// Location data must be scrubbed for a user
    ScrubGeo { user_id: Option<u64> },
    /// More posts matched than the stream is allowed to deliver
    Limit { undelivered: Option<u64> },
    /// The consumer is falling behind and risks being disconnected
    StallWarning {
        code: String,
        message: String,
        percent_full: Option<u64>,
    },
    /// The remote is about to close the stream
    Disconnect { code: Option<u64>, reason: String },
    /// A post or user was withheld in some countries
    Withheld,
    /// Anything else without a `text` key
    Other,
}

impl StreamNotice {
    /// Notices worth surfacing above debug level
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            StreamNotice::StallWarning { .. } | StreamNotice::Disconnect { .. }
        )
    }

    fn from_json(input: &Value) -> StreamNotice {
        if let Some(status) = input.pointer("/delete/status") {
            StreamNotice::Delete {
                status_id: status.get("id").and_then(Value::as_u64),
            }
        } else if let Some(scrub) = input.get("scrub_geo") {
            StreamNotice::ScrubGeo {
                user_id: scrub.get("user_id").and_then(Value::as_u64),
            }
        } else if let Some(limit) = input.get("limit") {
            StreamNotice::Limit {
                undelivered: limit.get("track").and_then(Value::as_u64),
            }
        } else if let Some(warning) = input.get("warning") {
            StreamNotice::StallWarning {
                code: string_field(warning, "code"),
                message: string_field(warning, "message"),
                percent_full: warning.get("percent_full").and_then(Value::as_u64),
            }
        } else if let Some(disconnect) = input.get("disconnect") {
            StreamNotice::Disconnect {
                code: disconnect.get("code").and_then(Value::as_u64),
                reason: string_field(disconnect, "reason"),
            }
        } else if input.get("status_withheld").is_some() || input.get("user_withheld").is_some() {
            StreamNotice::Withheld
        } else {
            StreamNotice::Other
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Result of parsing one raw payload
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Post(Box<InboundMessage>),
    Notice(StreamNotice),
}

impl ParsedMessage {
    /// Parse a raw payload.
    ///
    /// A payload without a `text` key is a notice, never an error. A payload with a
    /// `text` key whose forwarded fields can't be read is an extraction error.
    pub fn parse(raw: &[u8]) -> ForwarderResult<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(ParsedMessage::Notice(StreamNotice::KeepAlive));
        }

        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| ForwarderError::extraction(format!("Payload is not JSON: {}", e), raw))?;

        if value.get("text").is_none() {
            return Ok(ParsedMessage::Notice(StreamNotice::from_json(&value)));
        }

        let message = InboundMessage::deserialize(value)
            .map_err(|e| ForwarderError::extraction(e.to_string(), raw))?;

        Ok(ParsedMessage::Post(Box::new(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = r#"{"text":"Love Netflix shows","id":123,"user":{"name":"A","screen_name":"a1","followers_count":10,"statuses_count":5,"location":"NYC"},"entities":{"hashtags":[]},"geo":null,"created_at":"Mon Jan 01","reply_count":0,"retweet_count":1,"favorite_count":2}"#;

    fn parse_post(raw: &str) -> InboundMessage {
        match ParsedMessage::parse(raw.as_bytes()).unwrap() {
            ParsedMessage::Post(message) => *message,
            other => panic!("expected a post, got {:?}", other),
        }
    }

    fn parse_notice(raw: &str) -> StreamNotice {
        match ParsedMessage::parse(raw.as_bytes()).unwrap() {
            ParsedMessage::Notice(notice) => notice,
            other => panic!("expected a notice, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_post() {
        let message = parse_post(POST);

        assert_eq!(message.id, 123);
        assert_eq!(message.author.name, "A");
        assert_eq!(message.author.screen_name, "a1");
        assert_eq!(message.author.followers_count, 10);
        assert_eq!(message.author.statuses_count, 5);
        assert_eq!(message.author.location, Value::String("NYC".to_string()));
        assert_eq!(message.text, "Love Netflix shows");
        assert_eq!(message.entities.hashtags, serde_json::json!([]));
        assert!(message.geo.is_null());
        assert_eq!(message.created_at, "Mon Jan 01");
        assert_eq!(message.retweet_count, 1);
        assert_eq!(message.favorite_count, 2);
    }

    #[test]
    fn test_delete_notice_is_not_a_post() {
        let notice = parse_notice(r#"{"delete":{"status":{"id":999}}}"#);
        assert_eq!(
            notice,
            StreamNotice::Delete {
                status_id: Some(999)
            }
        );
        assert!(!notice.is_warning());
    }

    #[test]
    fn test_stall_warning_notice() {
        let notice = parse_notice(
            r#"{"warning":{"code":"FALLING_BEHIND","message":"Your connection is falling behind","percent_full":60}}"#,
        );

        assert_eq!(
            notice,
            StreamNotice::StallWarning {
                code: "FALLING_BEHIND".to_string(),
                message: "Your connection is falling behind".to_string(),
                percent_full: Some(60),
            }
        );
        assert!(notice.is_warning());
    }

    #[test]
    fn test_other_notices() {
        assert_eq!(
            parse_notice(r#"{"limit":{"track":1234}}"#),
            StreamNotice::Limit {
                undelivered: Some(1234)
            }
        );
        assert_eq!(
            parse_notice(r#"{"disconnect":{"code":4,"stream_name":"x","reason":"duplicate"}}"#),
            StreamNotice::Disconnect {
                code: Some(4),
                reason: "duplicate".to_string()
            }
        );
        assert_eq!(
            parse_notice(r#"{"scrub_geo":{"user_id":7,"up_to_status_id":8}}"#),
            StreamNotice::ScrubGeo { user_id: Some(7) }
        );
        assert_eq!(
            parse_notice(r#"{"status_withheld":{"id":1}}"#),
            StreamNotice::Withheld
        );
        assert_eq!(parse_notice(r#"{"friends":[1,2]}"#), StreamNotice::Other);
        assert_eq!(parse_notice("  \r\n"), StreamNotice::KeepAlive);
    }

    #[test]
    fn test_missing_nested_field_is_extraction_error() {
        let raw = POST.replace(r#""screen_name":"a1","#, "");
        let err = ParsedMessage::parse(raw.as_bytes()).unwrap_err();

        assert!(matches!(err, ForwarderError::Extraction { .. }));
        assert!(err.is_message_level());
    }

    #[test]
    fn test_null_text_is_extraction_error() {
        let raw = POST.replace(r#""text":"Love Netflix shows""#, r#""text":null"#);
        let err = ParsedMessage::parse(raw.as_bytes()).unwrap_err();

        assert!(matches!(err, ForwarderError::Extraction { .. }));
    }

    #[test]
    fn test_invalid_json_is_extraction_error() {
        let err = ParsedMessage::parse(b"{not json").unwrap_err();

        match err {
            ForwarderError::Extraction { payload, .. } => assert_eq!(payload, b"{not json"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
