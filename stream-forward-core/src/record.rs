//! Outbound record format.
//!
//! One line per post: thirteen data fields joined by a tab, followed by a trailing
//! field holding a single line feed. Numbers are decimal text, `null` is `None`, and
//! nested sequences or objects use literal-container notation (`[...]`, `{'k': v}`).

use crate::message::InboundMessage;
use serde_json::Value;
use std::fmt::Write;

/// Separator between record fields
pub const FIELD_SEPARATOR: char = '\t';

/// Content of the final record field
pub const RECORD_TERMINATOR: &str = "\n";

/// Fields per record, including the terminator field
pub const FIELD_COUNT: usize = 14;

/// Rendering of an absent value
pub const ABSENT_MARKER: &str = "None";

/// A formatted line ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    line: String,
}

impl OutboundRecord {
    /// Build the record for a post
    pub fn from_message(message: &InboundMessage) -> Self {
        let fields = [
            message.id.to_string(),
            message.author.name.clone(),
            message.author.screen_name.clone(),
            message.author.followers_count.to_string(),
            message.author.statuses_count.to_string(),
            render_value(&message.author.location),
            normalize_text(&message.text),
            render_value(&message.entities.hashtags),
            render_value(&message.geo),
            message.created_at.clone(),
            message.reply_count.to_string(),
            message.retweet_count.to_string(),
            message.favorite_count.to_string(),
            RECORD_TERMINATOR.to_string(),
        ];

        let mut line = String::new();
        for (idx, field) in fields.iter().enumerate() {
            if idx > 0 {
                line.push(FIELD_SEPARATOR);
            }
            line.push_str(field);
        }

        Self { line }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    /// Split the line back into its fields
    pub fn fields(&self) -> Vec<&str> {
        self.line.split(FIELD_SEPARATOR).collect()
    }

    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

/// Replace line feeds and carriage returns with single spaces
pub fn normalize_text(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

/// Render a JSON value as a record field.
///
/// Top-level strings are written verbatim; everything else goes through the
/// literal notation used for nested values.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_literal(&mut out, other);
            out
        }
    }
}

fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str(ABSENT_MARKER),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_quoted(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_literal(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(": ");
                write_literal(out, item);
            }
            out.push('}');
        }
    }
}

fn write_quoted(out: &mut String, s: &str) {
    // single quotes unless that would need escaping and double quotes wouldn't
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ParsedMessage;
    use serde_json::json;

    fn record_for(raw: &str) -> OutboundRecord {
        match ParsedMessage::parse(raw.as_bytes()).unwrap() {
            ParsedMessage::Post(message) => OutboundRecord::from_message(&message),
            other => panic!("expected a post, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_record() {
        let record = record_for(
            r#"{"text":"Love Netflix shows","id":123,"user":{"name":"A","screen_name":"a1","followers_count":10,"statuses_count":5,"location":"NYC"},"entities":{"hashtags":[]},"geo":null,"created_at":"Mon Jan 01","reply_count":0,"retweet_count":1,"favorite_count":2}"#,
        );

        assert_eq!(
            record.as_str(),
            "123\tA\ta1\t10\t5\tNYC\tLove Netflix shows\t[]\tNone\tMon Jan 01\t0\t1\t2\t\n"
        );
        assert_eq!(record.fields().len(), FIELD_COUNT);
    }

    #[test]
    fn test_field_order_and_nested_values() {
        let record = record_for(
            r#"{"id":42,"text":"line one\nline two\r\nend","user":{"name":"Jane Doe","screen_name":"jdoe","followers_count":1200,"statuses_count":88,"location":null},"entities":{"hashtags":[{"text":"Netflix","indices":[0,8]}]},"geo":{"type":"Point","coordinates":[40.7,-74.0]},"created_at":"Tue Feb 02 10:00:00 +0000 2021","reply_count":3,"retweet_count":4,"favorite_count":5}"#,
        );

        let fields = record.fields();
        assert_eq!(fields.len(), FIELD_COUNT);
        assert_eq!(fields[0], "42");
        assert_eq!(fields[1], "Jane Doe");
        assert_eq!(fields[2], "jdoe");
        assert_eq!(fields[3], "1200");
        assert_eq!(fields[4], "88");
        assert_eq!(fields[5], "None");
        assert_eq!(fields[6], "line one line two  end");
        assert_eq!(fields[7], "[{'text': 'Netflix', 'indices': [0, 8]}]");
        assert_eq!(fields[8], "{'type': 'Point', 'coordinates': [40.7, -74.0]}");
        assert_eq!(fields[9], "Tue Feb 02 10:00:00 +0000 2021");
        assert_eq!(fields[10], "3");
        assert_eq!(fields[11], "4");
        assert_eq!(fields[12], "5");
        assert_eq!(fields[13], RECORD_TERMINATOR);
    }

    #[test]
    fn test_text_field_has_no_raw_line_breaks() {
        for text in ["a\nb", "a\rb", "\r\n\r\n", "no breaks", "trailing\n"] {
            let normalized = normalize_text(text);
            assert!(!normalized.contains('\n'));
            assert!(!normalized.contains('\r'));
            assert_eq!(normalized.chars().count(), text.chars().count());
        }
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render_value(&Value::Null), "None");
        assert_eq!(render_value(&json!(true)), "True");
        assert_eq!(render_value(&json!(false)), "False");
        assert_eq!(render_value(&json!(17)), "17");
        assert_eq!(render_value(&json!("Toronto, ON")), "Toronto, ON");
    }

    #[test]
    fn test_render_nested_strings_quoting() {
        assert_eq!(render_value(&json!(["it's"])), r#"["it's"]"#);
        assert_eq!(render_value(&json!(["say \"hi\""])), r#"['say "hi"']"#);
        assert_eq!(render_value(&json!(["both ' and \""])), r#"['both \' and "']"#);
        assert_eq!(render_value(&json!(["a\\b\nc"])), r"['a\\b\nc']");
        assert_eq!(render_value(&json!({"k": null})), "{'k': None}");
    }

    #[test]
    fn test_render_nested_control_characters() {
        assert_eq!(
            render_value(&json!(["nul\u{0000}esc\u{001b}del\u{007f}"])),
            r"['nul\x00esc\x1bdel\x7f']"
        );
        assert_eq!(
            render_value(&json!({"tag": "c1\u{0085}end"})),
            r"{'tag': 'c1\x85end'}"
        );
        assert_eq!(render_value(&json!(["café ☕"])), "['café ☕']");
    }
}
