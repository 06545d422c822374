//! Terminal-record extraction for streamed bodies.
//!
//! The proxy answers `/chat-process` with newline-delimited JSON and may
//! append a status object after otherwise valid content. Other endpoints
//! answer with a single JSON document. [`parse_terminal_record`] handles
//! both shapes and returns the one record that decides success or failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status tag carried by the proxy's `{ data, message, status }` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseStatus {
    Success,
    Unauthorized,
    Fail,
    Other(String),
}

impl ResponseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ResponseStatus::Success => "Success",
            ResponseStatus::Unauthorized => "Unauthorized",
            ResponseStatus::Fail => "Fail",
            ResponseStatus::Other(tag) => tag,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseStatus::Success)
    }
}

impl From<String> for ResponseStatus {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "Success" => ResponseStatus::Success,
            "Unauthorized" => ResponseStatus::Unauthorized,
            "Fail" => ResponseStatus::Fail,
            _ => ResponseStatus::Other(tag),
        }
    }
}

impl From<&str> for ResponseStatus {
    fn from(tag: &str) -> Self {
        ResponseStatus::from(tag.to_string())
    }
}

impl From<ResponseStatus> for String {
    fn from(status: ResponseStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the body the terminal record was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    /// The whole body parsed as one JSON document.
    Document,
    /// The body was line-delimited; the record is the last object line.
    Line,
}

impl RecordOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordOrigin::Document => "document",
            RecordOrigin::Line => "line",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalRecord {
    pub value: Value,
    pub origin: RecordOrigin,
}

impl TerminalRecord {
    /// The envelope status tag, when the record carries a string `status`.
    pub fn status(&self) -> Option<ResponseStatus> {
        self.value
            .get("status")
            .and_then(Value::as_str)
            .map(ResponseStatus::from)
    }

    /// Best human-readable message in the record.
    pub fn message(&self) -> Option<String> {
        extract_message(&self.value)
    }
}

/// Find the authoritative record in a fully received body.
///
/// The whole text is tried as a single JSON document first. When that fails
/// the text is scanned from the last line backwards and the first line that
/// parses as a JSON object wins; blank and malformed lines are skipped.
pub fn parse_terminal_record(text: &str) -> Option<TerminalRecord> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(TerminalRecord {
            value,
            origin: RecordOrigin::Document,
        });
    }

    last_object_line(text).map(|object| TerminalRecord {
        value: Value::Object(object),
        origin: RecordOrigin::Line,
    })
}

/// Scan `text` from the end for the last line holding a JSON object.
pub fn last_object_line(text: &str) -> Option<Map<String, Value>> {
    text.lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| serde_json::from_str::<Map<String, Value>>(line).ok())
}

fn extract_message(value: &Value) -> Option<String> {
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
        .or_else(|| value.get("error").and_then(Value::as_str))?;

    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_last_line_of_ndjson_stream() {
        let body = "{\"delta\":\"Hel\"}\n{\"delta\":\"lo\"}\n{\"status\":\"Success\",\"data\":{\"text\":\"Hello\"}}\n";

        let record = parse_terminal_record(body).expect("record");

        assert_eq!(record.origin, RecordOrigin::Line);
        assert_eq!(
            record.value,
            json!({"status": "Success", "data": {"text": "Hello"}})
        );
        assert_eq!(record.status(), Some(ResponseStatus::Success));
    }

    #[test]
    fn whole_document_parses_without_line_scan() {
        let body = "{\n  \"status\": \"Success\",\n  \"message\": \"\",\n  \"data\": {\"auth\": true}\n}";

        let record = parse_terminal_record(body).expect("record");

        assert_eq!(record.origin, RecordOrigin::Document);
        assert_eq!(record.value["data"]["auth"], json!(true));
    }

    #[test]
    fn skips_blank_and_malformed_trailing_lines() {
        let body = "{\"text\":\"a\"}\n{\"text\":\"ab\"}\n\n   \n{\"text\":\"ab";

        let record = parse_terminal_record(body).expect("record");

        assert_eq!(record.value, json!({"text": "ab"}));
    }

    #[test]
    fn ignores_lines_that_are_json_but_not_objects() {
        let body = "{\"text\":\"done\"}\n42\n\"tail\"\n";

        let record = parse_terminal_record(body).expect("record");

        assert_eq!(record.value, json!({"text": "done"}));
    }

    #[test]
    fn trailing_status_object_after_content_is_terminal() {
        let body = "{\"id\":\"1\",\"text\":\"partial\"}\n{\"message\":\"rate   limited\",\"data\":null,\"status\":\"Fail\"}";

        let record = parse_terminal_record(body).expect("record");

        assert_eq!(record.status(), Some(ResponseStatus::Fail));
        assert_eq!(record.message().as_deref(), Some("rate limited"));
    }

    #[test]
    fn empty_or_plain_text_has_no_record() {
        assert!(parse_terminal_record("").is_none());
        assert!(parse_terminal_record(" \n\n").is_none());
        assert!(parse_terminal_record("Bad Gateway").is_none());
    }

    #[test]
    fn message_falls_back_to_nested_error() {
        let record = TerminalRecord {
            value: json!({"error": {"message": "model overloaded"}}),
            origin: RecordOrigin::Document,
        };
        assert_eq!(record.message().as_deref(), Some("model overloaded"));

        let record = TerminalRecord {
            value: json!({"error": "bad key"}),
            origin: RecordOrigin::Document,
        };
        assert_eq!(record.message().as_deref(), Some("bad key"));
    }

    #[test]
    fn status_tags_round_trip_through_strings() {
        assert_eq!(ResponseStatus::from("Unauthorized"), ResponseStatus::Unauthorized);
        assert_eq!(
            ResponseStatus::from("Quota"),
            ResponseStatus::Other("Quota".to_string())
        );
        assert_eq!(String::from(ResponseStatus::Fail), "Fail");
    }
}
