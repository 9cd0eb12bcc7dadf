//! Structured reply parsing with a guaranteed fallback.
//!
//! Model output is not trusted. Every reply is decoded into an
//! [`IntakeResult`]; anything that fails to decode or validate becomes the
//! fallback result instead of an error, so a turn can always make progress.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Completion status reported by the model for the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "alert")]
    Alert,
    #[serde(rename = "stop")]
    Stop,
}

impl std::fmt::Display for IntakeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Alert => "alert",
            Self::Stop => "stop",
        };
        write!(f, "{s}")
    }
}

/// The structured outcome of one model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeResult {
    #[serde(alias = "response")]
    pub reply_text: String,
    pub status: IntakeStatus,
    #[serde(alias = "medical_history")]
    pub structured_record: serde_json::Map<String, serde_json::Value>,
}

impl IntakeResult {
    /// The result used when a reply cannot be validated: the raw text is
    /// kept verbatim and the stage stays in progress.
    pub fn fallback(raw: &str) -> Self {
        let record = serde_json::json!({
            "demographics": {
                "age": "",
                "gender": ""
            }
        });
        Self {
            reply_text: raw.to_string(),
            status: IntakeStatus::InProgress,
            structured_record: match record {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }
}

/// A parsed reply and whether it passed validation.
#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub result: IntakeResult,
    pub validated: bool,
}

/// Why a reply failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ReplyParseError {
    #[error("reply does not match the intake result shape: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("reply is valid JSON but not an object")]
    NotAnObject,
}

/// Remove a leading and trailing markdown fence line, whatever the
/// language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = match body.find('\n') {
            Some(newline) => &body[newline + 1..],
            None => "",
        };
    }
    if let Some(last_newline) = body.trim_end().rfind('\n') {
        if body[last_newline + 1..].trim_start().starts_with("```") {
            body = &body[..last_newline];
        }
    } else if body.trim_start().starts_with("```") {
        body = "";
    }
    body.trim()
}

/// Strictly decode a reply into an [`IntakeResult`].
pub fn try_parse_reply(raw: &str) -> Result<IntakeResult, ReplyParseError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw))?;
    if !value.is_object() {
        return Err(ReplyParseError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// Decode a reply, absorbing any failure into [`IntakeResult::fallback`].
pub fn parse_reply(raw: &str) -> ParsedReply {
    match try_parse_reply(raw) {
        Ok(result) => ParsedReply {
            result,
            validated: true,
        },
        Err(e) => {
            error!(error = %e, "Parsing intake reply failed, using fallback");
            debug!(raw = raw, "Unparseable intake reply");
            ParsedReply {
                result: IntakeResult::fallback(raw),
                validated: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_fallback(raw: &str) {
        let parsed = parse_reply(raw);
        assert!(!parsed.validated, "expected fallback for {raw:?}");
        assert_eq!(parsed.result.reply_text, raw);
        assert_eq!(parsed.result.status, IntakeStatus::InProgress);
        assert_eq!(parsed.result.structured_record["demographics"]["age"], "");
        assert_eq!(parsed.result.structured_record["demographics"]["gender"], "");
    }

    #[test]
    fn valid_reply_is_returned_unchanged() {
        for status in ["in-progress", "complete", "alert", "stop"] {
            let raw = format!(
                r#"{{"reply_text": "How old are you?", "status": "{status}", "structured_record": {{"demographics": {{"age": "41"}}, "notes": [1, 2]}}}}"#
            );
            let parsed = parse_reply(&raw);
            assert!(parsed.validated);
            assert_eq!(parsed.result.reply_text, "How old are you?");
            assert_eq!(parsed.result.status.to_string(), status);
            assert_eq!(parsed.result.structured_record["demographics"]["age"], "41");
            assert_eq!(parsed.result.structured_record["notes"][1], 2);
        }
    }

    #[test]
    fn fenced_reply_with_language_tag_is_unwrapped() {
        let raw = "```json\n{\"reply_text\": \"Thanks\", \"status\": \"complete\", \"structured_record\": {}}\n```";
        let parsed = parse_reply(raw);
        assert!(parsed.validated);
        assert_eq!(parsed.result.reply_text, "Thanks");
        assert_eq!(parsed.result.status, IntakeStatus::Complete);
    }

    #[test]
    fn bare_fence_without_tag_is_unwrapped() {
        let raw = "```\n{\"reply_text\": \"Hi\", \"status\": \"in-progress\", \"structured_record\": {}}\n```\n";
        assert!(parse_reply(raw).validated);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let raw = r#"{"response": "Hello", "status": "in-progress", "medical_history": {"demographics": {"age": "", "gender": "f"}}}"#;
        let parsed = parse_reply(raw);
        assert!(parsed.validated);
        assert_eq!(parsed.result.reply_text, "Hello");
        assert_eq!(parsed.result.structured_record["demographics"]["gender"], "f");
    }

    #[test]
    fn plain_text_falls_back() {
        assert_fallback("Hello! I'm here to help with your intake.");
    }

    #[test]
    fn empty_text_falls_back() {
        assert_fallback("");
    }

    #[test]
    fn fenced_garbage_falls_back_with_raw_text() {
        assert_fallback("```json\nnot json at all\n```");
    }

    #[test]
    fn missing_field_falls_back() {
        assert_fallback(r#"{"reply_text": "x", "status": "complete"}"#);
    }

    #[test]
    fn wrong_types_fall_back() {
        assert_fallback(r#"{"reply_text": 3, "status": "complete", "structured_record": {}}"#);
        assert_fallback(r#"{"reply_text": "x", "status": "complete", "structured_record": []}"#);
        assert_fallback(r#"["x", "complete", {}]"#);
    }

    #[test]
    fn status_match_is_case_sensitive() {
        assert_fallback(r#"{"reply_text": "x", "status": "Complete", "structured_record": {}}"#);
        assert_fallback(r#"{"reply_text": "x", "status": "in_progress", "structured_record": {}}"#);
        assert_fallback(r#"{"reply_text": "x", "status": "done", "structured_record": {}}"#);
    }

    #[test]
    fn strip_code_fence_leaves_plain_text_alone() {
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_code_fence("```"), "");
    }
}
