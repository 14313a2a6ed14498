//! Response Normalizer: raw backend result → [`FeedbackReport`].
//!
//! Providers hand back text in a few different envelopes. The text is
//! extracted with this precedence, first match wins:
//!
//! 1. the result itself is a string
//! 2. `message` is a string
//! 3. `message.content[0].text`
//! 4. `message.content` is a string
//!
//! The text is then parsed as JSON. The only cleanup applied beforehand is
//! removing a leading byte-order mark and one pair of outer code fences,
//! which models add despite being asked not to.

use crate::error::NormalizeError;
use crate::feedback::FeedbackReport;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Pull the feedback text out of a raw backend result.
pub fn extract_text(raw: &Value) -> Option<&str> {
    if let Value::String(s) = raw {
        return Some(s);
    }
    let message = raw.get("message")?;
    if let Value::String(s) = message {
        return Some(s);
    }
    let content = message.get("content")?;
    if let Some(text) = content
        .get(0)
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
    {
        return Some(text);
    }
    content.as_str()
}

/// Remove one pair of outer fences, if present.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Turn a raw backend result into structured feedback.
///
/// Errors with [`NormalizeError::EmptyResponse`] when no text can be found
/// (or it is blank), and with [`NormalizeError::MalformedResponse`] when the
/// text is not a JSON object.
pub fn normalize(raw: &Value) -> Result<FeedbackReport, NormalizeError> {
    let text = extract_text(raw).ok_or(NormalizeError::EmptyResponse)?;
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(NormalizeError::EmptyResponse);
    }

    let body = strip_fences(text);
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string(), text))?;
    if !value.is_object() {
        return Err(malformed(
            format!("expected a JSON object, got {}", kind_of(&value)),
            text,
        ));
    }

    let report: FeedbackReport =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string(), text))?;
    debug!(
        "Normalised feedback (overall score: {:?})",
        report.overall_score().map(|s| s.value())
    );
    Ok(report)
}

fn malformed(detail: String, raw: &str) -> NormalizeError {
    NormalizeError::MalformedResponse {
        detail,
        raw: raw.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::Category;
    use serde_json::json;

    const FEEDBACK: &str = r#"{
        "overallScore": 78,
        "ATS": {"score": 70, "tips": [{"type": "improve", "tip": "Add keywords"}]},
        "toneAndStyle": {"score": 85, "tips": [{"type": "good", "tip": "Clear", "explanation": "Reads well"}]},
        "content": {"score": 72, "tips": []},
        "structure": {"score": 80, "tips": []},
        "skills": {"score": 65, "tips": []}
    }"#;

    #[test]
    fn text_extraction_precedence() {
        assert_eq!(extract_text(&json!("plain")), Some("plain"));
        assert_eq!(extract_text(&json!({"message": "msg"})), Some("msg"));
        assert_eq!(
            extract_text(&json!({"message": {"content": [{"text": "part"}], "other": 1}})),
            Some("part")
        );
        assert_eq!(
            extract_text(&json!({"message": {"content": "whole"}})),
            Some("whole")
        );
        assert_eq!(extract_text(&json!({"message": {"content": 3}})), None);
        assert_eq!(extract_text(&json!(42)), None);
    }

    #[test]
    fn normalises_every_envelope() {
        for raw in [
            json!(FEEDBACK),
            json!({ "message": FEEDBACK }),
            json!({ "message": { "content": [{ "text": FEEDBACK }] } }),
            json!({ "message": { "content": FEEDBACK } }),
        ] {
            let report = normalize(&raw).unwrap();
            assert_eq!(report.overall_score().map(|s| s.value()), Some(78));
            assert_eq!(
                report.category(Category::ToneAndStyle).and_then(|c| c.score()).map(|s| s.value()),
                Some(85)
            );
        }
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = json!(format!("```json\n{FEEDBACK}\n```"));
        assert!(normalize(&raw).is_ok());
        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("  {}  "), "{}");
    }

    #[test]
    fn empty_results_are_empty_response() {
        assert_eq!(normalize(&json!("")), Err(NormalizeError::EmptyResponse));
        assert_eq!(normalize(&json!("   \n")), Err(NormalizeError::EmptyResponse));
        assert_eq!(normalize(&Value::Null), Err(NormalizeError::EmptyResponse));
        assert_eq!(
            normalize(&json!({"message": {"content": [{"type": "image"}]}})),
            Err(NormalizeError::EmptyResponse)
        );
    }

    #[test]
    fn non_json_is_malformed_and_keeps_raw_text() {
        let err = normalize(&json!("Sure! Here's my review.")).unwrap_err();
        match err {
            NormalizeError::MalformedResponse { raw, .. } => {
                assert_eq!(raw, "Sure! Here's my review.")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_object_json_is_malformed() {
        let err = normalize(&json!("[1, 2, 3]")).unwrap_err();
        assert_eq!(err.code(), "malformed-response");
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn normalised_report_round_trips() {
        let report = normalize(&json!(FEEDBACK)).unwrap();
        let expected: Value = serde_json::from_str(FEEDBACK).unwrap();
        assert_eq!(serde_json::to_value(&report).unwrap(), expected);
    }
}
