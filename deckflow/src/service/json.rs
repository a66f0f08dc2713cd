//! Robust JSON extraction from generative model output.
//!
//! Models wrap JSON in markdown fences, preamble text, or trailing
//! commentary. Extraction strips fences first, then scans for the
//! first balanced JSON object or array and parses that slice.

use crate::errors::StageError;
use regex::Regex;
use std::sync::OnceLock;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap()
    })
}

/// Extracts the first JSON object or array from raw model output.
///
/// # Errors
///
/// Returns [`StageError::MalformedOutput`] when no parseable JSON
/// value can be located in the text.
pub fn extract_json(raw: &str) -> Result<serde_json::Value, StageError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StageError::malformed("empty response"));
    }

    // Fenced block wins when present.
    if let Some(caps) = fence_pattern().captures(trimmed) {
        if let Some(inner) = caps.get(1) {
            if let Ok(value) = serde_json::from_str(inner.as_str()) {
                return Ok(value);
            }
        }
    }

    // Whole-string parse covers the well-behaved case.
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    // Otherwise scan for the first balanced object or array.
    if let Some(slice) = first_balanced(trimmed) {
        if let Ok(value) = serde_json::from_str(slice) {
            return Ok(value);
        }
    }

    let preview: String = trimmed.chars().take(120).collect();
    Err(StageError::malformed(format!(
        "no JSON value found in response: {preview}"
    )))
}

/// Finds the first balanced `{...}` or `[...]` slice, respecting
/// string literals and escapes.
fn first_balanced(text: &str) -> Option<&str> {
    let open = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let (open_ch, close_ch) = if bytes[open] == b'{' {
        (b'{', b'}')
    } else {
        (b'[', b']')
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open_ch => depth += 1,
            _ if b == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        let value = extract_json(r#"{"title": "Q3 Review"}"#).unwrap();
        assert_eq!(value["title"], "Q3 Review");
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here is the outline:\n```json\n{\"slides\": [1, 2]}\n```\nDone.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["slides"], json!([1, 2]));
    }

    #[test]
    fn test_fence_without_language_tag() {
        let raw = "```\n{\"ok\": true}\n```";
        assert_eq!(extract_json(raw).unwrap()["ok"], true);
    }

    #[test]
    fn test_embedded_object_with_preamble() {
        let raw = "Sure! The review follows. {\"is_acceptable\": false, \"overall_quality_score\": 55} Let me know.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["overall_quality_score"], 55);
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = "prefix {\"note\": \"uses { and } freely\", \"n\": 1} suffix";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_array_payload() {
        let value = extract_json("keywords: [\"growth\", \"revenue\"]").unwrap();
        assert_eq!(value, json!(["growth", "revenue"]));
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = extract_json("I could not produce an outline.").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_empty_response() {
        assert!(extract_json("   ").unwrap_err().is_malformed());
    }
}
