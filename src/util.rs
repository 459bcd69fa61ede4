//! Shared parsing helpers for provider output.
//!
//! Every LLM-backed stage expects JSON, but providers routinely wrap it
//! in markdown code fences or append trailing prose. The helpers here
//! locate and parse the first balanced JSON value so stages never
//! hard-fail on formatting drift.

use serde_json::Value;

/// Strips a leading/trailing markdown code fence from the text.
///
/// Handles both ` ```json ` and bare ` ``` ` fences. Text without a
/// fence is returned trimmed.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

/// Extracts the first balanced JSON value (`{...}` or `[...]`) from text.
///
/// Scans from the first opening brace or bracket, tracking string
/// literals and escapes, and returns the slice spanning the balanced
/// value. Leading and trailing prose are ignored. Returns `None` when
/// no balanced value is present.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let text = strip_code_fences(text);
    let start = text.find(['{', '['])?;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extracts and parses the first balanced JSON value from text.
#[must_use]
pub fn parse_json(text: &str) -> Option<Value> {
    extract_json(text).and_then(|slice| serde_json::from_str(slice).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_json_with_trailing_prose() {
        let text = r#"Here you go: {"a": {"b": 2}} hope that helps!"#;
        assert_eq!(extract_json(text), Some(r#"{"a": {"b": 2}}"#));
    }

    #[test]
    fn test_extract_json_array() {
        let text = "```json\n[{\"id\": \"sq1\"}]\n```\nLet me know.";
        assert_eq!(extract_json(text), Some(r#"[{"id": "sq1"}]"#));
    }

    #[test]
    fn test_extract_json_braces_inside_strings() {
        let text = r#"{"answer": "use {braces} and \"quotes\" freely"}"#;
        assert_eq!(extract_json(text), Some(text));
    }

    #[test]
    fn test_extract_json_unbalanced() {
        assert!(extract_json(r#"{"a": 1"#).is_none());
        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn test_parse_json_value() {
        let value = parse_json("```json\n{\"confidence\": 0.9}\n```");
        let confidence = value
            .as_ref()
            .and_then(|v| v.get("confidence"))
            .and_then(Value::as_f64);
        assert_eq!(confidence, Some(0.9));
        assert!(parse_json("not json").is_none());
    }
}
