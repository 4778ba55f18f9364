//! Tool-call extraction from free-form model output.
//!
//! The model is prompted to embed actions as JSON objects of the form
//! `{"action": "name", "params": {...}}` anywhere in its reply. The
//! scanner finds balanced `{...}` spans (ignoring braces inside string
//! literals), parses each as JSON, and keeps the ones that name an
//! action. Malformed input yields fewer requests, never an error.

use serde_json::Value;

use keel_core::types::{ActionRequest, Params};

/// Keys accepted as the parameter object, in lookup order.
const PARAM_KEYS: [&str; 3] = ["params", "parameters", "arguments"];

/// Turns raw model text into an ordered list of action requests.
pub trait ToolCallExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<ActionRequest>;
}

/// Default extractor: balanced-brace scanning plus JSON parsing.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBlockExtractor;

impl ToolCallExtractor for JsonBlockExtractor {
    fn extract(&self, text: &str) -> Vec<ActionRequest> {
        extract(text)
    }
}

/// Extract every action request embedded in `text`, in source order.
pub fn extract(text: &str) -> Vec<ActionRequest> {
    let mut requests = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match balanced_end(text.as_bytes(), start) {
            Some(end) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                    if let Some(request) = to_request(value) {
                        requests.push(request);
                    }
                }
                pos = end;
            }
            // Unterminated: retry from the next brace.
            None => pos = start + 1,
        }
    }

    tracing::debug!(count = requests.len(), "Tool calls extracted");
    requests
}

/// Index one past the `}` that closes the `{` at `start`, if any.
///
/// Braces inside double-quoted strings do not count; a backslash escapes
/// the following byte inside a string. All delimiters are ASCII so byte
/// indices are always char boundaries.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
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
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn to_request(value: Value) -> Option<ActionRequest> {
    let Value::Object(mut object) = value else {
        return None;
    };

    let name = match object.remove("action") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return None,
    };

    let params = PARAM_KEYS
        .iter()
        .find_map(|key| match object.remove(*key) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        })
        .unwrap_or_else(Params::new);

    Some(ActionRequest { name, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(requests: &[ActionRequest]) -> Vec<&str> {
        requests.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_single_block_in_prose() {
        let text = r#"Sure, saving that now. {"action": "memory_save", "params": {"content": "buy milk"}} Done."#;
        let requests = extract(text);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "memory_save");
        assert_eq!(requests[0].params.get("content"), Some(&json!("buy milk")));
    }

    #[test]
    fn test_multiple_blocks_in_order() {
        let text = r#"
            First {"action":"file_read","params":{"path":"/tmp/a"}}
            then {"action":"memory_save","params":{"content":"x"}}
            and finally {"action":"plan_parse","params":{"text":"1. go"}}
        "#;
        let requests = extract(text);
        assert_eq!(names(&requests), vec!["file_read", "memory_save", "plan_parse"]);
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"action":"x","params":{"note":"a { b"}}"#;
        let requests = extract(text);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "x");
        assert_eq!(requests[0].params.get("note"), Some(&json!("a { b")));
    }

    #[test]
    fn test_closing_brace_inside_string() {
        let text = r#"{"action":"x","params":{"note":"} oops }"}} tail"#;
        let requests = extract(text);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].params.get("note"), Some(&json!("} oops }")));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"{"action":"memory_save","params":{"content":"she said \"{hi}\""}}"#;
        let requests = extract(text);
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].params.get("content"),
            Some(&json!("she said \"{hi}\""))
        );
    }

    #[test]
    fn test_missing_params_defaults_to_empty() {
        let requests = extract(r#"{"action":"memory_clear"}"#);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].params.is_empty());
    }

    #[test]
    fn test_non_object_params_defaults_to_empty() {
        let requests = extract(r#"{"action":"memory_clear","params":[1,2]}"#);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].params.is_empty());
    }

    #[test]
    fn test_alternate_param_keys() {
        let requests = extract(
            r#"{"action":"a","parameters":{"k":1}} {"action":"b","arguments":{"k":2}}"#,
        );
        assert_eq!(requests[0].params.get("k"), Some(&json!(1)));
        assert_eq!(requests[1].params.get("k"), Some(&json!(2)));
    }

    #[test]
    fn test_objects_without_action_are_skipped() {
        let text = r#"{"note":"no action"} {"action":null} {"action":42} {"action":""} {"action":"ok"}"#;
        assert_eq!(names(&extract(text)), vec!["ok"]);
    }

    #[test]
    fn test_invalid_json_is_skipped() {
        let text = r#"{not json at all} {"action":"after_bad"}"#;
        assert_eq!(names(&extract(text)), vec!["after_bad"]);
    }

    #[test]
    fn test_unterminated_block_does_not_hide_later_calls() {
        let text = r#"{"action":"broken", "params": { {"action":"fine"}"#;
        assert_eq!(names(&extract(text)), vec!["fine"]);
    }

    #[test]
    fn test_empty_and_braceless_input() {
        assert!(extract("").is_empty());
        assert!(extract("no tool calls here").is_empty());
        assert!(extract("}}}{{{").is_empty());
    }

    #[test]
    fn test_unicode_text_around_blocks() {
        let text = "Voilà ✓ {\"action\":\"memory_save\",\"params\":{\"content\":\"café\"}} 日本語";
        let requests = extract(text);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].params.get("content"), Some(&json!("café")));
    }

    #[test]
    fn test_extractor_trait_object() {
        let extractor: Box<dyn ToolCallExtractor> = Box::new(JsonBlockExtractor);
        assert_eq!(extractor.extract(r#"{"action":"a"}"#).len(), 1);
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let samples = [
            "{\"", "{\"\\", "\"{\"}", "{{{{\"}}}}", "{\\\"}", "\u{0}{\u{0}}", "{\"a\":\"\\u00\"}",
        ];
        for sample in samples {
            let _ = extract(sample);
        }
    }
}
