//! Tolerant JSON recovery from free-form LLM text (§4.2).
//!
//! CPU-bound, synchronous, no suspension points — called from inside async handlers
//! but must never itself `.await`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex"));

/// Strategies applied in order until one succeeds; returns `None` only if every strategy
/// fails and the text carries no recognizable question either.
pub fn extract(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    if let Some(captures) = FENCED_BLOCK.captures(text)
        && let Some(candidate) = captures.get(1)
        && let Ok(value) = serde_json::from_str::<Value>(candidate.as_str())
    {
        return Some(value);
    }

    if let Some(value) = extract_by_brace_matching(text) {
        return Some(value);
    }

    question_fallback(text)
}

/// From the first `{`, track nesting depth, skipping braces inside JSON strings
/// (respecting backslash-escaping), and parse the substring once depth returns to zero.
fn extract_by_brace_matching(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if escape {
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == '"' {
            in_string = !in_string;
        }

        if !in_string {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + offset + 1;
                        let candidate = text[start..end].trim();
                        return serde_json::from_str::<Value>(candidate).ok();
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Heuristic fallback for conversational question outputs: if the text looks like it's
/// asking something, synthesize a minimal question envelope rather than giving up.
fn question_fallback(text: &str) -> Option<Value> {
    let lower = text.to_lowercase();
    if !lower.contains("question") && !text.contains('?') {
        return None;
    }

    let trimmed = text.trim();
    let lines: Vec<&str> = trimmed.lines().collect();
    let question = lines
        .iter()
        .find(|line| line.contains('?'))
        .copied()
        .or_else(|| lines.first().copied())
        .unwrap_or("Can you describe your symptoms?")
        .trim();

    Some(serde_json::json!({
        "question": question,
        "question_type": "open_ended",
        "internal_analysis": { "extracted": true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_json() {
        let v = extract(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn parses_fenced_code_block_with_surrounding_prose() {
        let text = "Here is the analysis:\n```json\n{\"confidence\": 82}\n```\nLet me know if you need more.";
        let v = extract(text).unwrap();
        assert_eq!(v["confidence"], 82);
    }

    #[test]
    fn brace_matching_ignores_braces_inside_strings() {
        let text = r#"preamble {"note": "contains a } brace", "value": 5} trailing"#;
        let v = extract(text).unwrap();
        assert_eq!(v["value"], 5);
    }

    #[test]
    fn falls_back_to_question_envelope() {
        let text = "I'm not sure I understood that. Can you tell me where it hurts?";
        let v = extract(text).unwrap();
        assert_eq!(v["question_type"], "open_ended");
        assert!(v["question"].as_str().unwrap().contains("where it hurts"));
    }

    #[test]
    fn returns_none_for_unparseable_non_question_text() {
        assert!(extract("The weather today is mild and sunny.").is_none());
    }
}
