//! Retrospective response parser
//!
//! The analysis text comes back from an opaque text-generation service and
//! is only *expected* to contain a JSON object. This parser runs an ordered
//! fallback chain and always produces a usable [`Retrospective`]; callers
//! never see a parse error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::{Lesson, Priority, Retrospective};

/// How much raw text the failure record preserves for audit
const RAW_AUDIT_CHARS: usize = 500;

/// Confidence assigned when no parse strategy succeeds
const PARSE_FAILURE_CONFIDENCE: f64 = 0.3;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));

static BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("valid regex"));

static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^'\\]*)'").expect("valid regex"));

/// Parse a retrospective analysis response into a structured record.
///
/// Fallback chain, first success wins:
/// 1. first fenced code block, strict parse
/// 2. first balanced `{..}` span, trailing commas stripped, strict parse
/// 3. permissive repair pass (bare keys, single quotes, trailing commas)
/// 4. default record flagging the failure, raw text truncated for audit
pub fn parse_retrospective(response: &str) -> Retrospective {
    if let Some(value) = extract_json(response) {
        return from_value(&value);
    }

    debug!(
        "No parse strategy succeeded for retrospective ({} chars)",
        response.len()
    );
    let truncated: String = response.chars().take(RAW_AUDIT_CHARS).collect();
    Retrospective {
        situation_analysis: json!({ "raw_response": truncated }),
        judgment_evaluation: json!({}),
        lessons: Vec::new(),
        pattern_tags: Vec::new(),
        one_line_summary: "Retrospective analysis could not be parsed".to_string(),
        confidence_score: PARSE_FAILURE_CONFIDENCE,
    }
}

fn extract_json(response: &str) -> Option<Value> {
    // 1. Fenced code block
    if let Some(caps) = FENCED_BLOCK.captures(response) {
        if let Ok(v) = serde_json::from_str::<Value>(&caps[1]) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    // 2. First balanced top-level object, with the common trailing-comma
    //    artifact stripped
    if let Some(span) = brace_span(response) {
        let cleaned = TRAILING_COMMA.replace_all(span, "$1");
        if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
            if v.is_object() {
                return Some(v);
            }
        }

        // 3. Permissive repair
        let repaired = repair_json(&cleaned);
        if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    None
}

/// Locate the first balanced top-level `{...}` span, tracking string
/// literals and escapes so braces inside values don't end the span early
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Tolerate the common minor syntax errors in generated JSON: unquoted
/// keys, single-quoted strings, trailing commas
fn repair_json(text: &str) -> String {
    let quoted_keys = BARE_KEY.replace_all(text, "$1\"$2\":");
    let double_quoted = SINGLE_QUOTED.replace_all(&quoted_keys, "\"$1\"");
    TRAILING_COMMA.replace_all(&double_quoted, "$1").into_owned()
}

/// Lenient field extraction: wrong-typed members are skipped, missing
/// members default
fn from_value(value: &Value) -> Retrospective {
    let lessons = value
        .get("lessons")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(lesson_from_value).collect())
        .unwrap_or_default();

    let pattern_tags = value
        .get("pattern_tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Retrospective {
        situation_analysis: object_or_empty(value.get("situation_analysis")),
        judgment_evaluation: object_or_empty(value.get("judgment_evaluation")),
        lessons,
        pattern_tags,
        one_line_summary: value
            .get("one_line_summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence_score: value
            .get("confidence_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
    }
}

fn object_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(v) if v.is_object() => v.clone(),
        _ => json!({}),
    }
}

fn lesson_from_value(item: &Value) -> Option<Lesson> {
    let obj = item.as_object()?;
    Some(Lesson {
        condition: obj
            .get("condition")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        action: obj
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        reason: obj
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        priority: obj
            .get("priority")
            .and_then(Value::as_str)
            .map(Priority::from_label)
            .unwrap_or(Priority::Medium),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_BODY: &str = r#"{
        "situation_analysis": {"market": "weak"},
        "judgment_evaluation": {"entry": "late"},
        "lessons": [
            {"condition": "RSI above 75 at entry", "action": "Wait for a pullback", "reason": "overheated", "priority": "high"}
        ],
        "pattern_tags": ["chasing", "overbought"],
        "one_line_summary": "Entered overheated, exited on stop",
        "confidence_score": 0.8
    }"#;

    #[test]
    fn test_fenced_block_parses() {
        let response = format!("Here is the review:\n```json\n{}\n```\nDone.", VALID_BODY);
        let r = parse_retrospective(&response);
        assert_eq!(r.one_line_summary, "Entered overheated, exited on stop");
        assert_eq!(r.lessons.len(), 1);
        assert_eq!(r.lessons[0].priority, Priority::High);
        assert_eq!(r.pattern_tags, vec!["chasing", "overbought"]);
        assert!((r.confidence_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_bare_object_with_trailing_commas() {
        let response = r#"Analysis follows: {
            "lessons": [
                {"condition": "c", "action": "a", "priority": "low"},
            ],
            "pattern_tags": ["tag1",],
            "one_line_summary": "ok",
            "confidence_score": 0.6,
        }"#;
        let r = parse_retrospective(response);
        assert_eq!(r.one_line_summary, "ok");
        assert_eq!(r.lessons.len(), 1);
        assert_eq!(r.lessons[0].priority, Priority::Low);
    }

    #[test]
    fn test_repair_pass_handles_bare_keys_and_single_quotes() {
        let response = "{one_line_summary: 'quick flip worked', confidence_score: 0.7, lessons: []}";
        let r = parse_retrospective(response);
        assert_eq!(r.one_line_summary, "quick flip worked");
        assert!((r.confidence_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_garbage_yields_default_record() {
        let long_garbage = "x".repeat(2000);
        let r = parse_retrospective(&long_garbage);
        assert!(r.lessons.is_empty());
        assert!(r.pattern_tags.is_empty());
        assert!((r.confidence_score - 0.3).abs() < 1e-9);
        let raw = r.situation_analysis["raw_response"].as_str().unwrap();
        assert_eq!(raw.chars().count(), 500);
        assert!(r.one_line_summary.contains("could not be parsed"));
    }

    #[test]
    fn test_non_object_lessons_are_skipped() {
        let response = r#"{"lessons": ["just a string", {"condition": "c", "action": "a"}], "confidence_score": 1.5}"#;
        let r = parse_retrospective(response);
        assert_eq!(r.lessons.len(), 1);
        assert_eq!(r.lessons[0].condition, "c");
        // confidence clamped into [0, 1]
        assert!((r.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_span() {
        let response = r#"note {"one_line_summary": "kept {position} open", "lessons": []} trailing"#;
        let r = parse_retrospective(response);
        assert_eq!(r.one_line_summary, "kept {position} open");
    }

    #[test]
    fn test_missing_fields_default() {
        let r = parse_retrospective(r#"{"one_line_summary": "sparse"}"#);
        assert_eq!(r.one_line_summary, "sparse");
        assert!(r.situation_analysis.as_object().unwrap().is_empty());
        assert!((r.confidence_score - 0.5).abs() < 1e-9);
    }
}
