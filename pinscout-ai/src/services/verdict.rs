//! Classifier reply interpretation
//!
//! Turns the raw classifier text into a [`Verdict`]. The label is always
//! derived from the normalized score, whatever the classifier claimed.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::models::{ItemStatus, Verdict};

/// Score used when a malformed reply contains no number at all
pub const FALLBACK_SCORE: f64 = 0.5;

/// Characters of a malformed reply quoted in the explanation
const EXCERPT_CHARS: usize = 200;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+\.?\d*)").expect("static regex is valid"))
}

/// Map any raw score into [0.0, 1.0]
///
/// Non-finite values become 0.0, values above 1.0 are read as percentages.
pub fn normalize_score(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let score = if raw > 1.0 { raw / 100.0 } else { raw };
    score.clamp(0.0, 1.0)
}

/// Verdict for a normalized score with the label re-derived from it
pub fn verdict_for_score(raw: f64, explanation: String) -> Verdict {
    let score = normalize_score(raw);
    Verdict {
        score,
        status: ItemStatus::from_score(score),
        explanation,
    }
}

/// Interpret a classifier reply
pub fn parse_reply(reply: &str) -> Verdict {
    match parse_structured(reply) {
        Some(verdict) => verdict,
        None => {
            tracing::debug!("Classifier reply is not structured JSON, extracting score from text");
            parse_fallback(reply)
        }
    }
}

/// Verdict for an item whose classifier call failed or timed out
pub fn failure_verdict(reason: &str) -> Verdict {
    Verdict {
        score: 0.0,
        status: ItemStatus::Disqualified,
        explanation: format!("AI validation failed: {}", reason),
    }
}

/// Verdict for an item without an image reference
pub fn missing_image_verdict() -> Verdict {
    Verdict {
        score: 0.0,
        status: ItemStatus::Disqualified,
        explanation: "No image URL provided".to_string(),
    }
}

/// JSON object between the first `{` and the last `}`
fn parse_structured(reply: &str) -> Option<Verdict> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }

    let object: Map<String, Value> = match serde_json::from_str(&reply[start..=end]) {
        Ok(Value::Object(object)) => object,
        _ => return None,
    };

    let score = match object.get("match_score").or_else(|| object.get("score")) {
        None | Some(Value::Null) => 0.0,
        Some(value) => score_value(value)?,
    };

    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "No explanation provided".to_string());

    if let Some(label) = object
        .get("classification")
        .or_else(|| object.get("label"))
        .and_then(Value::as_str)
    {
        let derived = ItemStatus::from_score(normalize_score(score));
        if label != derived.as_str() {
            tracing::debug!(
                claimed = label,
                derived = %derived,
                score,
                "Classifier label disagrees with score, using score"
            );
        }
    }

    Some(verdict_for_score(score, explanation))
}

fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_fallback(reply: &str) -> Verdict {
    let score = number_pattern()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(FALLBACK_SCORE);

    let excerpt: String = reply.chars().take(EXCERPT_CHARS).collect();
    verdict_for_score(score, format!("Extracted from AI response: {}...", excerpt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(0.42), 0.42);
        assert_eq!(normalize_score(85.0), 0.85);
        assert_eq!(normalize_score(250.0), 1.0);
        assert_eq!(normalize_score(-0.3), 0.0);
        assert_eq!(normalize_score(f64::NAN), 0.0);
        assert_eq!(normalize_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_structured_reply_with_surrounding_text() {
        let verdict = parse_reply(
            "Here you go:\n{\"match_score\": 0.72, \"explanation\": \"Warm light, bookshelf\", \"classification\": \"approved\"}\nThanks",
        );
        assert_eq!(verdict.score, 0.72);
        assert_eq!(verdict.status, ItemStatus::Approved);
        assert_eq!(verdict.explanation, "Warm light, bookshelf");
    }

    #[test]
    fn test_label_is_derived_from_score() {
        let verdict = parse_reply(
            r#"{"match_score": 0.85, "explanation": "close", "classification": "disqualified"}"#,
        );
        assert_eq!(verdict.status, ItemStatus::Approved);

        let verdict = parse_reply(r#"{"score": 0.2, "label": "approved"}"#);
        assert_eq!(verdict.status, ItemStatus::Disqualified);
        assert_eq!(verdict.explanation, "No explanation provided");
    }

    #[test]
    fn test_structured_reply_without_score_defaults_to_zero() {
        let verdict = parse_reply(r#"{"explanation": "unsure"}"#);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.status, ItemStatus::Disqualified);
    }

    #[test]
    fn test_boundary_score_is_approved() {
        let verdict = parse_reply(r#"{"match_score": "0.5"}"#);
        assert_eq!(verdict.score, 0.5);
        assert_eq!(verdict.status, ItemStatus::Approved);
    }

    #[test]
    fn test_fallback_extracts_first_number() {
        let verdict = parse_reply("I would rate this image 72 out of 100.");
        assert_eq!(verdict.score, 0.72);
        assert_eq!(verdict.status, ItemStatus::Approved);
        assert!(verdict
            .explanation
            .starts_with("Extracted from AI response: I would rate"));
    }

    #[test]
    fn test_fallback_without_number_uses_default() {
        let verdict = parse_reply("Not sure what to make of this picture.");
        assert_eq!(verdict.score, FALLBACK_SCORE);
        assert_eq!(verdict.status, ItemStatus::Approved);
    }

    #[test]
    fn test_fallback_excerpt_is_truncated() {
        let reply = "x".repeat(500);
        let verdict = parse_reply(&reply);
        let expected = format!("Extracted from AI response: {}...", "x".repeat(200));
        assert_eq!(verdict.explanation, expected);
    }

    #[test]
    fn test_reversed_braces_fall_back() {
        let verdict = parse_reply("} score 0.3 {");
        assert_eq!(verdict.score, 0.3);
        assert_eq!(verdict.status, ItemStatus::Disqualified);
    }

    #[test]
    fn test_failure_verdicts() {
        let failed = failure_verdict("timed out after 60s");
        assert_eq!(failed.score, 0.0);
        assert_eq!(failed.status, ItemStatus::Disqualified);
        assert_eq!(failed.explanation, "AI validation failed: timed out after 60s");
        assert_eq!(missing_image_verdict().explanation, "No image URL provided");
    }
}
