//! Parse model output
//!
//! Model output is only ever read as JSON and checked against the keys each
//! stage expects. Anything else is `ResponseShapeInvalid`.

use crate::errors::CallError;
use crate::models::{Judgment, Relationship};
use serde_json::{Map, Value};

/// Drop a surrounding markdown code fence, if any
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (```json)
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn parse_object(response: &str) -> Result<Map<String, Value>, CallError> {
    let json: Value = serde_json::from_str(strip_code_fences(response))
        .map_err(|e| CallError::shape(format!("JSON parse error: {}", e)))?;
    match json {
        Value::Object(map) => Ok(map),
        _ => Err(CallError::shape("expected a JSON object")),
    }
}

/// Non-empty string list under `key`
fn string_list(map: &Map<String, Value>, key: &str) -> Result<Vec<String>, CallError> {
    let items = map
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| CallError::shape(format!("missing or invalid '{}'", key)))?;

    let values: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if values.is_empty() {
        return Err(CallError::shape(format!("'{}' is empty", key)));
    }
    Ok(values)
}

/// `{"claims": [...]}`
pub fn parse_claims(response: &str) -> Result<Vec<String>, CallError> {
    string_list(&parse_object(response)?, "claims")
}

/// `{"queries": [...]}`
pub fn parse_queries(response: &str) -> Result<Vec<String>, CallError> {
    string_list(&parse_object(response)?, "queries")
}

/// `{"reasoning": "...", "relationship": "SUPPORTS" | "REFUTES" | "IRRELEVANT"}`
pub fn parse_judgment(response: &str) -> Result<Judgment, CallError> {
    let map = parse_object(response)?;

    let reasoning = match map.get("reasoning") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => return Err(CallError::shape("missing 'reasoning'")),
    };

    let relationship = map
        .get("relationship")
        .and_then(Value::as_str)
        .ok_or_else(|| CallError::shape("missing 'relationship'"))?
        .parse::<Relationship>()
        .map_err(CallError::shape)?;

    Ok(Judgment {
        reasoning,
        relationship,
    })
}

fn is_cjk_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '；')
}

/// Sentence splitter used when the model never returns usable claims.
///
/// Splits after `.`, `!` or `?` followed by whitespace, after full-width
/// terminators, and at line breaks. Sentences shorter than 3 characters are
/// dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            sentences.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);

        let boundary = is_cjk_terminator(c)
            || (matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |next| next.is_whitespace()));
        if boundary {
            sentences.push(std::mem::take(&mut current));
        }
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| s.chars().count() >= 3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorClass;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_claims() {
        let claims = parse_claims("```json\n{\"claims\": [\"Paris is in France.\", \" \", \"It is big.\"]}\n```").unwrap();
        assert_eq!(claims, vec!["Paris is in France.", "It is big."]);

        for bad in ["{\"claims\": []}", "{\"facts\": [\"x\"]}", "[\"x\"]", "claims: x"] {
            assert_eq!(parse_claims(bad).unwrap_err().class(), ErrorClass::ResponseShapeInvalid);
        }
    }

    #[test]
    fn test_parse_judgment() {
        let judgment = parse_judgment(r#"{"reasoning": "The page says so.", "relationship": "supports"}"#).unwrap();
        assert_eq!(judgment.relationship, Relationship::Supports);
        assert_eq!(judgment.reasoning, "The page says so.");

        assert!(parse_judgment(r#"{"relationship": "REFUTES"}"#).is_err());
        assert!(parse_judgment(r#"{"reasoning": "x", "relationship": "MAYBE"}"#).is_err());
        assert!(parse_judgment(r#"{"reasoning": "x"}"#).is_err());
    }

    #[test]
    fn test_split_sentences() {
        let text = "Paris is the capital of France. It has 2.1 million people!\nOk\n巴黎是法国首都。人口很多。";
        assert_eq!(
            split_sentences(text),
            vec![
                "Paris is the capital of France.",
                "It has 2.1 million people!",
                "巴黎是法国首都。",
                "人口很多。",
            ]
        );
    }

    #[test]
    fn test_split_drops_fragments() {
        assert!(split_sentences("a. b. ").is_empty());
        assert_eq!(split_sentences("No terminator"), vec!["No terminator"]);
    }
}
