//! Batch checking over a JSON array of items

use chrono::{DateTime, Utc};
use claimcheck_common::{CheckReport, FactChecker};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};

/// Text to check for one batch item.
///
/// Looks at `response`, then the last `human` entry of `responses` (or the
/// last entry when none is human), then `question`, then `text`.
pub fn extract_text(item: &Value) -> Option<String> {
    let non_blank = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(text) = non_blank(item.get("response")) {
        return Some(text);
    }

    if let Some(responses) = item.get("responses").and_then(Value::as_array) {
        let human = responses
            .iter()
            .filter(|r| r.get("type").and_then(Value::as_str) == Some("human"))
            .filter(|r| r.get("content").is_some_and(Value::is_string))
            .last()
            .or_else(|| responses.last());
        if let Some(text) = non_blank(human.and_then(|r| r.get("content"))) {
            return Some(text);
        }
    }

    non_blank(item.get("question")).or_else(|| non_blank(item.get("text")))
}

#[derive(Debug, Serialize)]
pub struct ItemResult {
    pub id: Value,
    pub input: String,
    /// Reference factuality label carried by the item, if any
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct BatchTiming {
    pub total_seconds: f64,
    pub average_seconds: f64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub results: Vec<ItemResult>,
    pub timing: BatchTiming,
    pub summary: BatchSummary,
}

/// Check items one after another; a failing item is recorded, not fatal
pub async fn run_batch(checker: &FactChecker, items: &[Value], limit: Option<usize>) -> BatchResult {
    let items = match limit {
        Some(n) if n > 0 => &items[..n.min(items.len())],
        _ => items,
    };
    let start = Instant::now();
    let mut results = Vec::with_capacity(items.len());

    for (position, item) in items.iter().enumerate() {
        let id = item.get("id").cloned().unwrap_or_else(|| Value::from(position));
        let expected = item
            .get("attributes")
            .and_then(|a| a.get("factuality"))
            .cloned()
            .unwrap_or(Value::Null);
        let item_start = Instant::now();

        let (input, report, error) = match extract_text(item) {
            None => (String::new(), None, Some("no text found in item".to_string())),
            Some(text) => match checker.check(&text).await {
                Ok(report) => (text, Some(report), None),
                Err(e) => (text, None, Some(e.to_string())),
            },
        };

        if let Some(error) = &error {
            warn!(item = %id, error = %error, "Batch item failed");
        } else {
            info!(item = %id, done = position + 1, total = items.len(), "Batch item checked");
        }

        results.push(ItemResult {
            id,
            input,
            expected,
            report,
            error,
            response_time_seconds: item_start.elapsed().as_secs_f64(),
        });
    }

    let total_seconds = start.elapsed().as_secs_f64();
    let successful = results.iter().filter(|r| r.report.is_some()).count();

    BatchResult {
        timing: BatchTiming {
            total_seconds,
            average_seconds: if results.is_empty() {
                0.0
            } else {
                total_seconds / results.len() as f64
            },
            finished_at: Utc::now(),
        },
        summary: BatchSummary {
            total: results.len(),
            successful,
        },
        results,
    }
}
