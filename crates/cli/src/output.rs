//! Markdown rendering

use crate::batch::{BatchResult, ItemResult};
use claimcheck_common::CheckReport;
use serde_json::Value;

const HEADER: &[&str] = &[
    "id",
    "response",
    "expected factuality",
    "factuality",
    "num_claims",
    "num_evidences",
    "supports",
    "refutes",
    "irrelevant",
    "decompose time",
    "queries time",
    "retrieve time",
    "verify time",
    "total time",
    "decompose prompt_tokens",
    "decompose completion_tokens",
    "queries prompt_tokens",
    "queries completion_tokens",
    "verify prompt_tokens",
    "verify completion_tokens",
    "total_tokens",
];

/// Make a value safe inside a table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn value_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => cell(s),
        other => cell(&other.to_string()),
    }
}

fn report_cells(report: &CheckReport) -> Vec<String> {
    let summary = &report.summary;
    let timing = &report.timing;
    let usage = &report.usage;
    vec![
        summary
            .factuality
            .map(|f| format!("{:.3}", f))
            .unwrap_or_else(|| "n/a".to_string()),
        summary.num_claims.to_string(),
        summary.num_evidences.to_string(),
        summary.tally.supports.to_string(),
        summary.tally.refutes.to_string(),
        summary.tally.irrelevant.to_string(),
        format!("{:.2}", timing.decompose),
        format!("{:.2}", timing.queries),
        format!("{:.2}", timing.retrieve),
        format!("{:.2}", timing.verify),
        format!("{:.2}", timing.total()),
        usage.decompose.prompt_tokens.to_string(),
        usage.decompose.completion_tokens.to_string(),
        usage.queries.prompt_tokens.to_string(),
        usage.queries.completion_tokens.to_string(),
        usage.verify.prompt_tokens.to_string(),
        usage.verify.completion_tokens.to_string(),
        usage.total().total_tokens().to_string(),
    ]
}

fn row(item: &ItemResult) -> String {
    let mut cells = vec![value_cell(&item.id), cell(&item.input), value_cell(&item.expected)];
    match &item.report {
        Some(report) => cells.extend(report_cells(report)),
        None => {
            cells.push(format!("error: {}", cell(item.error.as_deref().unwrap_or("unknown"))));
            cells.extend(std::iter::repeat(String::new()).take(HEADER.len() - 4));
        }
    }
    format!("| {} |", cells.join(" | "))
}

fn header() -> Vec<String> {
    vec![
        format!("| {} |", HEADER.join(" | ")),
        format!("| {} |", vec!["---"; HEADER.len()].join(" | ")),
    ]
}

/// One row per batch item
pub fn batch_table(batch: &BatchResult) -> String {
    let mut lines = header();
    lines.extend(batch.results.iter().map(row));
    lines.join("\n")
}

/// Single-row table plus per-claim verdicts
pub fn report_markdown(input: &str, report: &CheckReport) -> String {
    let mut cells = vec![report.id.to_string(), cell(input), String::new()];
    cells.extend(report_cells(report));

    let mut lines = header();
    lines.push(format!("| {} |", cells.join(" | ")));
    lines.push(String::new());
    lines.push("| claim | verdict | factuality | evidences |".to_string());
    lines.push("| --- | --- | --- | --- |".to_string());
    for claim in &report.claims {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            cell(&claim.summary.claim),
            claim.summary.verdict.as_str(),
            claim
                .summary
                .factuality
                .map(|f| format!("{:.3}", f))
                .unwrap_or_else(|| "n/a".to_string()),
            claim.summary.num_evidences,
        ));
    }
    lines.join("\n")
}
