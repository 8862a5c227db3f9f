//! Evidence aggregation
//!
//! Queries are flattened across claims before dispatch, so the dispatcher
//! returns one result list per query in claim order. `aggregate` walks the
//! claims again and slices that flat list back into per-claim evidence.

mod extend;

pub use extend::{extend_snippet, html_to_text, PageFetcher, ReqwestPageFetcher, SnippetExtender};

use crate::errors::{AppError, Result};
use crate::models::ClaimMap;
use regex_lite::Regex;
use std::sync::OnceLock;

/// Regroup per-query results under the claims that produced the queries.
///
/// `flat_results[i]` must belong to the i-th query when iterating
/// `claim_queries` in order. Every claim appears in the output, in input
/// order, even when it received no evidence.
pub fn aggregate<Q, V>(
    claim_queries: &ClaimMap<Vec<Q>>,
    flat_results: Vec<Vec<V>>,
) -> Result<ClaimMap<Vec<V>>> {
    let expected: usize = claim_queries.values().map(Vec::len).sum();
    if expected != flat_results.len() {
        return Err(AppError::AggregateMismatch {
            expected,
            actual: flat_results.len(),
        });
    }

    let mut flat = flat_results.into_iter();
    let mut aggregated = ClaimMap::with_capacity(claim_queries.len());
    for (claim, queries) in claim_queries.iter() {
        let evidence: Vec<V> = flat.by_ref().take(queries.len()).flatten().collect();
        aggregated.insert(claim, evidence);
    }

    Ok(aggregated)
}

/// Collapse runs of newlines into one
pub fn normalize_newlines(text: &str) -> String {
    static NEWLINES: OnceLock<Regex> = OnceLock::new();
    NEWLINES
        .get_or_init(|| Regex::new(r"\n+").unwrap())
        .replace_all(text, "\n")
        .into_owned()
}
