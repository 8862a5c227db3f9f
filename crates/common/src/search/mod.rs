//! Web search abstraction
//!
//! Provides a unified interface for multiple search providers:
//! - Cloudsway (full-text endpoint with long-form `mainText` summaries)
//! - Serper (Google results, optional answer box)
//! - Mock (deterministic results for tests and offline runs)
//!
//! Each adapter maps its provider's JSON into `SearchResponse`; nothing
//! downstream sees provider field names.

mod cloudsway;
mod mock;
mod serper;

pub use cloudsway::CloudswaySearch;
pub use mock::MockSearch;
pub use serper::SerperSearch;

use crate::config::SearchConfig;
use crate::errors::{AppError, CallError, Result};
use crate::evidence::normalize_newlines;
use crate::models::{EvidenceOrigin, EvidenceRecord, Sentinel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Attribution used for answer-box evidence
pub const ANSWER_BOX_SOURCE: &str = "Answer Box";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    /// Results requested from the provider
    pub count: usize,
    /// Restrict results to these domains
    pub sites: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, config: &SearchConfig) -> Self {
        Self {
            query: query.into(),
            count: config.result_count.max(config.top_k),
            sites: config.sites.clone(),
        }
    }
}

/// One organic result, provider-neutral
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    /// Short summary (~100 chars)
    pub snippet: String,
    /// Long-form summary when the provider supplies one
    pub main_text: Option<String>,
    /// Full page body when the provider supplies one
    pub raw_content: Option<String>,
    pub score: Option<f64>,
    pub date: Option<String>,
}

impl SearchHit {
    /// Evidence text and where it came from; `None` for an empty hit
    fn best_text(&self) -> Option<(&str, EvidenceOrigin)> {
        match self.main_text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => Some((text, EvidenceOrigin::MainText)),
            None if !self.snippet.trim().is_empty() => Some((&self.snippet, EvidenceOrigin::Snippet)),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Query as echoed by the provider
    pub query: String,
    /// Direct answer, when the provider produced one
    pub answer: Option<String>,
    pub hits: Vec<SearchHit>,
}

impl Sentinel for SearchResponse {
    fn sentinel() -> Self {
        SearchResponse::default()
    }
}

impl SearchResponse {
    /// Evidence for `query`: the answer box alone if present, otherwise the
    /// first `top_k` hits that carry a URL and some text.
    pub fn into_evidence(self, query: &str, top_k: usize) -> Vec<EvidenceRecord> {
        if let Some(answer) = self.answer.filter(|a| !a.trim().is_empty()) {
            return vec![EvidenceRecord {
                text: format!("{}\nAnswer: {}", query, answer),
                url: ANSWER_BOX_SOURCE.to_string(),
                date: None,
                origin: EvidenceOrigin::AnswerBox,
                page_text: None,
            }];
        }

        self.hits
            .iter()
            .take(top_k)
            .filter(|hit| !hit.url.is_empty())
            .filter_map(|hit| {
                let (text, origin) = hit.best_text()?;
                Some(EvidenceRecord {
                    text: normalize_newlines(text),
                    url: hit.url.clone(),
                    date: hit.date.clone().filter(|d| !d.is_empty()),
                    origin,
                    page_text: match origin {
                        EvidenceOrigin::Snippet => hit.raw_content.clone(),
                        _ => None,
                    },
                })
            })
            .collect()
    }
}

/// Trait for web search providers
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Run one query
    async fn search(&self, request: &SearchRequest) -> std::result::Result<SearchResponse, CallError>;

    /// Provider name
    fn name(&self) -> &str;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(AppError::from)
}

/// Create a search transport based on configuration
pub fn create_search_transport(config: &SearchConfig) -> Result<Arc<dyn SearchTransport>> {
    let api_key = || {
        config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: format!("search.api_key is required for provider '{}'", config.provider),
        })
    };

    match config.provider.as_str() {
        "cloudsway" => {
            let endpoint = config.base_url.clone().ok_or_else(|| AppError::Configuration {
                message: "search.base_url is required for provider 'cloudsway'".to_string(),
            })?;
            Ok(Arc::new(CloudswaySearch::new(endpoint, api_key()?, config)?))
        }
        "serper" => Ok(Arc::new(SerperSearch::new(
            config.base_url.clone(),
            api_key()?,
            config,
        )?)),
        "mock" => Ok(Arc::new(MockSearch::new())),
        other => Err(AppError::Configuration {
            message: format!("unknown search provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, snippet: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            snippet: snippet.to_string(),
            ..SearchHit::default()
        }
    }

    #[test]
    fn test_answer_box_wins() {
        let response = SearchResponse {
            query: "capital of France".to_string(),
            answer: Some("Paris".to_string()),
            hits: vec![hit("https://a", "a")],
        };
        let evidence = response.into_evidence("capital of France", 3);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].text, "capital of France\nAnswer: Paris");
        assert_eq!(evidence[0].url, ANSWER_BOX_SOURCE);
        assert!(!evidence[0].needs_extension());
    }

    #[test]
    fn test_top_k_and_text_preference() {
        let mut long = hit("https://b", "short");
        long.main_text = Some("long\n\n\nsummary".to_string());
        let response = SearchResponse {
            query: "q".to_string(),
            answer: None,
            hits: vec![hit("https://a", "first"), long, hit("https://c", "third"), hit("https://d", "fourth")],
        };

        let evidence = response.into_evidence("q", 3);
        assert_eq!(evidence.len(), 3);
        assert_eq!(evidence[0].origin, EvidenceOrigin::Snippet);
        assert_eq!(evidence[1].text, "long\nsummary");
        assert_eq!(evidence[1].origin, EvidenceOrigin::MainText);
        assert_eq!(evidence[2].url, "https://c");
    }

    #[test]
    fn test_raw_body_kept_only_for_snippet_records() {
        let mut bare = hit("https://a", "short");
        bare.raw_content = Some("full body with short in it".to_string());
        let mut summarized = hit("https://b", "short");
        summarized.main_text = Some("summary".to_string());
        summarized.raw_content = Some("full body".to_string());
        let response = SearchResponse {
            query: "q".to_string(),
            answer: None,
            hits: vec![bare, summarized],
        };

        let evidence = response.into_evidence("q", 3);
        assert_eq!(evidence[0].page_text.as_deref(), Some("full body with short in it"));
        assert_eq!(evidence[1].page_text, None);
    }

    #[test]
    fn test_hits_without_url_or_text_dropped() {
        let response = SearchResponse {
            query: "q".to_string(),
            answer: Some("  ".to_string()),
            hits: vec![hit("", "no url"), hit("https://a", ""), hit("https://b", "ok")],
        };
        let evidence = response.into_evidence("q", 3);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].url, "https://b");
    }

    #[test]
    fn test_factory_requires_credentials() {
        let config = SearchConfig {
            provider: "serper".to_string(),
            api_key: None,
            ..SearchConfig::default()
        };
        assert!(matches!(
            create_search_transport(&config),
            Err(AppError::Configuration { .. })
        ));

        let config = SearchConfig {
            provider: "mock".to_string(),
            ..SearchConfig::default()
        };
        assert_eq!(create_search_transport(&config).unwrap().name(), "mock");
    }
}
