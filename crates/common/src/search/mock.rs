use super::{SearchHit, SearchRequest, SearchResponse, SearchTransport};
use crate::errors::CallError;
use async_trait::async_trait;

/// Mock search provider for testing
///
/// Returns `count` deterministic hits whose snippet repeats the query.
#[derive(Debug, Default)]
pub struct MockSearch;

impl MockSearch {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchTransport for MockSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, CallError> {
        let hits = (0..request.count)
            .map(|i| SearchHit {
                url: format!("https://example.com/mock/{}", i),
                title: format!("Mock result {}", i),
                snippet: format!("{} (mock result {})", request.query, i),
                score: Some(1.0 - i as f64 * 0.1),
                ..SearchHit::default()
            })
            .collect();

        Ok(SearchResponse {
            query: request.query.clone(),
            answer: None,
            hits,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
