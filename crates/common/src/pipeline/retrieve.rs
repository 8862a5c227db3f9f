//! Queries → evidence

use crate::config::SearchConfig;
use crate::dispatch::Dispatcher;
use crate::errors::Result;
use crate::evidence::{aggregate, SnippetExtender};
use crate::models::{ClaimEvidence, ClaimQueries, EvidenceRecord, WorkItem};
use crate::search::{SearchRequest, SearchTransport};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct EvidenceRetriever {
    search: Arc<dyn SearchTransport>,
    dispatcher: Dispatcher,
    extender: SnippetExtender,
    config: SearchConfig,
}

impl EvidenceRetriever {
    pub fn new(
        search: Arc<dyn SearchTransport>,
        dispatcher: Dispatcher,
        extender: SnippetExtender,
        config: SearchConfig,
    ) -> Self {
        Self {
            search,
            dispatcher,
            extender,
            config,
        }
    }

    pub fn provider(&self) -> &str {
        self.search.name()
    }

    /// Search every query of every claim, regroup the hits per claim and
    /// extend truncated snippets.
    #[instrument(skip_all, fields(provider = self.search.name(), claims = queries.len()))]
    pub async fn retrieve(&self, queries: &ClaimQueries) -> Result<ClaimEvidence> {
        let items = WorkItem::sequence(
            queries
                .iter()
                .flat_map(|(claim, qs)| qs.iter().map(move |q| (claim, q.clone()))),
        );
        let total_queries = items.len();

        let flat = self.search_all(items).await;
        let mut evidence = aggregate(queries, flat)?;
        let extended = self.extender.extend(&mut evidence).await;

        info!(
            queries = total_queries,
            evidence = evidence.values().map(Vec::len).sum::<usize>(),
            extended,
            "Evidence retrieved"
        );
        Ok(evidence)
    }

    /// Evidence for a single query, empty if the search failed
    pub async fn search_one(&self, query: &str) -> Vec<EvidenceRecord> {
        let items = vec![WorkItem::new(query, 0, query.to_string())];
        self.search_all(items).await.pop().unwrap_or_default()
    }

    async fn search_all(&self, items: Vec<WorkItem<String>>) -> Vec<Vec<EvidenceRecord>> {
        let search = self.search.clone();
        let config = self.config.clone();
        self.dispatcher
            .dispatch(items, move |item| {
                let search = search.clone();
                let request = SearchRequest::new(item.payload.clone(), &config);
                let top_k = config.top_k;
                async move {
                    let response = search.search(&request).await?;
                    Ok(response.into_evidence(&request.query, top_k))
                }
            })
            .await
    }
}
