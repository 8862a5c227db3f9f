//! Claims → search queries

use super::parse::parse_queries;
use super::prompts::query_prompt;
use crate::dispatch::Dispatcher;
use crate::llm::{CompletionRequest, LlmClient, TokenUsage, UsageCounter};
use crate::metrics;
use crate::models::{ClaimQueries, WorkItem};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub queries: ClaimQueries,
    /// Claims that fell back to searching their own text
    pub fallbacks: usize,
    pub usage: TokenUsage,
}

pub struct QueryGenerator {
    llm: Arc<dyn LlmClient>,
    dispatcher: Dispatcher,
    rounds: u32,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: Dispatcher, rounds: u32) -> Self {
        Self {
            llm,
            dispatcher,
            rounds,
        }
    }

    /// Generate queries for every claim, in claim order
    #[instrument(skip_all, fields(claims = claims.len()))]
    pub async fn generate(&self, claims: &[String]) -> QueryPlan {
        let usage = Arc::new(UsageCounter::default());
        let items = WorkItem::sequence(claims.iter().map(|claim| (claim.as_str(), claim.clone())));

        let llm = self.llm.clone();
        let counter = usage.clone();
        let results = self
            .dispatcher
            .dispatch_rounds(items, self.rounds, move |item| {
                let llm = llm.clone();
                let counter = counter.clone();
                let request = CompletionRequest::new(query_prompt(&item.payload));
                async move {
                    let completion = llm.complete(&request).await?;
                    counter.record(&completion.usage);
                    parse_queries(&completion.content).map(Some)
                }
            })
            .await;

        let mut fallbacks = 0;
        let mut queries = ClaimQueries::with_capacity(claims.len());
        for (claim, generated) in claims.iter().zip(results) {
            let generated = generated.unwrap_or_else(|| {
                fallbacks += 1;
                vec![claim.clone()]
            });
            queries.insert(claim.as_str(), generated);
        }

        metrics::record_sentinels("queries", fallbacks);
        info!(
            queries = queries.values().map(Vec::len).sum::<usize>(),
            fallbacks,
            "Queries generated"
        );

        QueryPlan {
            queries,
            fallbacks,
            usage: usage.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, RateLimitConfig, RetryConfig};
    use crate::gateway::CallGateway;
    use crate::llm::MockLlm;
    use crate::retry::{RetryExecutor, RetryPolicy};

    fn generator(llm: MockLlm) -> QueryGenerator {
        let dispatcher = Dispatcher::new(
            DispatchConfig::default(),
            Arc::new(CallGateway::new("llm", &RateLimitConfig::default())),
            RetryExecutor::new("llm", RetryPolicy::network(&RetryConfig::default())),
        );
        QueryGenerator::new(Arc::new(llm), dispatcher, 3)
    }

    #[tokio::test]
    async fn test_queries_per_claim_with_fallback() {
        let llm = MockLlm::with_responder(|request| {
            if request.prompt.contains("Claim: Paris is the capital of France.") {
                Ok(r#"{"queries": ["capital of France", "Paris France capital"]}"#.to_string())
            } else {
                Ok(r#"{"queries": []}"#.to_string())
            }
        });

        let claims = vec![
            "Paris is the capital of France.".to_string(),
            "The moon is cheese.".to_string(),
        ];
        let plan = generator(llm).generate(&claims).await;

        assert_eq!(
            plan.queries.get("Paris is the capital of France.").unwrap(),
            &vec!["capital of France".to_string(), "Paris France capital".to_string()]
        );
        assert_eq!(
            plan.queries.get("The moon is cheese.").unwrap(),
            &vec!["The moon is cheese.".to_string()]
        );
        assert_eq!(plan.fallbacks, 1);
        // One call for the good claim, three rounds for the bad one
        assert_eq!(plan.usage.requests, 4);
        let order: Vec<&str> = plan.queries.keys().collect();
        assert_eq!(order, vec!["Paris is the capital of France.", "The moon is cheese."]);
    }
}
