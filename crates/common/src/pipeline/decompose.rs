//! Document → claims

use super::parse::{parse_claims, split_sentences};
use super::prompts::decompose_prompt;
use crate::gateway::CallGateway;
use crate::llm::{CompletionRequest, LlmClient, TokenUsage, UsageCounter};
use crate::retry::RetryExecutor;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decomposition {
    pub claims: Vec<String>,
    /// Claims came from the sentence splitter, not the model
    pub fallback: bool,
    pub usage: TokenUsage,
}

pub struct ClaimDecomposer {
    llm: Arc<dyn LlmClient>,
    gateway: Arc<CallGateway>,
    executor: RetryExecutor,
    attempts: u32,
}

impl ClaimDecomposer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<CallGateway>,
        executor: RetryExecutor,
        attempts: u32,
    ) -> Self {
        Self {
            llm,
            gateway,
            executor,
            attempts: attempts.max(1),
        }
    }

    /// Ask the model for claims, changing the seed on each attempt; fall back
    /// to sentence splitting when no attempt yields a valid list.
    #[instrument(skip(self, document), fields(chars = document.len()))]
    pub async fn decompose(&self, document: &str) -> Decomposition {
        let usage = UsageCounter::default();
        let prompt = decompose_prompt(document);

        for attempt in 0..self.attempts {
            let request = CompletionRequest::new(prompt.clone()).with_seed(self.llm.seed() + i64::from(attempt));
            let llm = &self.llm;
            let gateway = &self.gateway;
            let request = &request;

            let completion = self
                .executor
                .try_execute(move || gateway.submit(1, move || llm.complete(request)))
                .await;

            let completion = match completion {
                Ok(completion) => completion,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Decomposition call failed");
                    continue;
                }
            };
            usage.record(&completion.usage);

            match parse_claims(&completion.content) {
                Ok(claims) => {
                    info!(claims = claims.len(), attempt = attempt + 1, "Document decomposed");
                    return Decomposition {
                        claims,
                        fallback: false,
                        usage: usage.snapshot(),
                    };
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Unusable decomposition response");
                }
            }
        }

        let claims = split_sentences(document);
        warn!(claims = claims.len(), "Falling back to sentence splitting");
        Decomposition {
            claims,
            fallback: true,
            usage: usage.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, RetryConfig};
    use crate::errors::CallError;
    use crate::llm::MockLlm;
    use crate::retry::RetryPolicy;
    use std::sync::Mutex;

    fn decomposer(llm: MockLlm) -> ClaimDecomposer {
        ClaimDecomposer::new(
            Arc::new(llm),
            Arc::new(CallGateway::new("llm", &RateLimitConfig::default())),
            RetryExecutor::new("llm", RetryPolicy::network(&RetryConfig::default())),
            3,
        )
    }

    #[tokio::test]
    async fn test_valid_claims_on_second_attempt_with_next_seed() {
        let seeds = Arc::new(Mutex::new(Vec::new()));
        let seen = seeds.clone();
        let llm = MockLlm::with_responder(move |request| {
            let mut seen = seen.lock().unwrap();
            seen.push(request.seed);
            if seen.len() == 1 {
                Ok("not json".to_string())
            } else {
                Ok(r#"{"claims": ["Paris is the capital of France."]}"#.to_string())
            }
        });

        let result = decomposer(llm).decompose("Paris is the capital of France.").await;

        assert!(!result.fallback);
        assert_eq!(result.claims, vec!["Paris is the capital of France."]);
        assert_eq!(*seeds.lock().unwrap(), vec![Some(42), Some(43)]);
        assert_eq!(result.usage.requests, 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_sentences() {
        let llm = MockLlm::with_responder(|_| Ok(r#"{"claims": []}"#.to_string()));
        let result = decomposer(llm)
            .decompose("Paris is the capital of France. Berlin is in Germany.")
            .await;

        assert!(result.fallback);
        assert_eq!(
            result.claims,
            vec!["Paris is the capital of France.", "Berlin is in Germany."]
        );
        assert_eq!(result.usage.requests, 3);
    }

    #[tokio::test]
    async fn test_call_failures_also_fall_back() {
        let llm = MockLlm::with_responder(|_| Err(CallError::fatal("HTTP 400")));
        let result = decomposer(llm).decompose("One sentence here.").await;
        assert!(result.fallback);
        assert_eq!(result.claims, vec!["One sentence here."]);
    }
}
