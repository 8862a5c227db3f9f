//! Fact-checking pipeline
//!
//! document → claims → queries → evidence → judgments → scores
//!
//! Every model-backed stage shares one LLM gateway, so decomposition, query
//! generation and verification draw from the same rate window. Search and
//! page fetching have their own limits.

mod decompose;
mod factuality;
mod parse;
mod prompts;
mod queries;
mod retrieve;
mod verify;

pub use decompose::{ClaimDecomposer, Decomposition};
pub use factuality::{summarize, summarize_claim, ClaimSummary, ClaimVerdict, DocumentSummary, Tally};
pub use parse::{parse_claims, parse_judgment, parse_queries, split_sentences, strip_code_fences};
pub use queries::{QueryGenerator, QueryPlan};
pub use retrieve::EvidenceRetriever;
pub use verify::{ClaimVerifier, VerificationRun};

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::errors::Result;
use crate::evidence::{PageFetcher, ReqwestPageFetcher, SnippetExtender};
use crate::gateway::CallGateway;
use crate::llm::{create_llm_client, LlmClient, TokenUsage};
use crate::metrics::StageTimer;
use crate::models::{ClaimEvidence, ClaimQueries, EvidenceRecord, VerificationRecord};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::search::{create_search_transport, SearchTransport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Token usage per model-backed stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageUsage {
    pub decompose: TokenUsage,
    pub queries: TokenUsage,
    pub verify: TokenUsage,
}

impl StageUsage {
    pub fn total(&self) -> TokenUsage {
        [self.decompose, self.queries, self.verify]
            .iter()
            .fold(TokenUsage::default(), |acc, u| TokenUsage {
                requests: acc.requests + u.requests,
                prompt_tokens: acc.prompt_tokens + u.prompt_tokens,
                completion_tokens: acc.completion_tokens + u.completion_tokens,
            })
    }
}

/// Wall-clock seconds per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub decompose: f64,
    pub queries: f64,
    pub retrieve: f64,
    pub verify: f64,
}

impl StageTiming {
    pub fn total(&self) -> f64 {
        self.decompose + self.queries + self.retrieve + self.verify
    }
}

/// Everything known about one claim after a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimReport {
    #[serde(flatten)]
    pub summary: ClaimSummary,
    pub queries: Vec<String>,
    pub evidences: Vec<VerificationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub search_provider: String,
    /// Claims came from sentence splitting rather than the model
    pub decomposition_fallback: bool,
    pub summary: DocumentSummary,
    pub claims: Vec<ClaimReport>,
    pub usage: StageUsage,
    pub timing: StageTiming,
}

/// The assembled pipeline
pub struct FactChecker {
    llm: Arc<dyn LlmClient>,
    decomposer: ClaimDecomposer,
    query_generator: QueryGenerator,
    retriever: EvidenceRetriever,
    verifier: ClaimVerifier,
}

impl FactChecker {
    /// Build the providers named in `config`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = create_llm_client(&config.llm)?;
        let search = create_search_transport(&config.search)?;
        let fetcher = ReqwestPageFetcher::new(Duration::from_secs(config.evidence.fetch_timeout_secs))?;
        Ok(Self::new(config, llm, search, Arc::new(fetcher)))
    }

    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchTransport>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let policy = RetryPolicy::network(&config.retry);
        let rounds = config.retry.shape_attempts;

        let llm_gateway = Arc::new(CallGateway::new("llm", &config.llm.rate_limit));
        let llm_executor = RetryExecutor::new("llm", policy);
        let llm_dispatcher = Dispatcher::new(config.dispatch.clone(), llm_gateway.clone(), llm_executor.clone());

        let search_gateway = Arc::new(CallGateway::new("search", &config.search.rate_limit));
        let search_dispatcher = Dispatcher::new(
            config.dispatch.clone(),
            search_gateway,
            RetryExecutor::new("search", policy),
        );

        info!(
            model = llm.model_name(),
            search = search.name(),
            "Fact-checking pipeline assembled"
        );

        Self {
            decomposer: ClaimDecomposer::new(llm.clone(), llm_gateway, llm_executor, rounds),
            query_generator: QueryGenerator::new(llm.clone(), llm_dispatcher.clone(), rounds),
            retriever: EvidenceRetriever::new(
                search,
                search_dispatcher,
                SnippetExtender::new(fetcher, config.evidence.clone()),
                config.search.clone(),
            ),
            verifier: ClaimVerifier::new(llm.clone(), llm_dispatcher, rounds),
            llm,
        }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn search_provider(&self) -> &str {
        self.retriever.provider()
    }

    /// Usage of the LLM client across every check so far
    pub fn lifetime_usage(&self) -> TokenUsage {
        self.llm.usage()
    }

    pub async fn decompose(&self, document: &str) -> Decomposition {
        self.decomposer.decompose(document).await
    }

    pub async fn generate_queries(&self, claims: &[String]) -> QueryPlan {
        self.query_generator.generate(claims).await
    }

    pub async fn retrieve(&self, queries: &ClaimQueries) -> Result<ClaimEvidence> {
        self.retriever.retrieve(queries).await
    }

    pub async fn verify(&self, evidence: &ClaimEvidence) -> VerificationRun {
        self.verifier.verify(evidence).await
    }

    pub async fn search(&self, query: &str) -> Vec<EvidenceRecord> {
        self.retriever.search_one(query).await
    }

    /// Run the whole pipeline over one document
    #[instrument(skip_all, fields(chars = document.len()))]
    pub async fn check(&self, document: &str) -> Result<CheckReport> {
        let mut timing = StageTiming::default();
        let mut usage = StageUsage::default();

        let timer = StageTimer::start("decompose");
        let decomposition = self.decompose(document).await;
        timing.decompose = timer.finish();
        usage.decompose = decomposition.usage;

        let timer = StageTimer::start("queries");
        let plan = self.generate_queries(&decomposition.claims).await;
        timing.queries = timer.finish();
        usage.queries = plan.usage;

        let timer = StageTimer::start("retrieve");
        let evidence = self.retrieve(&plan.queries).await?;
        timing.retrieve = timer.finish();

        let timer = StageTimer::start("verify");
        let run = self.verify(&evidence).await;
        timing.verify = timer.finish();
        usage.verify = run.usage;

        let (summaries, summary) = summarize(&run.verifications);
        let mut queries = plan.queries;
        let claims = summaries
            .into_iter()
            .zip(run.verifications)
            .map(|(claim_summary, (claim, evidences))| ClaimReport {
                queries: queries.get_mut(&claim).map(std::mem::take).unwrap_or_default(),
                summary: claim_summary,
                evidences,
            })
            .collect();

        info!(
            claims = summary.num_claims,
            evidences = summary.num_evidences,
            factuality = ?summary.factuality,
            seconds = timing.total(),
            tokens = usage.total().total_tokens(),
            "Check complete"
        );

        Ok(CheckReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: self.model_name().to_string(),
            search_provider: self.search_provider().to_string(),
            decomposition_fallback: decomposition.fallback,
            summary,
            claims,
            usage,
            timing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_usage_total() {
        let usage = StageUsage {
            decompose: TokenUsage::single(10, 2),
            queries: TokenUsage::single(5, 1),
            verify: TokenUsage {
                requests: 3,
                prompt_tokens: 30,
                completion_tokens: 6,
            },
        };
        let total = usage.total();
        assert_eq!(total.requests, 5);
        assert_eq!(total.total_tokens(), 54);
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        config.search.provider = "bing".to_string();
        assert!(FactChecker::from_config(&config).is_err());
    }
}
