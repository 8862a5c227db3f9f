//! Whole-pipeline checks with in-memory providers

use async_trait::async_trait;
use claimcheck_common::errors::CallError;
use claimcheck_common::evidence::PageFetcher;
use claimcheck_common::llm::MockLlm;
use claimcheck_common::models::EvidenceOrigin;
use claimcheck_common::pipeline::ClaimVerdict;
use claimcheck_common::search::{SearchHit, SearchRequest, SearchResponse};
use claimcheck_common::{AppConfig, ClaimQueries, FactChecker, Relationship, SearchTransport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CLAIM: &str = "Paris is the capital of France";

/// Returns `raw` hits for every query and counts calls
struct FakeSearch {
    raw: usize,
    calls: AtomicUsize,
}

impl FakeSearch {
    fn new(raw: usize) -> Self {
        Self {
            raw,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchTransport for FakeSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let snippets = [
            "Paris is the capital and most populous city of France",
            "France is a country in Western Europe",
            "Lyon was briefly the capital of Gaul",
            "The Seine flows through Paris",
            "Marseille is a port city",
        ];
        let hits = (0..self.raw)
            .map(|i| SearchHit {
                url: format!("https://pages.example/{}", i),
                title: format!("Result {}", i),
                snippet: snippets[i % snippets.len()].to_string(),
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
        "fake"
    }
}

/// Serves a page embedding the first snippet, 404 for the rest
struct FakePages;

#[async_trait]
impl PageFetcher for FakePages {
    async fn fetch(&self, url: &str) -> Result<String, CallError> {
        if url.ends_with("/0") {
            Ok("<html><body><p>Paris is the capital and most populous city of France, \
                with an estimated population of 2,102,650 residents.</p></body></html>"
                .to_string())
        } else {
            Err(CallError::fatal("HTTP 404"))
        }
    }
}

fn scripted_llm() -> MockLlm {
    MockLlm::with_responder(|request| {
        let prompt = &request.prompt;
        if prompt.contains("atomic claims") {
            Ok(format!(r#"{{"claims": ["{}"]}}"#, CLAIM))
        } else if prompt.contains("search engine queries") {
            Ok(r#"{"queries": ["capital of France"]}"#.to_string())
        } else if prompt.contains("Evidence: Paris is the capital") {
            Ok(r#"{"reasoning": "The evidence states it.", "relationship": "SUPPORTS"}"#.to_string())
        } else if prompt.contains("Evidence: Lyon") {
            // Not valid JSON; the pair still gets a judgment
            Ok("REFUTES?".to_string())
        } else {
            Ok(r#"{"reasoning": "Unrelated.", "relationship": "IRRELEVANT"}"#.to_string())
        }
    })
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

#[tokio::test]
async fn test_single_claim_end_to_end() {
    let search = Arc::new(FakeSearch::new(3));
    let checker = FactChecker::new(&config(), Arc::new(scripted_llm()), search.clone(), Arc::new(FakePages));

    let report = tokio_test::assert_ok!(checker.check(CLAIM).await);

    assert!(!report.decomposition_fallback);
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.claims.len(), 1);

    let claim = &report.claims[0];
    assert_eq!(claim.summary.claim, CLAIM);
    assert_eq!(claim.queries, vec!["capital of France".to_string()]);
    assert!(!claim.evidences.is_empty());
    assert!(claim.evidences.len() <= config().search.top_k);

    for record in &claim.evidences {
        assert_eq!(record.claim, CLAIM);
        assert!(matches!(
            record.relationship,
            Relationship::Supports | Relationship::Refutes | Relationship::Irrelevant
        ));
    }
    assert_eq!(claim.evidences[0].relationship, Relationship::Supports);
    assert!(claim.evidences[0].text.contains("2,102,650"));
    assert!(claim.evidences[2].text.starts_with("Lyon"));
    assert!(claim.evidences[2].reasoning.starts_with("[System Warning]"));

    assert_eq!(claim.summary.verdict, ClaimVerdict::Supported);
    assert_eq!(report.summary.factuality, Some(1.0));
    assert_eq!(report.summary.num_evidences, 3);
    // 1 decomposition + 1 query generation + 2 valid judgments + 3 rounds for the invalid one
    assert_eq!(report.usage.total().requests, 7);
}

#[tokio::test]
async fn test_top_k_caps_evidence_per_query() {
    let checker = FactChecker::new(
        &config(),
        Arc::new(scripted_llm()),
        Arc::new(FakeSearch::new(5)),
        Arc::new(FakePages),
    );

    let queries: ClaimQueries = [(CLAIM, vec!["capital of France".to_string()])].into_iter().collect();
    let evidence = tokio_test::assert_ok!(checker.retrieve(&queries).await);

    let records = evidence.get(CLAIM).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].origin, EvidenceOrigin::Extended);
    assert_eq!(records[1].origin, EvidenceOrigin::Snippet);
}

#[tokio::test]
async fn test_model_outage_still_judges_every_pair() {
    let llm = MockLlm::with_responder(|_| Err(CallError::fatal("HTTP 400: bad request")));
    let checker = FactChecker::new(&config(), Arc::new(llm), Arc::new(FakeSearch::new(3)), Arc::new(FakePages));

    let report = checker
        .check("Paris is the capital of France. The Seine flows through Paris.")
        .await
        .unwrap();

    assert!(report.decomposition_fallback);
    assert_eq!(report.claims.len(), 2);
    for claim in &report.claims {
        // Each claim is searched as its own query
        assert_eq!(claim.queries, vec![claim.summary.claim.clone()]);
        assert_eq!(claim.evidences.len(), 3);
        assert!(claim
            .evidences
            .iter()
            .all(|r| r.relationship == Relationship::Irrelevant && r.is_unverified()));
        assert_eq!(claim.summary.verdict, ClaimVerdict::Unverifiable);
    }
    assert_eq!(report.summary.factuality, None);
}
