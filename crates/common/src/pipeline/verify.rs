//! Claim × evidence → judgments

use super::parse::parse_judgment;
use super::prompts::verify_prompt;
use crate::dispatch::Dispatcher;
use crate::llm::{CompletionRequest, LlmClient, TokenUsage, UsageCounter};
use crate::metrics;
use crate::models::{ClaimEvidence, ClaimVerifications, EvidenceRecord, VerificationRecord, WorkItem};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationRun {
    pub verifications: ClaimVerifications,
    /// Pairs that never produced a valid judgment
    pub unverified: usize,
    pub usage: TokenUsage,
}

pub struct ClaimVerifier {
    llm: Arc<dyn LlmClient>,
    dispatcher: Dispatcher,
    rounds: u32,
}

impl ClaimVerifier {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: Dispatcher, rounds: u32) -> Self {
        Self {
            llm,
            dispatcher,
            rounds,
        }
    }

    /// Judge every (claim, evidence) pair.
    ///
    /// The output has the same claims in the same order as `evidence` and
    /// one record per evidence item. Pairs whose judgment stays invalid after
    /// every round get a placeholder record.
    #[instrument(skip_all, fields(claims = evidence.len()))]
    pub async fn verify(&self, evidence: &ClaimEvidence) -> VerificationRun {
        let usage = Arc::new(UsageCounter::default());
        let items: Vec<WorkItem<EvidenceRecord>> = WorkItem::sequence(
            evidence
                .iter()
                .flat_map(|(claim, records)| records.iter().map(move |r| (claim, r.clone()))),
        );

        let llm = self.llm.clone();
        let counter = usage.clone();
        let mut judgments = self
            .dispatcher
            .dispatch_rounds(items, self.rounds, move |item| {
                let llm = llm.clone();
                let counter = counter.clone();
                let request = CompletionRequest::new(verify_prompt(&item.key, &item.payload));
                async move {
                    let completion = llm.complete(&request).await?;
                    counter.record(&completion.usage);
                    parse_judgment(&completion.content).map(Some)
                }
            })
            .await
            .into_iter();

        let mut unverified = 0;
        let mut verifications = ClaimVerifications::with_capacity(evidence.len());
        for (claim, records) in evidence.iter() {
            let judged = records
                .iter()
                .map(|record| match judgments.next().flatten() {
                    Some(judgment) => VerificationRecord::new(claim, record, judgment),
                    None => {
                        unverified += 1;
                        VerificationRecord::unverified(claim, record)
                    }
                })
                .collect();
            verifications.insert(claim, judged);
        }

        if unverified > 0 {
            warn!(unverified, "Some pairs kept placeholder judgments");
        }
        metrics::record_sentinels("verify", unverified);
        info!(
            pairs = verifications.values().map(Vec::len).sum::<usize>(),
            unverified,
            "Verification complete"
        );

        VerificationRun {
            verifications,
            unverified,
            usage: usage.snapshot(),
        }
    }
}
