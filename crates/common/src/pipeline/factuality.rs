//! Judgments → scores

use crate::models::{ClaimVerifications, Relationship, VerificationRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimVerdict {
    /// Only supporting evidence
    Supported,
    /// Only refuting evidence
    Refuted,
    /// Both
    Controversial,
    /// No relevant evidence
    Unverifiable,
}

impl ClaimVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimVerdict::Supported => "supported",
            ClaimVerdict::Refuted => "refuted",
            ClaimVerdict::Controversial => "controversial",
            ClaimVerdict::Unverifiable => "unverifiable",
        }
    }
}

/// Relationship counts over a set of judgments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub supports: usize,
    pub refutes: usize,
    pub irrelevant: usize,
}

impl Tally {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a VerificationRecord>) -> Self {
        let mut tally = Tally::default();
        for record in records {
            match record.relationship {
                Relationship::Supports => tally.supports += 1,
                Relationship::Refutes => tally.refutes += 1,
                Relationship::Irrelevant => tally.irrelevant += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.supports + self.refutes + self.irrelevant
    }

    /// supports / (supports + refutes), `None` without relevant evidence
    pub fn factuality(&self) -> Option<f64> {
        let relevant = self.supports + self.refutes;
        (relevant > 0).then(|| self.supports as f64 / relevant as f64)
    }

    pub fn verdict(&self) -> ClaimVerdict {
        match (self.supports > 0, self.refutes > 0) {
            (true, false) => ClaimVerdict::Supported,
            (false, true) => ClaimVerdict::Refuted,
            (true, true) => ClaimVerdict::Controversial,
            (false, false) => ClaimVerdict::Unverifiable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub claim: String,
    pub num_evidences: usize,
    #[serde(flatten)]
    pub tally: Tally,
    pub factuality: Option<f64>,
    pub verdict: ClaimVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub num_claims: usize,
    pub num_evidences: usize,
    #[serde(flatten)]
    pub tally: Tally,
    /// Mean claim factuality over claims that have relevant evidence
    pub factuality: Option<f64>,
}

pub fn summarize_claim(claim: &str, records: &[VerificationRecord]) -> ClaimSummary {
    let tally = Tally::of(records);
    ClaimSummary {
        claim: claim.to_string(),
        num_evidences: records.len(),
        tally,
        factuality: tally.factuality(),
        verdict: tally.verdict(),
    }
}

/// Per-claim summaries in claim order, plus the document roll-up
pub fn summarize(verifications: &ClaimVerifications) -> (Vec<ClaimSummary>, DocumentSummary) {
    let claims: Vec<ClaimSummary> = verifications
        .iter()
        .map(|(claim, records)| summarize_claim(claim, records))
        .collect();

    let scores: Vec<f64> = claims.iter().filter_map(|c| c.factuality).collect();
    let factuality = (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

    let document = DocumentSummary {
        num_claims: claims.len(),
        num_evidences: claims.iter().map(|c| c.num_evidences).sum(),
        tally: Tally::of(verifications.values().flatten()),
        factuality,
    };
    (claims, document)
}
