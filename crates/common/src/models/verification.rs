use super::EvidenceRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reasoning attached to a pair the model never judged successfully
pub const UNVERIFIED_REASONING: &str =
    "[System Warning] Can not identify the factuality of the claim.";

/// Relationship between a claim and one evidence record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Supports,
    Refutes,
    Irrelevant,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Supports => "SUPPORTS",
            Relationship::Refutes => "REFUTES",
            Relationship::Irrelevant => "IRRELEVANT",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUPPORTS" | "SUPPORT" | "SUPPORTED" => Ok(Relationship::Supports),
            "REFUTES" | "REFUTE" | "REFUTED" => Ok(Relationship::Refutes),
            "IRRELEVANT" => Ok(Relationship::Irrelevant),
            other => Err(format!("unknown relationship '{}'", other)),
        }
    }
}

/// Validated model judgment for one (claim, evidence) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Judgment {
    pub reasoning: String,
    pub relationship: Relationship,
}

/// Final verification row for one (claim, evidence) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationRecord {
    pub claim: String,
    pub text: String,
    pub url: String,
    pub reasoning: String,
    pub relationship: Relationship,
}

impl VerificationRecord {
    pub fn new(claim: &str, evidence: &EvidenceRecord, judgment: Judgment) -> Self {
        Self {
            claim: claim.to_string(),
            text: evidence.text.clone(),
            url: evidence.url.clone(),
            reasoning: judgment.reasoning,
            relationship: judgment.relationship,
        }
    }

    /// Stand-in for a pair whose judgment could not be obtained
    pub fn unverified(claim: &str, evidence: &EvidenceRecord) -> Self {
        Self::new(
            claim,
            evidence,
            Judgment {
                reasoning: UNVERIFIED_REASONING.to_string(),
                relationship: Relationship::Irrelevant,
            },
        )
    }

    pub fn is_unverified(&self) -> bool {
        self.relationship == Relationship::Irrelevant && self.reasoning == UNVERIFIED_REASONING
    }
}
