//! Fact-checking handlers

use crate::AppState;
use axum::{extract::State, Json};
use claimcheck_common::{
    errors::{AppError, Result},
    models::{ClaimEvidence, ClaimQueries, ClaimVerifications},
    pipeline::{summarize, CheckReport, ClaimSummary, DocumentSummary},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

/// Maximum claims accepted by the stage endpoints
const MAX_CLAIMS: usize = 50;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckRequest {
    #[validate(length(min = 1))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EvidenceRequest {
    #[validate(length(min = 1, max = 50))]
    pub claims: Vec<String>,

    /// Skip query generation and search these instead
    #[serde(default)]
    pub queries: Option<ClaimQueries>,
}

#[derive(Serialize)]
pub struct EvidenceResponse {
    pub queries: ClaimQueries,
    pub evidence: ClaimEvidence,
    pub processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub evidence: ClaimEvidence,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub verifications: ClaimVerifications,
    pub claims: Vec<ClaimSummary>,
    pub summary: DocumentSummary,
    pub processing_time_ms: u64,
}

fn validate<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|f| f.to_string()),
    })
}

/// Run the full pipeline over a document
pub async fn check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckReport>> {
    validate(&request)?;

    let size = request.text.chars().count();
    let limit = state.config.server.max_document_chars;
    if size > limit {
        return Err(AppError::PayloadTooLarge { size, limit });
    }
    if request.text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "text must not be blank".to_string(),
            field: Some("text".to_string()),
        });
    }

    let report = state.checker.check(&request.text).await?;

    tracing::info!(
        report_id = %report.id,
        claims = report.summary.num_claims,
        factuality = ?report.summary.factuality,
        "Check served"
    );
    Ok(Json(report))
}

/// Queries and evidence for a list of claims
pub async fn evidence(
    State(state): State<AppState>,
    Json(request): Json<EvidenceRequest>,
) -> Result<Json<EvidenceResponse>> {
    let start = Instant::now();
    validate(&request)?;

    let queries = match request.queries {
        Some(queries) => {
            if queries.len() > MAX_CLAIMS {
                return Err(AppError::Validation {
                    message: format!("Maximum {} claims per request", MAX_CLAIMS),
                    field: Some("queries".to_string()),
                });
            }
            queries
        }
        None => state.checker.generate_queries(&request.claims).await.queries,
    };

    let evidence = state.checker.retrieve(&queries).await?;

    Ok(Json(EvidenceResponse {
        queries,
        evidence,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Judge supplied evidence against its claims
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let start = Instant::now();

    if request.evidence.is_empty() || request.evidence.len() > MAX_CLAIMS {
        return Err(AppError::Validation {
            message: format!("Between 1 and {} claims required", MAX_CLAIMS),
            field: Some("evidence".to_string()),
        });
    }

    let run = state.checker.verify(&request.evidence).await;
    let (claims, summary) = summarize(&run.verifications);

    Ok(Json(VerifyResponse {
        verifications: run.verifications,
        claims,
        summary,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
