//! Health check handlers

use crate::AppState;
use axum::{extract::State, Json};
use claimcheck_common::llm::TokenUsage;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub model: String,
    pub search_provider: String,
    /// LLM usage since startup
    pub usage: TokenUsage,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: claimcheck_common::VERSION.to_string(),
    })
}

/// Readiness probe - the pipeline is assembled once at startup, so being
/// able to answer means its providers were configured
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready".to_string(),
        model: state.checker.model_name().to_string(),
        search_provider: state.checker.search_provider().to_string(),
        usage: state.checker.lifetime_usage(),
    })
}
