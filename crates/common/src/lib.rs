//! claimcheck Common Library
//!
//! Core of the claimcheck fact-checking pipeline, shared by the HTTP server
//! and the CLI:
//! - Rate-limited call gateway and retry/backoff executor
//! - Fan-out dispatcher with sentinel results
//! - Evidence aggregation and snippet extension
//! - Search and LLM client abstractions
//! - Error types, configuration, metrics

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod evidence;
pub mod gateway;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod search;

// Re-export commonly used types
pub use config::AppConfig;
pub use dispatch::{DispatchOutcome, Dispatcher, PartialBatchFailure};
pub use errors::{AppError, CallError, ErrorClass, Result};
pub use gateway::CallGateway;
pub use llm::LlmClient;
pub use models::{ClaimEvidence, ClaimMap, ClaimQueries, EvidenceRecord, Relationship, VerificationRecord, WorkItem};
pub use pipeline::{CheckReport, FactChecker};
pub use retry::{RetryExecutor, RetryPolicy};
pub use search::SearchTransport;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
