//! Language model abstraction
//!
//! Provides a unified interface for chat-completion providers:
//! - OpenAI and any OpenAI-compatible endpoint (OpenRouter, vLLM, ...)
//! - Mock (scripted responses for tests and offline runs)
//!
//! Clients only move text. Turning model output into claims, queries or
//! judgments, and validating it, is the pipeline's job.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::OpenAiClient;

use crate::config::LlmConfig;
use crate::errors::{AppError, CallError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// System role sent with every prompt
pub const JSON_SYSTEM_ROLE: &str = "You are a helpful assistant designed to output JSON.";

/// One prompt to complete
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Overrides the configured sampling seed
    pub seed: Option<i64>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Model output for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Usage of this request alone
    pub usage: TokenUsage,
}

/// Accumulated token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn single(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            requests: 1,
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Usage accrued since `earlier`
    pub fn since(&self, earlier: &TokenUsage) -> TokenUsage {
        TokenUsage {
            requests: self.requests.saturating_sub(earlier.requests),
            prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_sub(earlier.completion_tokens),
        }
    }
}

/// Lock-free usage counters shared by concurrent requests
#[derive(Debug, Default)]
pub struct UsageCounter {
    requests: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl UsageCounter {
    pub fn record(&self, usage: &TokenUsage) {
        self.requests.fetch_add(usage.requests, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            requests: self.requests.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
    }
}

/// Trait for chat-completion providers
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete one prompt, returning the raw message content
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<Completion, CallError>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Configured sampling seed
    fn seed(&self) -> i64;

    /// Usage accumulated over the client's lifetime
    fn usage(&self) -> TokenUsage;

    fn reset_usage(&self);
}

/// Create an LLM client based on configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for provider 'openai'".to_string(),
            })?;
            Ok(Arc::new(OpenAiClient::new(api_key, config)?))
        }
        "mock" => Ok(Arc::new(MockLlm::new())),
        other => Err(AppError::Configuration {
            message: format!("unknown llm provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_counter() {
        let counter = UsageCounter::default();
        counter.record(&TokenUsage::single(100, 20));
        counter.record(&TokenUsage::single(50, 5));

        let usage = counter.snapshot();
        assert_eq!(usage.requests, 2);
        assert_eq!(usage.total_tokens(), 175);

        let later = TokenUsage {
            requests: 3,
            prompt_tokens: 160,
            completion_tokens: 30,
        };
        assert_eq!(later.since(&usage).prompt_tokens, 10);

        counter.reset();
        assert_eq!(counter.snapshot(), TokenUsage::default());
    }

    #[test]
    fn test_factory() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(create_llm_client(&config).is_err());

        let config = LlmConfig {
            provider: "mock".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(create_llm_client(&config).unwrap().model_name(), "mock-llm");
    }
}
