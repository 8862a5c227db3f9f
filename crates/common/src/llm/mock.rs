use super::{Completion, CompletionRequest, LlmClient, TokenUsage, UsageCounter};
use crate::errors::CallError;
use async_trait::async_trait;
use std::sync::Arc;

type Responder = dyn Fn(&CompletionRequest) -> Result<String, CallError> + Send + Sync;

/// Mock LLM for testing
///
/// Without a responder it answers `{}` to everything except verification
/// prompts, which get an IRRELEVANT judgment. That sends decomposition and
/// query generation down their fallback paths, so the whole pipeline can
/// run offline.
pub struct MockLlm {
    responder: Arc<Responder>,
    usage: UsageCounter,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::with_responder(|request| {
            if request.prompt.contains("\"relationship\"") {
                Ok(r#"{"reasoning": "Mock model cannot judge evidence.", "relationship": "IRRELEVANT"}"#.to_string())
            } else {
                Ok("{}".to_string())
            }
        })
    }

    /// Answer each request with `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, CallError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            usage: UsageCounter::default(),
        }
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CallError> {
        let content = (self.responder)(request)?;
        // Rough 4-chars-per-token estimate
        let usage = TokenUsage::single((request.prompt.len() / 4) as u64, (content.len() / 4) as u64);
        self.usage.record(&usage);
        Ok(Completion { content, usage })
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }

    fn seed(&self) -> i64 {
        42
    }

    fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    fn reset_usage(&self) {
        self.usage.reset()
    }
}
