//! OpenAI-compatible chat completions client

use super::{Completion, CompletionRequest, LlmClient, TokenUsage, UsageCounter, JSON_SYSTEM_ROLE};
use crate::config::LlmConfig;
use crate::errors::{AppError, CallError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    seed: i64,
    usage: UsageCounter,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    seed: i64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiClient {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AppError::from)?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            seed: config.seed,
            usage: UsageCounter::default(),
        })
    }
}

/// Message content of the first choice
fn extract_content(response: ChatResponse) -> std::result::Result<(String, Option<Usage>), CallError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CallError::shape("completion has no message content"))?;
    Ok((content, response.usage))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<Completion, CallError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: JSON_SYSTEM_ROLE,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            seed: request.seed.unwrap_or(self.seed),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status, &text));
        }

        let text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| CallError::shape(format!("completion response: {}", e)))?;
        let (content, usage) = extract_content(parsed)?;

        let usage = match usage {
            Some(usage) => TokenUsage::single(usage.prompt_tokens, usage.completion_tokens),
            None => {
                debug!("Completion response carried no usage");
                TokenUsage::single(0, 0)
            }
        };
        self.usage.record(&usage);

        Ok(Completion { content, usage })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn seed(&self) -> i64 {
        self.seed
    }

    fn usage(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    fn reset_usage(&self) {
        self.usage.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{\"claims\": []}"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}}"#,
        )
        .unwrap();
        let (content, usage) = extract_content(response).unwrap();
        assert_eq!(content, r#"{"claims": []}"#);
        assert_eq!(usage.unwrap().prompt_tokens, 12);
    }

    #[test]
    fn test_missing_choices_is_shape_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = extract_content(response).err().unwrap();
        assert_eq!(err.class(), crate::errors::ErrorClass::ResponseShapeInvalid);
    }

    #[test]
    fn test_request_body() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: JSON_SYSTEM_ROLE,
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            seed: 42,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["seed"], 42);
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["messages"][0]["role"], "system");
    }
}
