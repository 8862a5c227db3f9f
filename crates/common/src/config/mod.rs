//! Configuration management for claimcheck
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.yaml, config.toml, config.json)
//! - Default values

use crate::retry::AuthStrategy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// LLM endpoint used for decomposition, query generation and verification
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search provider
    #[serde(default)]
    pub search: SearchConfig,

    /// Retry policy for downstream calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Fan-out dispatcher settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Evidence post-processing
    #[serde(default)]
    pub evidence: EvidenceConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Sliding-window limit plus in-flight bound for one downstream service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Maximum simultaneous in-flight calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Sleep between admission checks while the window is full
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for the window after this long (unbounded if unset)
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai (any OpenAI-compatible endpoint), mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling seed sent with every request
    #[serde(default = "default_seed")]
    pub seed: i64,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_rate_limit")]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Provider: cloudsway, serper, mock
    #[serde(default = "default_search_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    /// Endpoint override (provider default when unset)
    pub base_url: Option<String>,

    /// Evidence records kept per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Results requested from the provider per query
    #[serde(default = "default_result_count")]
    pub result_count: usize,

    /// Restrict searches to these domains
    #[serde(default)]
    pub sites: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Credential injection methods, tried in order on 401/403
    #[serde(default = "default_auth_strategies")]
    pub auth_strategies: Vec<AuthStrategy>,

    #[serde(default = "default_search_rate_limit")]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts for network calls (initial + retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Rounds of re-submission for model output that fails validation
    #[serde(default = "default_shape_attempts")]
    pub shape_attempts: u32,
}

/// How a batch of work items is executed
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Lightweight tasks multiplexed on the async runtime
    Cooperative,
    /// Fixed pool of blocking worker threads
    WorkerPool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Maximum items per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_strategy")]
    pub strategy: DispatchStrategy,

    /// Threads in the worker pool (0 = available parallelism)
    #[serde(default)]
    pub worker_threads: usize,

    /// Switch to the worker pool when a cooperative batch fails as a whole
    #[serde(default = "default_enabled")]
    pub fallback_to_pool: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvidenceConfig {
    /// Replace short snippets with context fetched from the source page
    #[serde(default = "default_enabled")]
    pub snippet_extend: bool,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub pre_context_chars: usize,

    #[serde(default = "default_post_context")]
    pub post_context_chars: usize,

    #[serde(default = "default_marker")]
    pub truncation_marker: String,

    /// Concurrent page fetches (0 = available parallelism)
    #[serde(default)]
    pub extend_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Requests per second accepted by the API
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Largest document accepted by /v1/check
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_max_requests_per_window() -> u32 { 300 }
fn default_window_secs() -> u64 { 60 }
fn default_max_concurrency() -> usize { 50 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_seed() -> i64 { 42 }
fn default_llm_timeout() -> u64 { 15 }
fn default_llm_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        max_requests_per_window: 300,
        window_secs: 60,
        max_concurrency: 50,
        poll_interval_ms: default_poll_interval_ms(),
        max_wait_secs: None,
    }
}
fn default_search_provider() -> String { "cloudsway".to_string() }
fn default_top_k() -> usize { 3 }
fn default_result_count() -> usize { 3 }
fn default_search_timeout() -> u64 { 15 }
fn default_auth_strategies() -> Vec<AuthStrategy> {
    vec![
        AuthStrategy::Bearer,
        AuthStrategy::Header { name: "X-API-KEY".to_string() },
        AuthStrategy::Header { name: "API-Key".to_string() },
        AuthStrategy::Header { name: "apikey".to_string() },
        AuthStrategy::QueryParam { name: "api_key".to_string() },
    ]
}
fn default_search_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        max_requests_per_window: 600,
        window_secs: 60,
        max_concurrency: 56,
        poll_interval_ms: default_poll_interval_ms(),
        max_wait_secs: None,
    }
}
fn default_max_attempts() -> u32 { 4 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 10_000 }
fn default_shape_attempts() -> u32 { 3 }
fn default_batch_size() -> usize { 100 }
fn default_strategy() -> DispatchStrategy { DispatchStrategy::Cooperative }
fn default_enabled() -> bool { true }
fn default_fetch_timeout() -> u64 { 10 }
fn default_post_context() -> usize { 500 }
fn default_marker() -> String { " ...".to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 300 }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 10 }
fn default_max_document_chars() -> usize { 20_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: default_max_requests_per_window(),
            window_secs: default_window_secs(),
            max_concurrency: default_max_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            seed: default_seed(),
            timeout_secs: default_llm_timeout(),
            rate_limit: default_llm_rate_limit(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            base_url: None,
            top_k: default_top_k(),
            result_count: default_result_count(),
            sites: Vec::new(),
            timeout_secs: default_search_timeout(),
            auth_strategies: default_auth_strategies(),
            rate_limit: default_search_rate_limit(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            shape_attempts: default_shape_attempts(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            strategy: default_strategy(),
            worker_threads: 0,
            fallback_to_pool: default_enabled(),
        }
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            snippet_extend: default_enabled(),
            fetch_timeout_secs: default_fetch_timeout(),
            pre_context_chars: 0,
            post_context_chars: default_post_context(),
            truncation_marker: default_marker(),
            extend_concurrency: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            max_document_chars: default_max_document_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            retry: RetryConfig::default(),
            dispatch: DispatchConfig::default(),
            evidence: EvidenceConfig::default(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl EvidenceConfig {
    /// Resolve `extend_concurrency`, falling back to the machine's parallelism
    pub fn effective_concurrency(&self) -> usize {
        if self.extend_concurrency > 0 {
            self.extend_concurrency
        } else {
            available_parallelism()
        }
    }
}

impl DispatchConfig {
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            available_parallelism()
        }
    }
}

pub(crate) fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SEARCH__TOP_K=5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific YAML/TOML/JSON file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get server request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
