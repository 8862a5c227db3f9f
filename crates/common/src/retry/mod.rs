//! Retry/backoff executor and credential fallback
//!
//! `RetryExecutor` re-runs an operation on `RateLimited` and `Transient`
//! failures with capped exponential backoff (`backoff` crate, no jitter).
//! `AuthStrategy` lists the ways an API key can be attached to a request;
//! `AuthChain` walks them in order when a provider answers 401/403.

use crate::config::RetryConfig;
use crate::errors::{CallError, ErrorClass};
use crate::metrics;
use crate::models::Sentinel;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// One way of attaching an API key to an outgoing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthStrategy {
    /// No credentials
    None,
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Custom header carrying the raw key
    Header { name: String },
    /// Query string parameter carrying the raw key
    QueryParam { name: String },
}

impl AuthStrategy {
    pub fn apply(&self, request: reqwest::RequestBuilder, key: &str) -> reqwest::RequestBuilder {
        match self {
            AuthStrategy::None => request,
            AuthStrategy::Bearer => request.bearer_auth(key),
            AuthStrategy::Header { name } => request.header(name.as_str(), key),
            AuthStrategy::QueryParam { name } => request.query(&[(name.as_str(), key)]),
        }
    }

    pub fn label(&self) -> String {
        match self {
            AuthStrategy::None => "none".to_string(),
            AuthStrategy::Bearer => "bearer".to_string(),
            AuthStrategy::Header { name } => format!("header:{}", name),
            AuthStrategy::QueryParam { name } => format!("query:{}", name),
        }
    }
}

/// Ordered credential strategies for one provider.
///
/// Each request starts with the strategy that last succeeded and moves down
/// the list on `AuthFailure`. Any other outcome ends the walk.
#[derive(Debug)]
pub struct AuthChain {
    strategies: Vec<AuthStrategy>,
    preferred: AtomicUsize,
}

impl AuthChain {
    pub fn new(strategies: Vec<AuthStrategy>) -> Self {
        let strategies = if strategies.is_empty() {
            vec![AuthStrategy::None]
        } else {
            strategies
        };
        Self {
            strategies,
            preferred: AtomicUsize::new(0),
        }
    }

    pub fn strategies(&self) -> &[AuthStrategy] {
        &self.strategies
    }

    /// Run `op` with each strategy until one is not rejected.
    ///
    /// Returns the last `AuthFailure` if every strategy is rejected.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, CallError>
    where
        F: FnMut(&AuthStrategy) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let count = self.strategies.len();
        let start = self.preferred.load(Ordering::Relaxed) % count;
        let mut last_error = None;

        for offset in 0..count {
            let idx = (start + offset) % count;
            let strategy = &self.strategies[idx];
            match op(strategy).await {
                Err(e) if e.class() == ErrorClass::AuthFailure => {
                    debug!(strategy = %strategy.label(), error = %e, "Credentials rejected, trying next method");
                    last_error = Some(e);
                }
                other => {
                    if other.is_ok() && idx != start {
                        self.preferred.store(idx, Ordering::Relaxed);
                    }
                    return other;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CallError::fatal("no auth strategy configured")))
    }
}

/// Attempt budget and delay schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for network calls
    pub fn network(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Policy for re-asking a model whose output failed validation
    pub fn response_shape(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.shape_attempts.max(1),
            ..Self::network(config)
        }
    }

    /// Delays follow `min(base * 2^n, cap)` for retry n = 0, 1, ...
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Upper bound on the total sleep one item can accumulate
    pub fn worst_case_delay(&self) -> Duration {
        let mut backoff = self.backoff();
        (1..self.max_attempts)
            .filter_map(|_| backoff.next_backoff())
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::network(&RetryConfig::default())
    }
}

/// Per-item bookkeeping, alive for one `execute` call
pub struct RetryState {
    pub attempts: u32,
    pub last_class: Option<ErrorClass>,
    pub total_delay: Duration,
    backoff: ExponentialBackoff,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts: 0,
            last_class: None,
            total_delay: Duration::ZERO,
            backoff: policy.backoff(),
        }
    }

    fn next_delay(&mut self, policy: &RetryPolicy) -> Duration {
        let delay = self.backoff.next_backoff().unwrap_or(policy.max_delay);
        self.total_delay += delay;
        delay
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    service: &'static str,
}

impl RetryExecutor {
    pub fn new(service: &'static str, policy: RetryPolicy) -> Self {
        Self { policy, service }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable class, or the
    /// attempt budget is spent.
    pub async fn try_execute<F, Fut, T>(&self, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut state = RetryState::new(&self.policy);

        loop {
            state.attempts += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let class = err.class();
            state.last_class = Some(class);

            if !class.is_retryable() || state.attempts >= self.policy.max_attempts {
                debug!(
                    service = self.service,
                    attempts = state.attempts,
                    class = class.as_str(),
                    total_delay_ms = state.total_delay.as_millis() as u64,
                    "Giving up on call"
                );
                return Err(err);
            }

            let delay = state.next_delay(&self.policy);
            warn!(
                service = self.service,
                attempt = state.attempts,
                max_attempts = self.policy.max_attempts,
                class = class.as_str(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Call failed, retrying"
            );
            metrics::record_retry(class.as_str());
            tokio::time::sleep(delay).await;
        }
    }

    /// Like `try_execute`, but exhaustion yields `T::sentinel()` instead of
    /// an error.
    pub async fn execute<F, Fut, T>(&self, op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
        T: Sentinel,
    {
        match self.try_execute(op).await {
            Ok(value) => value,
            Err(e) => {
                error!(
                    service = self.service,
                    class = e.class().as_str(),
                    error = %e,
                    "Call failed permanently, substituting sentinel"
                );
                metrics::record_sentinels(self.service, 1);
                T::sentinel()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::network(&RetryConfig::default())
    }

    #[test]
    fn test_delay_schedule_doubles_then_caps() {
        let mut backoff = policy().backoff();
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_backoff().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_worst_case_delay() {
        // 4 attempts sleep three times: 1 + 2 + 4
        assert_eq!(policy().worst_case_delay(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let executor = RetryExecutor::new("test", policy());
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result = executor
            .try_execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 4 {
                    Err(CallError::transient("connection reset"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_yields_sentinel() {
        let executor = RetryExecutor::new("test", policy());
        let calls = &AtomicU32::new(0);

        let result: Vec<String> = executor
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CallError::RateLimited {
                    message: "HTTP 429".to_string(),
                })
            })
            .await;

        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_and_auth_not_retried() {
        let executor = RetryExecutor::new("test", policy());

        for err in [
            CallError::fatal("HTTP 400"),
            CallError::Auth {
                status: 401,
                message: "bad key".to_string(),
            },
            CallError::RateLimitTimeout { waited_ms: 5000 },
        ] {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> = executor
                .try_execute(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let err = err.clone();
                    async move { Err(err) }
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_auth_chain_falls_through_to_working_strategy() {
        let chain = AuthChain::new(vec![
            AuthStrategy::Bearer,
            AuthStrategy::Header {
                name: "X-API-KEY".to_string(),
            },
            AuthStrategy::QueryParam {
                name: "api_key".to_string(),
            },
        ]);
        let tried = std::sync::Mutex::new(Vec::new());

        let result = chain
            .run(|strategy| {
                tried.lock().unwrap().push(strategy.label());
                let ok = matches!(strategy, AuthStrategy::Header { .. });
                async move {
                    if ok {
                        Ok("body")
                    } else {
                        Err(CallError::Auth {
                            status: 401,
                            message: "unauthorized".to_string(),
                        })
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(*tried.lock().unwrap(), vec!["bearer", "header:X-API-KEY"]);

        // Next request starts from the strategy that worked
        tried.lock().unwrap().clear();
        let _ = chain
            .run(|strategy| {
                tried.lock().unwrap().push(strategy.label());
                async { Ok::<_, CallError>(()) }
            })
            .await;
        assert_eq!(*tried.lock().unwrap(), vec!["header:X-API-KEY"]);
    }

    #[tokio::test]
    async fn test_auth_chain_exhausted() {
        let chain = AuthChain::new(vec![AuthStrategy::Bearer, AuthStrategy::None]);
        let result: Result<(), _> = chain
            .run(|_| async {
                Err(CallError::Auth {
                    status: 403,
                    message: "forbidden".to_string(),
                })
            })
            .await;
        assert_eq!(result.unwrap_err().class(), ErrorClass::AuthFailure);
    }

    #[tokio::test]
    async fn test_auth_chain_stops_on_other_errors() {
        let chain = AuthChain::new(vec![AuthStrategy::Bearer, AuthStrategy::None]);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = chain
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::transient("timeout")) }
            })
            .await;
        assert_eq!(result.unwrap_err().class(), ErrorClass::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
