//! Rate-limited call gateway
//!
//! Wraps one logical downstream service (search API, LLM endpoint) with:
//! - a sliding-window request cap (`RateWindow`), checked by polling
//! - a semaphore bounding in-flight calls
//!
//! Every call to that service goes through the same `CallGateway`, so the
//! window and the in-flight bound are shared across all concurrent work.

use crate::config::RateLimitConfig;
use crate::errors::CallError;
use crate::metrics;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Admission record of recent requests.
///
/// Holds (admitted_at, cost) in admission order. Entries older than the
/// window are evicted lazily, right before each admission check.
#[derive(Debug)]
pub struct RateWindow {
    entries: VecDeque<(Instant, u32)>,
    used: u64,
    max_per_window: u32,
    window: Duration,
}

impl RateWindow {
    /// `max_per_window == 0` disables the cap
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            used: 0,
            max_per_window,
            window,
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(admitted_at, cost)) = self.entries.front() {
            if admitted_at + self.window < now {
                self.entries.pop_front();
                self.used -= u64::from(cost);
            } else {
                break;
            }
        }
    }

    /// Admit a request of `cost` units if the window has room for all of it.
    ///
    /// Zero-cost requests still occupy one unit. A cost above the cap is
    /// clamped to the cap so it is admitted once the window is empty.
    pub fn try_admit(&mut self, now: Instant, cost: u32) -> bool {
        if self.max_per_window == 0 {
            return true;
        }
        self.evict(now);
        let cost = cost.clamp(1, self.max_per_window);
        if self.used + u64::from(cost) > u64::from(self.max_per_window) {
            return false;
        }
        self.entries.push_back((now, cost));
        self.used += u64::from(cost);
        true
    }

    /// Units admitted within the window as of the last eviction
    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared entry point for one downstream service
#[derive(Debug)]
pub struct CallGateway {
    service: &'static str,
    window: Mutex<RateWindow>,
    in_flight: Arc<Semaphore>,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl CallGateway {
    pub fn new(service: &'static str, config: &RateLimitConfig) -> Self {
        Self {
            service,
            window: Mutex::new(RateWindow::new(
                config.max_requests_per_window,
                config.window(),
            )),
            in_flight: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Run `call` once the service has a free in-flight slot and window
    /// capacity.
    ///
    /// Fails with `RateLimitTimeout` if the window stays full past the
    /// configured max wait; the call is not made in that case.
    pub async fn submit<F, Fut, T>(&self, cost: u32, call: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| CallError::fatal(format!("{} gateway closed", self.service)))?;

        self.admit(cost).await?;

        let start = Instant::now();
        let result = call().await;
        metrics::record_call(self.service, start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    async fn admit(&self, cost: u32) -> Result<(), CallError> {
        let started = Instant::now();
        loop {
            // Evict, check and append under one lock; never held across the sleep
            let admitted = {
                let mut window = self.window.lock().await;
                window.try_admit(Instant::now(), cost)
            };

            let waited = started.elapsed();
            if admitted {
                if !waited.is_zero() {
                    metrics::record_rate_wait(self.service, waited.as_secs_f64());
                    debug!(
                        service = self.service,
                        waited_ms = waited.as_millis() as u64,
                        "Admitted after waiting for rate window"
                    );
                }
                return Ok(());
            }

            if let Some(max_wait) = self.max_wait {
                if waited >= max_wait {
                    return Err(CallError::RateLimitTimeout {
                        waited_ms: waited.as_millis() as u64,
                    });
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Units currently counted in the window
    pub async fn window_usage(&self) -> u64 {
        self.window.lock().await.used()
    }

    pub fn available_permits(&self) -> usize {
        self.in_flight.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limits(max: u32, window_secs: u64, concurrency: usize) -> RateLimitConfig {
        RateLimitConfig {
            max_requests_per_window: max,
            window_secs,
            max_concurrency: concurrency,
            poll_interval_ms: 1000,
            max_wait_secs: None,
        }
    }

    #[test]
    fn test_window_rejects_when_full_and_evicts_old_entries() {
        let start = Instant::now();
        let mut window = RateWindow::new(2, Duration::from_secs(60));

        assert!(window.try_admit(start, 1));
        assert!(window.try_admit(start, 1));
        assert!(!window.try_admit(start + Duration::from_secs(30), 1));

        // Entries at `start` are still inside the window at exactly +60s
        assert!(!window.try_admit(start + Duration::from_secs(60), 1));
        assert!(window.try_admit(start + Duration::from_secs(61), 1));
        assert_eq!(window.used(), 1);
    }

    #[test]
    fn test_zero_cost_counts_as_one() {
        let now = Instant::now();
        let mut window = RateWindow::new(1, Duration::from_secs(60));
        assert!(window.try_admit(now, 0));
        assert_eq!(window.used(), 1);
        assert!(!window.try_admit(now, 0));
    }

    #[test]
    fn test_cost_never_overfills_window() {
        let start = Instant::now();
        let mut window = RateWindow::new(3, Duration::from_secs(60));

        assert!(window.try_admit(start, 1));
        assert!(!window.try_admit(start, 5));
        assert!(!window.try_admit(start, 3));
        assert!(window.try_admit(start, 2));
        assert_eq!(window.used(), 3);

        // Oversized request takes the whole window once it has drained
        assert!(!window.try_admit(start + Duration::from_secs(30), 5));
        assert!(window.try_admit(start + Duration::from_secs(61), 5));
        assert_eq!(window.used(), 3);
        assert!(!window.try_admit(start + Duration::from_secs(61), 1));
    }

    #[test]
    fn test_unlimited_window() {
        let now = Instant::now();
        let mut window = RateWindow::new(0, Duration::from_secs(60));
        for _ in 0..1000 {
            assert!(window.try_admit(now, 1));
        }
        assert!(window.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_over_limit_waits_at_least_one_poll() {
        let gateway = CallGateway::new("test", &limits(3, 60, 10));

        for _ in 0..3 {
            let start = Instant::now();
            gateway.submit(1, || async { Ok::<_, CallError>(()) }).await.unwrap();
            assert!(start.elapsed() < Duration::from_secs(1));
        }

        let start = Instant::now();
        gateway.submit(1, || async { Ok::<_, CallError>(()) }).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_requests_never_block() {
        let gateway = CallGateway::new("test", &limits(1, 5, 10));

        for _ in 0..4 {
            let start = Instant::now();
            gateway.submit(1, || async { Ok::<_, CallError>(()) }).await.unwrap();
            assert!(start.elapsed() < Duration::from_secs(1));
            tokio::time::sleep(Duration::from_secs(6)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_gives_up() {
        let mut config = limits(1, 60, 10);
        config.max_wait_secs = Some(2);
        let gateway = CallGateway::new("test", &config);

        gateway.submit(1, || async { Ok::<_, CallError>(()) }).await.unwrap();

        let calls = AtomicUsize::new(0);
        let result = gateway
            .submit(1, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>(())
            })
            .await;

        assert!(matches!(result, Err(CallError::RateLimitTimeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_bound() {
        let gateway = Arc::new(CallGateway::new("test", &limits(0, 60, 2)));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gateway = gateway.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                gateway
                    .submit(1, || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, CallError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gateway.available_permits(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_respect_window() {
        let mut config = limits(5, 60, 64);
        config.max_wait_secs = Some(0);
        let gateway = Arc::new(CallGateway::new("test", &config));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let gateway = gateway.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                gateway
                    .submit(1, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, CallError>(())
                    })
                    .await
            }));
        }

        let mut admitted = 0;
        let mut timed_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(CallError::RateLimitTimeout { .. }) => timed_out += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(admitted, 5);
        assert_eq!(timed_out, 35);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(gateway.window_usage().await, 5);
    }
}
