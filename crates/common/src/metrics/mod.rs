//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming conventions. All
//! recording goes through the `metrics` facade; the server installs the
//! exporter, the CLI leaves the no-op recorder in place.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all claimcheck metrics
pub const METRICS_PREFIX: &str = "claimcheck";

/// Buckets for downstream call latency (in seconds)
/// Search calls usually land under 2s, LLM calls under 30s
pub const CALL_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Downstream calls
    describe_counter!(
        format!("{}_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total downstream calls by service and outcome"
    );

    describe_histogram!(
        format!("{}_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Downstream call latency in seconds"
    );

    describe_histogram!(
        format!("{}_rate_window_wait_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time spent waiting for sliding-window capacity"
    );

    // Retry and failure handling
    describe_counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries by error class"
    );

    describe_counter!(
        format!("{}_sentinels_total", METRICS_PREFIX),
        Unit::Count,
        "Work items replaced by a sentinel result"
    );

    // Dispatch
    describe_histogram!(
        format!("{}_dispatch_batch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall time of one dispatched batch"
    );

    describe_counter!(
        format!("{}_dispatch_items_total", METRICS_PREFIX),
        Unit::Count,
        "Work items dispatched"
    );

    // Pipeline
    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    describe_counter!(
        format!("{}_snippets_extended_total", METRICS_PREFIX),
        Unit::Count,
        "Snippets replaced with page context"
    );

    tracing::info!("Metrics registered");
}

/// Record one downstream call
pub fn record_call(service: &'static str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_calls_total", METRICS_PREFIX),
        "service" => service,
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_call_duration_seconds", METRICS_PREFIX),
        "service" => service
    )
    .record(duration_secs);
}

/// Record time a call spent blocked on a full rate window
pub fn record_rate_wait(service: &'static str, waited_secs: f64) {
    histogram!(
        format!("{}_rate_window_wait_seconds", METRICS_PREFIX),
        "service" => service
    )
    .record(waited_secs);
}

pub fn record_retry(class: &'static str) {
    counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        "class" => class
    )
    .increment(1);
}

pub fn record_sentinels(stage: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        format!("{}_sentinels_total", METRICS_PREFIX),
        "stage" => stage
    )
    .increment(count as u64);
}

/// Helper to record dispatch metrics
pub fn record_dispatch(strategy: &'static str, items: usize, duration_secs: f64) {
    counter!(
        format!("{}_dispatch_items_total", METRICS_PREFIX),
        "strategy" => strategy
    )
    .increment(items as u64);

    histogram!(
        format!("{}_dispatch_batch_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy
    )
    .record(duration_secs);
}

pub fn record_extended_snippets(count: usize) {
    counter!(format!("{}_snippets_extended_total", METRICS_PREFIX)).increment(count as u64);
}

/// Times one pipeline stage
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record the stage duration and return it in seconds
    pub fn finish(self) -> f64 {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage
        )
        .record(duration);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in CALL_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_stage_timer() {
        let timer = StageTimer::start("verify");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.finish() >= 0.005);
    }
}
