//! Metrics and observability utilities
//!
//! Prometheus metrics through the `metrics` facade. Names share the
//! `youbook_` prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all YouBook metrics
pub const METRICS_PREFIX: &str = "youbook";

/// Buckets for request and transaction latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Buckets for generative-text latency (typically seconds)
pub const TRANSFORM_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    20.00, // 20s
    40.00, // 40s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Drafting metrics
    describe_counter!(
        format!("{}_entries_staged_total", METRICS_PREFIX),
        Unit::Count,
        "Raw entries written, by write mode"
    );

    describe_counter!(
        format!("{}_sequence_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Sequence slots lost to a concurrent writer and retried"
    );

    describe_counter!(
        format!("{}_summaries_total", METRICS_PREFIX),
        Unit::Count,
        "Interview summaries stored"
    );

    describe_counter!(
        format!("{}_books_stored_total", METRICS_PREFIX),
        Unit::Count,
        "Books copied into the library"
    );

    describe_counter!(
        format!("{}_sections_stored_total", METRICS_PREFIX),
        Unit::Count,
        "Book sections copied into the library"
    );

    // Transformer metrics
    describe_counter!(
        format!("{}_transform_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative-text requests"
    );

    describe_histogram!(
        format!("{}_transform_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generative-text latency in seconds"
    );

    describe_counter!(
        format!("{}_transform_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative-text errors"
    );

    // Database metrics
    describe_histogram!(
        format!("{}_db_transaction_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Transaction latency in seconds, by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a raw entry write
pub fn record_entry_staged(mode: &str) {
    counter!(
        format!("{}_entries_staged_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Helper to record a lost sequence slot
pub fn record_sequence_retry() {
    counter!(format!("{}_sequence_retries_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a stored interview summary
pub fn record_summary() {
    counter!(format!("{}_summaries_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a stored book
pub fn record_book_stored(sections: usize) {
    counter!(format!("{}_books_stored_total", METRICS_PREFIX)).increment(1);
    counter!(format!("{}_sections_stored_total", METRICS_PREFIX)).increment(sections as u64);
}

/// Helper to record generative-text metrics
pub fn record_transform(duration_secs: f64, model: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_transform_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_transform_duration_seconds", METRICS_PREFIX),
            "operation" => operation.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_transform_errors_total", METRICS_PREFIX),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

/// Helper to record transaction latency
pub fn record_transaction(duration_secs: f64, committed: bool) {
    let outcome = if committed { "commit" } else { "rollback" };

    histogram!(
        format!("{}_db_transaction_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome
    )
    .record(duration_secs);
}
