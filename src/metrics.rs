//! Lightweight metrics helpers for Dendrite.
//!
//! This module exposes a small set of convenience functions and an RAII timer
//! wrapping the `metrics` crate macros. It intentionally avoids embedding a
//! concrete exporter (the application can initialize any compatible recorder
//! externally) while still documenting and describing Dendrite‑specific
//! metric names.
//!
//! Provided metrics (labels vary by family):
//! * `dendrite_requests_total` (counter)
//! * `dendrite_request_duration_seconds` (histogram)
//! * `dendrite_upstream_requests_total` (counter)
//! * `dendrite_rate_limited_total` (counter, by window scope)
//!
//! The timer struct leverages `Drop` to record durations safely even when
//! early returns or errors occur.
use std::time::Instant;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

// Dendrite-specific metric names
pub const DENDRITE_REQUESTS_TOTAL: &str = "dendrite_requests_total";
pub const DENDRITE_REQUEST_DURATION_SECONDS: &str = "dendrite_request_duration_seconds";
pub const DENDRITE_UPSTREAM_REQUESTS_TOTAL: &str = "dendrite_upstream_requests_total";
pub const DENDRITE_RATE_LIMITED_TOTAL: &str = "dendrite_rate_limited_total";

static DESCRIBE_ONCE: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        DENDRITE_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        DENDRITE_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        DENDRITE_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to the upstream API."
    );
    describe_counter!(
        DENDRITE_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Requests denied by the sliding-window rate limiter (by scope)."
    );
});

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(path: &str, method: &str, status: u16) {
    counter!(
        DENDRITE_REQUESTS_TOTAL,
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(path: &str, method: &str, duration: std::time::Duration) {
    histogram!(
        DENDRITE_REQUEST_DURATION_SECONDS,
        "path" => path.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment total count of requests forwarded to the upstream.
pub fn increment_upstream_request_total(endpoint: &str, method: &str, status: u16) {
    counter!(
        DENDRITE_UPSTREAM_REQUESTS_TOTAL,
        "endpoint" => endpoint.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count a rate-limit denial for the given window scope ("minute" / "day").
pub fn increment_rate_limited(scope: &str) {
    counter!(DENDRITE_RATE_LIMITED_TOTAL, "scope" => scope.to_string()).increment(1);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    path: String,
    method: String,
}

impl RequestTimer {
    pub fn new(path: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            path: path.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.path, &self.method, self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing Dendrite metrics system");

    // Force lazy registration of metric descriptions
    Lazy::force(&DESCRIBE_ONCE);

    Ok(())
}
