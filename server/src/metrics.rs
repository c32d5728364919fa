//! Prometheus metrics for capture, storage and the HTTP gateway

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

// ── Capture / storage ────────────────────────────────────────────────────────

pub static APPEND_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("lens_append_total", "Record appends by outcome", &["status"]).unwrap()
});

pub static CAPTURED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("lens_captured_total", "Queries captured by agents").unwrap()
});

pub static CAPTURE_FAILURES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lens_capture_failures_total",
        "Captured records that could not be persisted"
    )
    .unwrap()
});

pub static EVICTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lens_evicted_total",
        "Records removed by the retention cap"
    )
    .unwrap()
});

pub static EVICTION_FAILURES: Lazy<Counter> = Lazy::new(|| {
    register_counter!("lens_eviction_failures_total", "Failed eviction passes").unwrap()
});

// ── HTTP gateway ─────────────────────────────────────────────────────────────

pub static API_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lens_api_requests_total",
        "Gateway requests by route and status",
        &["route", "status"]
    )
    .unwrap()
});

pub static API_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "lens_api_duration_seconds",
        "Gateway request latency",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
