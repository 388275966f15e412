//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Mirror traffic counters into the `metrics` facade
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `http_requests_received_total` (counter)
//! - `http_responses_sent_total` (counter): by status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_rate_limited_total` (counter)
//! - `http_panics_recovered_total` (counter)
//! - `background_tasks_outstanding` (gauge)
//! - `rate_limiter_clients_tracked` (gauge)
//!
//! # Design Decisions
//! - Without an installed recorder every call here is a no-op, so the
//!   authoritative counters live in [`super::traffic::TrafficMeter`]
//! - Low-overhead metric updates (atomic operations)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request_received() {
    counter!("http_requests_received_total").increment(1);
}

pub fn record_response_sent(status: u16, elapsed: Duration) {
    counter!("http_responses_sent_total", "status" => status.to_string()).increment(1);
    histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("http_rate_limited_total").increment(1);
}

pub fn record_panic_recovered() {
    counter!("http_panics_recovered_total").increment(1);
}

pub fn record_background_tasks(outstanding: usize) {
    gauge!("background_tasks_outstanding").set(outstanding as f64);
}

pub fn record_clients_tracked(clients: usize) {
    gauge!("rate_limiter_clients_tracked").set(clients as f64);
}
