//! Metrics collection and exposition.
//!
//! # Metrics
//! - `now_dev_requests_total` (counter): requests by method, status
//! - `now_dev_request_duration_seconds` (histogram): latency distribution
//! - `now_dev_builds_total` (counter): build cycles by outcome
//! - `now_dev_build_duration_seconds` (histogram): build cycle duration
//! - `now_dev_builder_installs_total` (counter): installer runs by builder
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - The Prometheus endpoint is opt-in (`observability.metrics_enabled`)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("now_dev_requests_total", &labels).increment(1);
    histogram!("now_dev_request_duration_seconds", &labels).record(started.elapsed().as_secs_f64());
}

pub fn record_build(outcome: &'static str, started: Instant) {
    counter!("now_dev_builds_total", "outcome" => outcome).increment(1);
    histogram!("now_dev_build_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_builder_install(builder: &str) {
    counter!("now_dev_builder_installs_total", "builder" => builder.to_string()).increment(1);
}
