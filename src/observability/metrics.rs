//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): forwarded requests by status
//! - `bridge_request_duration_seconds` (histogram): forwarding latency
//! - `bridge_startup_duration_seconds` (histogram): cold start by outcome
//! - `bridge_cleanup_actions_total` (counter): teardown actions by action, outcome
//! - `bridge_cleanup_timeouts_total` (counter): cleanups cut short by the deadline

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, start: Instant) {
    counter!("bridge_requests_total", "status" => status.to_string()).increment(1);
    histogram!("bridge_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_startup(success: bool, start: Instant) {
    let outcome = if success { "success" } else { "failure" };
    histogram!("bridge_startup_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cleanup_action(action: &'static str, outcome: &'static str) {
    counter!("bridge_cleanup_actions_total", "action" => action, "outcome" => outcome).increment(1);
}

pub fn record_cleanup_timeout() {
    counter!("bridge_cleanup_timeouts_total").increment(1);
}
