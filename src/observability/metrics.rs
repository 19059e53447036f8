//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total{outcome}` (counter): passed, rejected, error
//! - `shield_rejections_total{check}` (counter): rejections by check name
//! - `shield_signature_checks_total{result}` (counter): verified, unverified
//!
//! # Design Decisions
//! - Prometheus exporter is started by the binary only when enabled
//! - Label values are bounded: check names and fixed outcome strings

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "shield_requests_total";
pub const REJECTIONS_TOTAL: &str = "shield_rejections_total";
pub const SIGNATURE_CHECKS_TOTAL: &str = "shield_signature_checks_total";

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_outcome(outcome: &'static str) {
    metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_rejection(check: &str) {
    metrics::counter!(REJECTIONS_TOTAL, "check" => check.to_string()).increment(1);
}

pub fn record_signature_check(verified: bool) {
    let result = if verified { "verified" } else { "unverified" };
    metrics::counter!(SIGNATURE_CHECKS_TOTAL, "result" => result).increment(1);
}
