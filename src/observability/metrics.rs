//! Metrics collection and exposition.
//!
//! # Metrics
//! - `byway_requests_total` (counter): requests by method, status, outcome
//! - `byway_request_duration_seconds` (histogram): end-to-end latency
//! - `byway_route_resolutions_total` (counter): bindings chosen, by service and source
//! - `byway_table_reloads_total` (counter): routing table updates, by result
//! - `byway_table_generation` (gauge): generation of the active table

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub mod names {
    pub const REQUESTS_TOTAL: &str = "byway_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "byway_request_duration_seconds";
    pub const ROUTE_RESOLUTIONS_TOTAL: &str = "byway_route_resolutions_total";
    pub const TABLE_RELOADS_TOTAL: &str = "byway_table_reloads_total";
    pub const TABLE_GENERATION: &str = "byway_table_generation";
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished proxied request.
///
/// `outcome` is one of `routed`, `unrouted` or `error`.
pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    counter!(
        names::REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(names::REQUEST_DURATION_SECONDS, "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_resolution(service: &str, resolved_by: &'static str) {
    counter!(
        names::ROUTE_RESOLUTIONS_TOTAL,
        "service" => service.to_string(),
        "via" => resolved_by
    )
    .increment(1);
}

pub fn record_table_reload(accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    counter!(names::TABLE_RELOADS_TOTAL, "result" => result).increment(1);
}

pub fn record_table_generation(generation: u64) {
    gauge!(names::TABLE_GENERATION).set(generation as f64);
}
