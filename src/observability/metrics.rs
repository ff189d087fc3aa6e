//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_sync_cycles_total` (counter): reconciliation cycles by outcome
//! - `node_engine_restarts_total` (counter): engine restarts by result
//! - `node_config_updates_total` (counter): accepted configs by source
//! - `node_api_requests_total` (counter): local API requests by endpoint, status
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in via `[metrics]`

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!("node_sync_cycles_total", "Reconciliation cycles by outcome");
    ::metrics::describe_counter!("node_engine_restarts_total", "Engine restarts by result");
    ::metrics::describe_counter!("node_config_updates_total", "Accepted configurations by source");
    ::metrics::describe_counter!("node_api_requests_total", "Local API requests by endpoint and status");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_sync(outcome: &'static str) {
    ::metrics::counter!("node_sync_cycles_total", "outcome" => outcome).increment(1);
}

pub fn record_restart(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    ::metrics::counter!("node_engine_restarts_total", "result" => result).increment(1);
}

pub fn record_config_update(source: &'static str) {
    ::metrics::counter!("node_config_updates_total", "source" => source).increment(1);
}

pub fn record_api_request(endpoint: &str, status: u16) {
    ::metrics::counter!(
        "node_api_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
