//! Metrics collection and exposition.
//!
//! # Metrics
//! - `authz_proxy_requests_total` (counter): requests by outcome and status
//! - `authz_proxy_request_duration_seconds` (histogram): time to response headers
//! - `authz_proxy_reloads_total` (counter): rules reloads by result
//! - `authz_proxy_identities` (gauge): identities in the live table
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when the exporter is disabled.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Final disposition of a proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    BadIdentity,
    Denied,
    Forwarded,
    UpstreamError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::BadIdentity => "bad_identity",
            Outcome::Denied => "denied",
            Outcome::Forwarded => "forwarded",
            Outcome::UpstreamError => "upstream_error",
        }
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!("authz_proxy_requests_total", "Requests handled, by outcome and status");
    metrics::describe_histogram!(
        "authz_proxy_request_duration_seconds",
        metrics::Unit::Seconds,
        "Time from request arrival to response headers"
    );
    metrics::describe_counter!("authz_proxy_reloads_total", "Authorization rules reloads, by result");
    metrics::describe_gauge!("authz_proxy_identities", "Identities in the live authorization table");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(outcome: Outcome, status: u16, start: Instant) {
    metrics::counter!(
        "authz_proxy_requests_total",
        "outcome" => outcome.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("authz_proxy_request_duration_seconds", "outcome" => outcome.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("authz_proxy_reloads_total", "result" => result).increment(1);
}

pub fn record_identities(count: usize) {
    metrics::gauge!("authz_proxy_identities").set(count as f64);
}
