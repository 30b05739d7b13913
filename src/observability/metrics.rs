//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_attempts_total` (counter): attempts by service, server, outcome
//! - `lb_attempt_duration_seconds` (histogram): per-attempt latency by service
//! - `lb_retries_total` (counter): retries by service and kind (same/next server)
//! - `lb_circuit_failures_total` (counter): circuit-related failures by server
//! - `lb_active_requests` (gauge): in-flight requests by server
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder
//!   every call is a no-op
//! - The Prometheus exporter is opt-in and installed by the binary only

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::ServerIdentity;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Outcome label of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Response,
    RetryableStatus,
    TransportError,
}

impl AttemptOutcome {
    fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Response => "response",
            AttemptOutcome::RetryableStatus => "retryable_status",
            AttemptOutcome::TransportError => "transport_error",
        }
    }
}

pub fn record_attempt(service: &str, server: &ServerIdentity, outcome: AttemptOutcome, elapsed: Duration) {
    metrics::counter!(
        "lb_attempts_total",
        "service" => service.to_string(),
        "server" => server.host_port(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    metrics::histogram!("lb_attempt_duration_seconds", "service" => service.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_retry(service: &str, next_server: bool) {
    let kind = if next_server { "next_server" } else { "same_server" };
    metrics::counter!("lb_retries_total", "service" => service.to_string(), "kind" => kind)
        .increment(1);
}

pub fn record_circuit_failure(server: &ServerIdentity) {
    metrics::counter!("lb_circuit_failures_total", "server" => server.host_port()).increment(1);
}

pub fn record_active_requests(server: &ServerIdentity, active: usize) {
    metrics::gauge!("lb_active_requests", "server" => server.host_port()).set(active as f64);
}
