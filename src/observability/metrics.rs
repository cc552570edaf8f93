//! Metrics collection and exposition.
//!
//! # Metrics
//! - `video_provider_calls_total` (counter): provider operations by operation, outcome
//! - `video_provider_call_duration_seconds` (histogram): end-to-end latency incl. retries
//! - `video_circuit_transitions_total` (counter): breaker transitions by from, to
//! - `video_circuit_state` (gauge): 0=closed, 1=half_open, 2=open
//! - `video_retries_total` (counter): retries by operation
//! - `video_retry_budget_exhausted_total` (counter)
//! - `video_poll_checks_total` (counter): poll checks by outcome
//! - `video_poll_sessions_active` (gauge)
//! - `video_webhooks_total` (counter): inbound webhooks by result
//! - `video_assets_tracked` (gauge)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

pub mod names {
    pub const PROVIDER_CALLS_TOTAL: &str = "video_provider_calls_total";
    pub const PROVIDER_CALL_DURATION_SECONDS: &str = "video_provider_call_duration_seconds";
    pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "video_circuit_transitions_total";
    pub const CIRCUIT_STATE: &str = "video_circuit_state";
    pub const RETRIES_TOTAL: &str = "video_retries_total";
    pub const RETRY_BUDGET_EXHAUSTED_TOTAL: &str = "video_retry_budget_exhausted_total";
    pub const POLL_CHECKS_TOTAL: &str = "video_poll_checks_total";
    pub const POLL_SESSIONS_ACTIVE: &str = "video_poll_sessions_active";
    pub const WEBHOOKS_TOTAL: &str = "video_webhooks_total";
    pub const ASSETS_TRACKED: &str = "video_assets_tracked";
}

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_provider_call(operation: &str, outcome: &str, started: Instant) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::PROVIDER_CALLS_TOTAL, &labels).increment(1);
    histogram!(names::PROVIDER_CALL_DURATION_SECONDS, "operation" => operation.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_circuit_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!(names::CIRCUIT_STATE).set(value);
}

pub fn record_circuit_transition(from: CircuitState, to: CircuitState) {
    counter!(
        names::CIRCUIT_TRANSITIONS_TOTAL,
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_circuit_state(to);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_retry_budget_exhausted() {
    counter!(names::RETRY_BUDGET_EXHAUSTED_TOTAL).increment(1);
}

pub fn record_poll_check(outcome: &'static str) {
    counter!(names::POLL_CHECKS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_poll_sessions(active: usize) {
    gauge!(names::POLL_SESSIONS_ACTIVE).set(active as f64);
}

pub fn record_webhook(result: &'static str) {
    counter!(names::WEBHOOKS_TOTAL, "result" => result).increment(1);
}

pub fn record_assets_tracked(count: usize) {
    gauge!(names::ASSETS_TRACKED).set(count as f64);
}
