//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pds_events_processed_total` (counter): chain events applied, by event
//! - `pds_events_skipped_total` (counter): events skipped, by event and reason
//! - `pds_outbox_transitions_total` (counter): outbox state changes, by name and state
//! - `pds_distribution_transitions_total` (counter): lifecycle transitions, by state
//! - `pds_reconcile_duration_seconds` (histogram): per-task pass duration
//! - `pds_reconcile_errors_total` (counter): rolled back passes, by task
//! - `pds_distribution_failures_total` (counter): per-distribution stage failures, by stage and outcome
//! - `pds_chain_rpc_health` (gauge): 1=reachable, 0=unreachable

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event_processed(event: &str) {
    counter!("pds_events_processed_total", "event" => event.to_string()).increment(1);
}

pub fn record_event_skipped(event: &str, reason: &'static str) {
    counter!(
        "pds_events_skipped_total",
        "event" => event.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_outbox_transition(name: &str, state: &'static str) {
    counter!(
        "pds_outbox_transitions_total",
        "name" => name.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_distribution_transition(state: &'static str) {
    counter!("pds_distribution_transitions_total", "state" => state).increment(1);
}

pub fn record_reconcile(task: &'static str, start: Instant, ok: bool) {
    histogram!("pds_reconcile_duration_seconds", "task" => task)
        .record(start.elapsed().as_secs_f64());
    if !ok {
        counter!("pds_reconcile_errors_total", "task" => task).increment(1);
    }
}

pub fn record_distribution_failure(stage: &'static str, outcome: &'static str) {
    counter!(
        "pds_distribution_failures_total",
        "stage" => stage,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_chain_health(healthy: bool) {
    gauge!("pds_chain_rpc_health").set(if healthy { 1.0 } else { 0.0 });
}
