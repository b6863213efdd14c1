//! # Metrics
//!
//! Prometheus metrics for reconcile outcomes, secret invalidations, and xDS
//! stream activity, exported via `metrics-exporter-prometheus`.

use crate::config::ObservabilityConfig;
use crate::errors::{RevisionError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the global Prometheus recorder and return a handle that renders
/// the current metric snapshot as text for the `/metrics` endpoint.
pub fn install_recorder(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let addr: SocketAddr = config
        .metrics_bind_address()
        .parse()
        .map_err(|e| RevisionError::config(format!("invalid metrics bind address: {}", e)))?;

    let handle = PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()
        .map_err(|e| RevisionError::config(format!("failed to install metrics recorder: {}", e)))?;

    describe_metrics();
    Ok(handle)
}

/// Build a standalone handle without installing it as the process-global
/// recorder. Used by the admin router's own tests, where installing a second
/// global recorder in the same test binary would fail.
pub fn standalone_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn describe_metrics() {
    metrics::describe_counter!(
        "revisiond_reconcile_total",
        "Count of reconcile passes by outcome (published, skipped, tainted, unpublished, gone)"
    );
    metrics::describe_counter!(
        "revisiond_secret_invalidations_total",
        "Count of revisions marked out-of-sync by a secret mutation event"
    );
    metrics::describe_counter!(
        "revisiond_xds_requests_total",
        "Count of xDS discovery requests received, by type URL"
    );
    metrics::describe_counter!(
        "revisiond_xds_pushes_total",
        "Count of unsolicited xDS pushes sent on cache update, by type URL"
    );
    metrics::describe_gauge!(
        "revisiond_xds_streams_open",
        "Number of currently open xDS streams"
    );
}

pub fn record_reconcile_outcome(outcome: &str) {
    metrics::counter!("revisiond_reconcile_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_secret_invalidation() {
    metrics::counter!("revisiond_secret_invalidations_total").increment(1);
}

pub fn record_xds_request(type_url: &str) {
    metrics::counter!("revisiond_xds_requests_total", "type_url" => type_url.to_string())
        .increment(1);
}

pub fn record_xds_push(type_url: &str) {
    metrics::counter!("revisiond_xds_pushes_total", "type_url" => type_url.to_string())
        .increment(1);
}

pub fn stream_opened() {
    metrics::gauge!("revisiond_xds_streams_open").increment(1.0);
}

pub fn stream_closed() {
    metrics::gauge!("revisiond_xds_streams_open").decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_helpers_do_not_panic_without_a_recorder() {
        record_reconcile_outcome("published");
        record_secret_invalidation();
        record_xds_request("clusters");
        record_xds_push("clusters");
        stream_opened();
        stream_closed();
    }
}
