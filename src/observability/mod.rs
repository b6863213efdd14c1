//! # Observability Infrastructure
//!
//! Structured logging, Prometheus metrics, and the admin HTTP surface
//! (`/healthz`, `/metrics`) for the revision reconciliation engine.

pub mod admin;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use health::HealthChecker;
pub use logging::log_config_info;
pub use tracing::init_logging;

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use metrics_exporter_prometheus::PrometheusHandle;

/// Initialize logging and, if enabled, the metrics recorder. Returns a
/// [`HealthChecker`] (caller flips it ready once stores and servers are
/// wired up) and a [`PrometheusHandle`] for the admin router's `/metrics`
/// route when metrics are enabled.
pub fn init_observability(
    config: &ObservabilityConfig,
) -> Result<(HealthChecker, Option<PrometheusHandle>)> {
    init_logging(config)?;

    let handle = if config.enable_metrics {
        Some(metrics::install_recorder(config)?)
    } else {
        None
    };

    let health_checker = HealthChecker::new();

    ::tracing::info!(
        log_level = %config.log_level,
        json_logs = config.json_logs,
        metrics_enabled = config.enable_metrics,
        "observability initialized"
    );

    Ok((health_checker, handle))
}
