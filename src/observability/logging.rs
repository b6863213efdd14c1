//! # Structured Logging
//!
//! Span macros and startup logging for the reconciliation engine, built on
//! the `tracing` ecosystem.

/// Create a tracing span for one reconcile pass over a single revision key.
#[macro_export]
macro_rules! reconcile_span {
    ($key:expr) => {
        tracing::info_span!(
            "reconcile",
            key = %$key,
            attempt_id = %uuid::Uuid::new_v4()
        )
    };
    ($key:expr, $($field:tt)*) => {
        tracing::info_span!(
            "reconcile",
            key = %$key,
            attempt_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for xDS stream operations.
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log the resolved configuration once at startup.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        admin_address = %config.admin.bind_address(),
        xds_address = %config.xds.bind_address(),
        orchestrator_backend = ?config.orchestrator.backend,
        reconcile_workers = config.reconcile.workers,
        metrics_enabled = config.observability.enable_metrics,
        "revisiond configuration loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_compile() {
        let _span = reconcile_span!("default/my-revision");
        let _span = reconcile_span!("default/my-revision", outcome = "published");
        let _span = xds_span!("stream_open", "node-1");
        let _span = xds_span!("stream_open", "node-1", type_url = "clusters");
    }

    #[test]
    fn log_config_info_does_not_panic() {
        let config = crate::config::AppConfig::default();
        log_config_info(&config);
    }
}
