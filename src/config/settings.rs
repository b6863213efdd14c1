//! Typed configuration sections for the revision reconciliation engine.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level application configuration, assembled from defaults, an optional
/// file, and `REVISIOND_`-prefixed environment variables (see [`super::load_config`]).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub admin: AdminConfig,
    #[validate(nested)]
    pub xds: XdsConfig,
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,
    #[validate(nested)]
    pub reconcile: ReconcileConfig,
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            xds: XdsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            reconcile: ReconcileConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate_all(&self) -> crate::errors::Result<()> {
        self.validate()?;
        self.reconcile.validate_custom()?;
        Ok(())
    }
}

/// The admin HTTP surface: `/healthz` and `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdminConfig {
    pub host: String,
    #[validate(range(min = 1, max = 65535, message = "admin port must be a valid TCP port"))]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 9901 }
    }
}

impl AdminConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The xDS gRPC server.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct XdsConfig {
    pub host: String,
    #[validate(range(min = 1, max = 65535, message = "xDS port must be a valid TCP port"))]
    pub port: u16,
    #[validate(range(min = 1, message = "max concurrent streams must be positive"))]
    pub max_concurrent_streams: u32,
    pub tls: Option<XdsTlsConfig>,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18000,
            max_concurrent_streams: 1024,
            tls: None,
        }
    }
}

impl XdsConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct XdsTlsConfig {
    pub cert_path: String,
    pub key_path: String,
    pub client_ca_path: Option<String>,
    pub require_client_cert: bool,
}

/// Which `RevisionStore`/`SecretStore` implementation backs the orchestrator
/// boundary, and how often it resyncs.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrchestratorConfig {
    pub backend: OrchestratorBackend,
    #[validate(range(min = 1, message = "resync interval must be at least 1 second"))]
    pub resync_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { backend: OrchestratorBackend::Memory, resync_interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorBackend {
    Memory,
}

/// Work-queue tuning for the reconcile loop.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReconcileConfig {
    #[validate(range(min = 1, max = 256, message = "worker count must be between 1 and 256"))]
    pub workers: usize,
    #[validate(range(min = 1, message = "base backoff must be at least 1ms"))]
    pub backoff_base_ms: u64,
    #[validate(range(min = 1, message = "max backoff must be at least 1ms"))]
    pub backoff_max_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { workers: 4, backoff_base_ms: 250, backoff_max_ms: 30_000 }
    }
}

impl ReconcileConfig {
    pub fn validate_custom(&self) -> crate::errors::Result<()> {
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(crate::errors::RevisionError::config(
                "reconcile.backoff_max_ms must be >= reconcile.backoff_base_ms",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub enable_metrics: bool,
    pub metrics_host: String,
    #[validate(range(min = 1, max = 65535, message = "metrics port must be a valid TCP port"))]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            enable_metrics: true,
            metrics_host: "127.0.0.1".to_string(),
            metrics_port: 9902,
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_bind_address(&self) -> String {
        format!("{}:{}", self.metrics_host, self.metrics_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let config = AppConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn admin_bind_address_formats_host_and_port() {
        let admin = AdminConfig { host: "0.0.0.0".to_string(), port: 9901 };
        assert_eq!(admin.bind_address(), "0.0.0.0:9901");
    }

    #[test]
    fn reconcile_rejects_inverted_backoff_range() {
        let reconcile = ReconcileConfig { workers: 2, backoff_base_ms: 5000, backoff_max_ms: 1000 };
        assert!(reconcile.validate_custom().is_err());
    }

    #[test]
    fn port_out_of_range_fails_validation() {
        let mut config = AppConfig::default();
        config.xds.port = 0;
        assert!(config.validate_all().is_err());
    }
}
