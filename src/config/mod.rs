//! # Configuration Management
//!
//! Layered configuration for the revision reconciliation engine: defaults,
//! then an optional file, then `REVISIOND_`-prefixed environment variables.

pub mod settings;

pub use settings::{
    AdminConfig, AppConfig, ObservabilityConfig, OrchestratorBackend, OrchestratorConfig,
    ReconcileConfig, XdsConfig, XdsTlsConfig,
};

use crate::errors::{RevisionError, Result};
use config::{Config, Environment, File};
use std::path::Path;

/// Load application configuration from multiple sources.
///
/// Configuration is loaded in the following order (later sources override earlier ones):
/// 1. Default values
/// 2. Configuration file (if specified)
/// 3. Environment variables with `REVISIOND_` prefix
pub fn load_config<P: AsRef<Path>>(config_path: Option<P>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    builder = builder.add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        let path = path.as_ref();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(RevisionError::config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("REVISIOND").separator("_").try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| RevisionError::config_with_source("failed to build configuration", Box::new(e)))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| RevisionError::config_with_source("failed to deserialize configuration", Box::new(e)))?;

    app_config.validate_all()?;

    Ok(app_config)
}

/// Load configuration from environment variables only. Useful for containerized deployments.
pub fn load_config_from_env() -> Result<AppConfig> {
    load_config::<&str>(None)
}

/// Load configuration from a YAML file, overlaid with environment variables.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    load_config(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = load_config_from_env().unwrap();
        assert_eq!(config.admin.host, "127.0.0.1");
        assert_eq!(config.xds.port, 18000);
    }

    #[test]
    fn load_config_from_env_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("REVISIOND_XDS_PORT", "9090");
        env::set_var("REVISIOND_RECONCILE_WORKERS", "8");

        let config = load_config_from_env().unwrap();
        assert_eq!(config.xds.port, 9090);
        assert_eq!(config.reconcile.workers, 8);

        env::remove_var("REVISIOND_XDS_PORT");
        env::remove_var("REVISIOND_RECONCILE_WORKERS");
    }

    #[test]
    fn load_config_from_file_overrides_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let yaml_content = r#"
admin:
  host: "0.0.0.0"
  port: 9000
xds:
  max_concurrent_streams: 2048
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = load_config_from_file(temp_file.path()).unwrap();
        assert_eq!(config.admin.host, "0.0.0.0");
        assert_eq!(config.admin.port, 9000);
        assert_eq!(config.xds.max_concurrent_streams, 2048);
    }

    #[test]
    fn load_config_nonexistent_file_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        let result = load_config_from_file("/nonexistent/revisiond.yaml");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn env_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("REVISIOND_XDS_PORT", "7777");

        let yaml_content = "xds:\n  port: 8888\n";
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = load_config_from_file(temp_file.path()).unwrap();
        assert_eq!(config.xds.port, 7777);

        env::remove_var("REVISIOND_XDS_PORT");
    }
}
