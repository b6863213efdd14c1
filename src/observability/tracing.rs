//! # Logging Initialization
//!
//! Sets up the `tracing-subscriber` formatting layer (pretty or JSON) driven
//! by [`ObservabilityConfig`].

use crate::config::ObservabilityConfig;
use crate::errors::{RevisionError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Idempotent per process: a second
/// call returns an error rather than panicking, so tests can call it freely.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = parse_env_filter(&config.log_level)?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer().json().flatten_event(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| RevisionError::config(format!("failed to initialize logging: {}", e)))?;
    } else {
        let pretty_layer = tracing_subscriber::fmt::layer().with_target(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(pretty_layer)
            .try_init()
            .map_err(|e| RevisionError::config(format!("failed to initialize logging: {}", e)))?;
    }

    Ok(())
}

fn parse_env_filter(level: &str) -> Result<EnvFilter> {
    let normalized = level.trim();
    match normalized.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(RevisionError::config(format!(
                "invalid log level '{}': must be one of trace, debug, info, warn, error",
                level
            )))
        }
    }
    EnvFilter::try_new(normalized)
        .map_err(|e| RevisionError::config(format!("invalid log level '{}': {}", level, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_log_level() {
        let result = parse_env_filter("verbose");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_known_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(parse_env_filter(level).is_ok());
        }
    }
}
