//! # Error Handling
//!
//! Error taxonomy for the revision reconciliation engine. Distinguishes
//! user-data faults (surfaced as a taint on the offending revision) from
//! infrastructure faults (surfaced to the work queue for backoff-and-retry).

/// Result type for revisiond operations.
pub type Result<T> = std::result::Result<T, RevisionError>;

/// Main error type for the revision reconciliation engine.
#[derive(thiserror::Error, Debug)]
pub enum RevisionError {
    /// A resource value failed to decode into its target protobuf message.
    #[error("failed to decode {family} resource '{name}' at {path}: {cause}")]
    Decode { family: String, name: String, path: String, cause: String },

    /// A referenced secret does not exist in the secret store.
    #[error("secret '{namespace}/{name}' not found")]
    SecretNotFound { namespace: String, name: String },

    /// A referenced secret exists but is not a TLS key/cert pair.
    #[error("secret '{namespace}/{name}' has unsupported type '{found_type}'")]
    SecretWrongType { namespace: String, name: String, found_type: String },

    /// The secret store could not be reached.
    #[error("secret store transport error: {message}")]
    SecretTransport { message: String },

    /// The revision store could not be reached to fetch a revision.
    #[error("failed to fetch revision '{0}': {1}")]
    FetchRevision(String, String),

    /// A status patch could not be committed (conflict or transport failure).
    #[error("failed to patch status for '{0}': {1}")]
    PatchStatus(String, String),

    /// A client request on an open xDS stream carried a non-empty error_detail.
    #[error("stream protocol error from node '{node_id}': {message}")]
    StreamProtocol { node_id: String, message: String },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors with additional context.
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors.
    #[error("serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal invariant violations.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Requested object does not exist.
    #[error("not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// A write lost a compare-and-set race.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// An operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

impl RevisionError {
    pub fn decode(
        family: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Decode {
            family: family.into(),
            name: name.into(),
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn secret_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::SecretNotFound { namespace: namespace.into(), name: name.into() }
    }

    pub fn secret_wrong_type(
        namespace: impl Into<String>,
        name: impl Into<String>,
        found_type: impl Into<String>,
    ) -> Self {
        Self::SecretWrongType {
            namespace: namespace.into(),
            name: name.into(),
            found_type: found_type.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Infrastructure faults are eligible for work-queue requeue with backoff.
    /// User-data faults (decode/secret/stream errors) are resolved to a taint
    /// or a single closed stream, and must never be retried.
    pub fn is_infra(&self) -> bool {
        matches!(
            self,
            RevisionError::FetchRevision(..)
                | RevisionError::PatchStatus(..)
                | RevisionError::SecretTransport { .. }
                | RevisionError::Io { .. }
                | RevisionError::Timeout { .. }
                | RevisionError::Conflict { .. }
        )
    }
}

pub type Error = RevisionError;

impl From<std::io::Error> for RevisionError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for RevisionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for RevisionError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for RevisionError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::config(format!("validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_not_infra() {
        let err = RevisionError::decode("clusters", "my-cluster", "spec.resources.clusters[0].value", "unknown field 'foo'");
        assert!(!err.is_infra());
        assert!(err.to_string().contains("my-cluster"));
    }

    #[test]
    fn fetch_and_patch_errors_are_infra() {
        assert!(RevisionError::FetchRevision("ns/name".into(), "timeout".into()).is_infra());
        assert!(RevisionError::PatchStatus("ns/name".into(), "conflict".into()).is_infra());
    }

    #[test]
    fn secret_errors_are_not_infra() {
        assert!(!RevisionError::secret_not_found("ns", "tls-cert").is_infra());
        assert!(!RevisionError::secret_wrong_type("ns", "tls-cert", "generic").is_infra());
        assert!(RevisionError::SecretTransport { message: "refused".into() }.is_infra());
    }

    #[test]
    fn stream_protocol_error_is_not_infra() {
        let err = RevisionError::StreamProtocol { node_id: "node-1".into(), message: "nack".into() };
        assert!(!err.is_infra());
    }
}
