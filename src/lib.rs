//! # revisiond
//!
//! An Envoy xDS control-plane operator: it reconciles declarative revision
//! objects (an `EnvoyConfigRevision`-shaped spec per node) into live,
//! versioned xDS snapshots, and serves them over the Aggregated Discovery
//! Service plus the six single-resource discovery services.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator store (A4) --watch--> Work queue (A5) --reconcile--> Snapshot cache (C3)
//!        |                                                                |
//!        +--> Secret watcher (C5) -----------------------------> out-of-sync status
//!                                                                         |
//!                                                           xDS server (C6/C7) --> Envoy
//! ```
//!
//! - **domain**: pure entities (`Revision`, `EnvoyResources`, `SecretObject`, ...)
//! - **store**: the orchestrator boundary (`RevisionStore`/`SecretStore`) and its in-memory reference backend
//! - **decode**: resource-family decoders from a revision's textual spec into Envoy protobuf messages
//! - **secrets**: SDS secret resolution from orchestrator secret objects
//! - **reconcile**: the reconcile pass and its work queue
//! - **watcher**: the secret-reference reverse index and out-of-sync propagation
//! - **cache**: the per-node snapshot cache the xDS server reads from
//! - **xds**: the gRPC discovery services
//! - **config**, **errors**, **observability**, **cli**: the ambient stack

pub mod cache;
pub mod cli;
pub mod config;
pub mod decode;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod reconcile;
pub mod secrets;
pub mod store;
pub mod watcher;
pub mod xds;

pub use config::AppConfig;
pub use errors::{Error, RevisionError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_looks_like_semver() {
        let components: Vec<_> = VERSION.split('.').collect();
        assert!(components.len() >= 3, "version should follow semver: {VERSION}");
        assert!(components.iter().all(|part| !part.is_empty()));
        assert_eq!(APP_NAME, "revisiond");
    }
}
