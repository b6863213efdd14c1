//! # Discovery Server (C6)
//!
//! The xDS gRPc surface: the aggregated (ADS) service plus the six
//! single-resource services (CDS, RDS, LDS, EDS, SDS, RTDS), all reading
//! from one [`SnapshotCache`]. `run_server` owns the listener and stops
//! accepting new streams once its cancellation token fires; streams already
//! open are left to finish on their own terms.

pub mod service;
mod stream;

pub use service::DiscoveryService;

use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryServiceServer;
use envoy_types::pb::envoy::service::runtime::v3::runtime_discovery_service_server::RuntimeDiscoveryServiceServer;
use envoy_types::pb::envoy::service::secret::v3::secret_discovery_service_server::SecretDiscoveryServiceServer;

use crate::cache::SnapshotCache;
use crate::config::{XdsConfig, XdsTlsConfig};
use crate::errors::{RevisionError, Result};

/// Binds the xDS gRPC listener and serves every discovery service off
/// `cache` until `cancel` fires.
pub async fn run_server(config: XdsConfig, cache: SnapshotCache, cancel: CancellationToken) -> Result<()> {
    let addr = config
        .bind_address()
        .parse()
        .map_err(|e| RevisionError::config(format!("invalid xDS bind address: {}", e)))?;

    let service = DiscoveryService::new(cache);
    let mut builder = configure_server_builder(Server::builder(), &config)?;

    info!(address = %addr, "starting xDS server");

    builder
        .add_service(AggregatedDiscoveryServiceServer::new(service.clone()))
        .add_service(ClusterDiscoveryServiceServer::new(service.clone()))
        .add_service(RouteDiscoveryServiceServer::new(service.clone()))
        .add_service(ListenerDiscoveryServiceServer::new(service.clone()))
        .add_service(EndpointDiscoveryServiceServer::new(service.clone()))
        .add_service(SecretDiscoveryServiceServer::new(service.clone()))
        .add_service(RuntimeDiscoveryServiceServer::new(service))
        .serve_with_shutdown(addr, cancel.cancelled_owned())
        .await
        .map_err(|e| RevisionError::internal(format!("xDS server failed: {}", e)))?;

    info!("xDS server stopped");
    Ok(())
}

fn configure_server_builder(mut builder: Server, config: &XdsConfig) -> Result<Server> {
    if let Some(tls_config) = build_server_tls_config(config.tls.as_ref())? {
        builder = builder
            .tls_config(tls_config)
            .map_err(|e| RevisionError::config(format!("failed to apply xDS TLS configuration: {}", e)))?;
    }
    Ok(builder)
}

fn build_server_tls_config(tls: Option<&XdsTlsConfig>) -> Result<Option<ServerTlsConfig>> {
    let tls = match tls {
        Some(tls) => tls,
        None => return Ok(None),
    };

    let cert_bytes = std::fs::read(&tls.cert_path)
        .map_err(|e| RevisionError::config(format!("failed to read xDS TLS certificate '{}': {}", tls.cert_path, e)))?;
    let key_bytes = std::fs::read(&tls.key_path)
        .map_err(|e| RevisionError::config(format!("failed to read xDS TLS private key '{}': {}", tls.key_path, e)))?;

    let identity = Identity::from_pem(cert_bytes, key_bytes);
    let mut server_tls_config = ServerTlsConfig::new().identity(identity);

    if let Some(ca_path) = &tls.client_ca_path {
        let ca_bytes = std::fs::read(ca_path)
            .map_err(|e| RevisionError::config(format!("failed to read xDS client CA '{}': {}", ca_path, e)))?;
        let client_ca = Certificate::from_pem(ca_bytes);
        server_tls_config = server_tls_config.client_ca_root(client_ca);
        if !tls.require_client_cert {
            server_tls_config = server_tls_config.client_auth_optional(true);
        }
    } else if tls.require_client_cert {
        return Err(RevisionError::config(
            "xds.tls.require_client_cert is set but no client_ca_path is configured",
        ));
    }

    Ok(Some(server_tls_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tls_config_yields_a_plaintext_server() {
        let config = XdsConfig::default();
        assert!(build_server_tls_config(config.tls.as_ref()).unwrap().is_none());
    }

    #[test]
    fn require_client_cert_without_a_ca_is_a_config_error() {
        let tls = XdsTlsConfig {
            cert_path: "/dev/null".to_string(),
            key_path: "/dev/null".to_string(),
            client_ca_path: None,
            require_client_cert: true,
        };
        // fails before ever touching require_client_cert because /dev/null
        // isn't valid PEM, but a missing cert file fails first with a
        // config error either way.
        assert!(build_server_tls_config(Some(&tls)).is_err());
    }
}
