//! Tonic service implementations: the aggregated (ADS) service plus the six
//! single-resource discovery services, all sharing one [`SnapshotCache`] and
//! the [`super::stream::run_discovery_stream`] loop. Delta variants are not
//! implemented; every service reports delta streams as unimplemented, since
//! the reconciliation engine only maintains a state-of-the-world snapshot
//! per node.

use std::pin::Pin;

use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::{DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse};
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryService;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryService;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryService;
use envoy_types::pb::envoy::service::runtime::v3::runtime_discovery_service_server::RuntimeDiscoveryService;
use envoy_types::pb::envoy::service::secret::v3::secret_discovery_service_server::SecretDiscoveryService;

use crate::cache::SnapshotCache;
use crate::domain::resources::ResourceFamily;

use super::stream::run_discovery_stream;

type DiscoveryStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send>>;
type DeltaStream = Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send>>;

fn unimplemented_delta() -> DeltaStream {
    Box::pin(tokio_stream::empty::<Result<DeltaDiscoveryResponse, Status>>())
}

/// Backs every xDS gRPC service the server exposes. Cheap to clone: wraps a
/// [`SnapshotCache`], which is itself `Arc`-backed internally.
#[derive(Clone)]
pub struct DiscoveryService {
    cache: SnapshotCache,
}

impl DiscoveryService {
    pub fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for DiscoveryService {
    type StreamAggregatedResourcesStream = DiscoveryStream;
    type DeltaAggregatedResourcesStream = DeltaStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), None, "ads");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }
}

#[tonic::async_trait]
impl ClusterDiscoveryService for DiscoveryService {
    type StreamClustersStream = DiscoveryStream;
    type DeltaClustersStream = DeltaStream;

    async fn stream_clusters(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamClustersStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), Some(ResourceFamily::Clusters), "cds");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_clusters(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaClustersStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }

    async fn fetch_clusters(&self, _request: Request<DiscoveryRequest>) -> Result<Response<DiscoveryResponse>, Status> {
        Err(Status::unimplemented("fetch (REST) xDS is not supported; use the streaming RPC"))
    }
}

#[tonic::async_trait]
impl RouteDiscoveryService for DiscoveryService {
    type StreamRoutesStream = DiscoveryStream;
    type DeltaRoutesStream = DeltaStream;

    async fn stream_routes(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamRoutesStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), Some(ResourceFamily::Routes), "rds");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_routes(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaRoutesStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }

    async fn fetch_routes(&self, _request: Request<DiscoveryRequest>) -> Result<Response<DiscoveryResponse>, Status> {
        Err(Status::unimplemented("fetch (REST) xDS is not supported; use the streaming RPC"))
    }
}

#[tonic::async_trait]
impl ListenerDiscoveryService for DiscoveryService {
    type StreamListenersStream = DiscoveryStream;
    type DeltaListenersStream = DeltaStream;

    async fn stream_listeners(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamListenersStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), Some(ResourceFamily::Listeners), "lds");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_listeners(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaListenersStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }

    async fn fetch_listeners(&self, _request: Request<DiscoveryRequest>) -> Result<Response<DiscoveryResponse>, Status> {
        Err(Status::unimplemented("fetch (REST) xDS is not supported; use the streaming RPC"))
    }
}

#[tonic::async_trait]
impl EndpointDiscoveryService for DiscoveryService {
    type StreamEndpointsStream = DiscoveryStream;
    type DeltaEndpointsStream = DeltaStream;

    async fn stream_endpoints(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamEndpointsStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), Some(ResourceFamily::Endpoints), "eds");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_endpoints(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaEndpointsStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }

    async fn fetch_endpoints(&self, _request: Request<DiscoveryRequest>) -> Result<Response<DiscoveryResponse>, Status> {
        Err(Status::unimplemented("fetch (REST) xDS is not supported; use the streaming RPC"))
    }
}

#[tonic::async_trait]
impl SecretDiscoveryService for DiscoveryService {
    type StreamSecretsStream = DiscoveryStream;
    type DeltaSecretsStream = DeltaStream;

    async fn stream_secrets(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamSecretsStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), Some(ResourceFamily::Secrets), "sds");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_secrets(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaSecretsStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }

    async fn fetch_secrets(&self, _request: Request<DiscoveryRequest>) -> Result<Response<DiscoveryResponse>, Status> {
        Err(Status::unimplemented("fetch (REST) xDS is not supported; use the streaming RPC"))
    }
}

#[tonic::async_trait]
impl RuntimeDiscoveryService for DiscoveryService {
    type StreamRuntimeStream = DiscoveryStream;
    type DeltaRuntimeStream = DeltaStream;

    async fn stream_runtime(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamRuntimeStream>, Status> {
        let stream = run_discovery_stream(self.cache.clone(), request.into_inner(), Some(ResourceFamily::Runtimes), "rtds");
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_runtime(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaRuntimeStream>, Status> {
        Ok(Response::new(unimplemented_delta()))
    }

    async fn fetch_runtime(&self, _request: Request<DiscoveryRequest>) -> Result<Response<DiscoveryResponse>, Status> {
        Err(Status::unimplemented("fetch (REST) xDS is not supported; use the streaming RPC"))
    }
}
