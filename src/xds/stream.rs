//! Shared SOTW discovery stream loop, driving both the aggregated (ADS)
//! service and the six single-resource services off the same [`SnapshotCache`].
//!
//! One task per incoming stream. The first request on a stream is required
//! to carry the client's `node` field (true in practice for every Envoy xDS
//! client); everything after that may omit it. A client request carrying a
//! non-empty `error_detail` closes the stream with an error rather than
//! being resent, per the reconciliation engine's stream-protocol contract.

use std::collections::HashMap;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::Status;
use tracing::{info, warn};

use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};

use crate::cache::SnapshotCache;
use crate::domain::id::NodeId;
use crate::domain::resources::ResourceFamily;
use crate::errors::RevisionError;
use crate::observability::metrics;

/// Tracks the version/nonce last sent for a family, for ACK detection.
struct Sent {
    version: String,
    nonce: String,
}

/// Runs the discovery stream loop for one connection.
///
/// `fixed_family` pins the stream to a single resource family, as required
/// by the six single-resource services (CDS, RDS, LDS, EDS, SDS, RTDS).
/// `None` means ADS: the family is taken from each request's `type_url`.
pub fn run_discovery_stream(
    cache: SnapshotCache,
    mut in_stream: tonic::Streaming<DiscoveryRequest>,
    fixed_family: Option<ResourceFamily>,
    label: &'static str,
) -> ReceiverStream<Result<DiscoveryResponse, Status>> {
    let (tx, rx) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        info!(stream = label, "xDS stream opened");
        metrics::stream_opened();

        let mut last_sent: HashMap<ResourceFamily, Sent> = HashMap::new();

        let node_id = match in_stream.next().await {
            Some(Ok(first)) => match resolve_node(&first) {
                Some(node_id) => {
                    if let Err(status) = handle_request(&cache, &node_id, fixed_family, &first, &tx, &mut last_sent, label).await {
                        let _ = tx.send(Err(status)).await;
                        metrics::stream_closed();
                        return;
                    }
                    node_id
                }
                None => {
                    warn!(stream = label, "first xDS request carried no node identity");
                    let _ = tx.send(Err(Status::invalid_argument("node identity is required on the first discovery request"))).await;
                    metrics::stream_closed();
                    return;
                }
            },
            Some(Err(e)) => {
                warn!(stream = label, error = %e, "error receiving first discovery request");
                let _ = tx.send(Err(e)).await;
                metrics::stream_closed();
                return;
            }
            None => {
                info!(stream = label, "xDS stream closed before any request");
                metrics::stream_closed();
                return;
            }
        };

        let mut updates = cache.subscribe(&node_id);

        loop {
            tokio::select! {
                request = in_stream.next() => {
                    match request {
                        Some(Ok(request)) => {
                            if let Err(status) = handle_request(&cache, &node_id, fixed_family, &request, &tx, &mut last_sent, label).await {
                                let _ = tx.send(Err(status)).await;
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(stream = label, node_id = %node_id, error = %e, "error receiving discovery request");
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!(stream = label, node_id = %node_id, "xDS stream closed by client");
                            break;
                        }
                    }
                }
                update = updates.recv() => {
                    match update {
                        Ok(snapshot) => {
                            let families: Vec<ResourceFamily> = match fixed_family {
                                Some(family) => vec![family],
                                None => last_sent.keys().copied().collect(),
                            };
                            for family in families {
                                let slot = snapshot.slot(family);
                                if last_sent.get(&family).map(|s| s.version == slot.version).unwrap_or(false) {
                                    continue;
                                }
                                let response = build_response(family, &slot.version, slot.entries.iter().map(|e| &e.resource));
                                info!(
                                    stream = label,
                                    node_id = %node_id,
                                    family = family.as_str(),
                                    version = %response.version_info,
                                    resource_count = response.resources.len(),
                                    "pushing xDS update"
                                );
                                metrics::record_xds_push(family.type_url());
                                last_sent.insert(family, Sent { version: response.version_info.clone(), nonce: response.nonce.clone() });
                                if tx.send(Ok(response)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(stream = label, node_id = %node_id, skipped, "xDS push channel lagged; client will resync on next ACK cycle");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            info!(stream = label, node_id = %node_id, "snapshot cache channel closed");
                            break;
                        }
                    }
                }
            }
        }

        metrics::stream_closed();
        info!(stream = label, node_id = %node_id, "xDS stream closed");
    });

    ReceiverStream::new(rx)
}

fn resolve_node(request: &DiscoveryRequest) -> Option<NodeId> {
    request.node.as_ref().map(|node| NodeId::new(node.id.clone()))
}

async fn handle_request(
    cache: &SnapshotCache,
    node_id: &NodeId,
    fixed_family: Option<ResourceFamily>,
    request: &DiscoveryRequest,
    tx: &tokio::sync::mpsc::Sender<Result<DiscoveryResponse, Status>>,
    last_sent: &mut HashMap<ResourceFamily, Sent>,
    label: &'static str,
) -> Result<(), Status> {
    metrics::record_xds_request(&request.type_url);

    if let Some(detail) = request.error_detail.as_ref() {
        let err = RevisionError::StreamProtocol {
            node_id: node_id.to_string(),
            message: format!("code {}: {}", detail.code, detail.message),
        };
        warn!(stream = label, node_id = %node_id, error = %err, "client rejected previous response, closing stream");
        return Err(Status::invalid_argument(err.to_string()));
    }

    let family = match fixed_family.or_else(|| ResourceFamily::from_type_url(&request.type_url)) {
        Some(family) => family,
        None => {
            warn!(stream = label, node_id = %node_id, type_url = %request.type_url, "discovery request for an unrecognized type URL");
            return Ok(());
        }
    };

    if let Some(sent) = last_sent.get(&family) {
        let is_ack = !request.response_nonce.is_empty()
            && request.response_nonce == sent.nonce
            && request.version_info == sent.version;
        if is_ack {
            return Ok(());
        }
    }

    info!(
        stream = label,
        node_id = %node_id,
        type_url = %request.type_url,
        version_info = %request.version_info,
        "received discovery request"
    );

    let Some(snapshot) = cache.get(node_id) else {
        // Nothing published for this node yet; the subscriber will pick up
        // the first snapshot once a reconcile pass publishes one.
        return Ok(());
    };

    let slot = snapshot.slot(family);
    let response = build_response(family, &slot.version, slot.entries.iter().map(|e| &e.resource));

    let is_secrets = family == ResourceFamily::Secrets;
    info!(
        stream = label,
        node_id = %node_id,
        family = family.as_str(),
        version = %response.version_info,
        resource_count = if is_secrets { 0 } else { response.resources.len() },
        "sending discovery response"
    );

    last_sent.insert(family, Sent { version: response.version_info.clone(), nonce: response.nonce.clone() });

    tx.send(Ok(response)).await.map_err(|_| Status::cancelled("discovery response receiver dropped"))
}

fn build_response<'a>(
    family: ResourceFamily,
    version: &str,
    resources: impl Iterator<Item = &'a crate::cache::CacheResource>,
) -> DiscoveryResponse {
    DiscoveryResponse {
        version_info: version.to_string(),
        type_url: family.type_url().to_string(),
        resources: resources.map(|r| r.encode_any()).collect(),
        nonce: uuid::Uuid::new_v4().to_string(),
        canary: false,
        control_plane: None,
        resource_errors: Vec::new(),
    }
}
