//! The per-node [`Snapshot`]: six fixed resource slots plus the version
//! derivation rule for the secrets slot. Every other slot, including an
//! empty runtimes slot, just carries the revision's own version; only
//! secrets gets a derived suffix, since secret content can churn
//! independently of the revision version that names it.

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::Secret;
use envoy_types::pb::envoy::service::runtime::v3::Runtime;
use prost::Message;
use envoy_types::pb::google::protobuf::Any;
use sha2::{Digest, Sha256};

use crate::decode::DecodedResource;
use crate::domain::id::NodeId;
use crate::domain::resources::{ResourceFamily, FAMILY_ORDER};

/// Suffix appended to the revision version for an empty secrets slot. A
/// literal sentinel, not a hash: it marks "no secrets referenced" as
/// distinct from any real content digest, which always looks like
/// `<version>-<10 hex chars>` too but can never collide with this fixed
/// suffix by construction (the hash is computed only when names is
/// non-empty).
const EMPTY_SECRETS_SUFFIX: &str = "-74d569cc4";

/// A typed resource in its cached, push-ready form.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResource {
    Endpoint(ClusterLoadAssignment),
    Cluster(Cluster),
    Route(RouteConfiguration),
    Listener(Listener),
    Secret(Secret),
    Runtime(Runtime),
}

impl From<DecodedResource> for CacheResource {
    fn from(decoded: DecodedResource) -> Self {
        match decoded {
            DecodedResource::Endpoint(r) => CacheResource::Endpoint(r),
            DecodedResource::Cluster(r) => CacheResource::Cluster(r),
            DecodedResource::Route(r) => CacheResource::Route(r),
            DecodedResource::Listener(r) => CacheResource::Listener(r),
            DecodedResource::Runtime(r) => CacheResource::Runtime(r),
        }
    }
}

impl CacheResource {
    pub fn family(&self) -> ResourceFamily {
        match self {
            CacheResource::Endpoint(_) => ResourceFamily::Endpoints,
            CacheResource::Cluster(_) => ResourceFamily::Clusters,
            CacheResource::Route(_) => ResourceFamily::Routes,
            CacheResource::Listener(_) => ResourceFamily::Listeners,
            CacheResource::Secret(_) => ResourceFamily::Secrets,
            CacheResource::Runtime(_) => ResourceFamily::Runtimes,
        }
    }

    /// Encodes this resource into the `google.protobuf.Any` the xDS wire
    /// protocol expects inside a `DiscoveryResponse`.
    pub fn encode_any(&self) -> Any {
        let type_url = self.family().type_url().to_string();
        let value = match self {
            CacheResource::Endpoint(r) => r.encode_to_vec(),
            CacheResource::Cluster(r) => r.encode_to_vec(),
            CacheResource::Route(r) => r.encode_to_vec(),
            CacheResource::Listener(r) => r.encode_to_vec(),
            CacheResource::Secret(r) => r.encode_to_vec(),
            CacheResource::Runtime(r) => r.encode_to_vec(),
        };
        Any { type_url, value }
    }
}

/// One named resource plus its encoded form, held in a [`ResourceSlot`].
#[derive(Debug, Clone, PartialEq)]
pub struct SlotEntry {
    pub name: String,
    pub resource: CacheResource,
}

/// One of the cache's six fixed slots: a version string plus the named
/// resources Envoy will be served for that family.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSlot {
    pub family: ResourceFamily,
    pub version: String,
    pub entries: Vec<SlotEntry>,
}

impl ResourceSlot {
    fn content_equals(&self, other: &ResourceSlot) -> bool {
        let mut ours: Vec<&SlotEntry> = self.entries.iter().collect();
        let mut theirs: Vec<&SlotEntry> = other.entries.iter().collect();
        ours.sort_by(|a, b| a.name.cmp(&b.name));
        theirs.sort_by(|a, b| a.name.cmp(&b.name));
        ours.len() == theirs.len() && ours.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }
}

/// A fully built, per-node xDS snapshot: one slot per resource family, in
/// the fixed [`FAMILY_ORDER`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub node_id: NodeId,
    pub version: String,
    slots: [ResourceSlot; 6],
}

impl Snapshot {
    pub fn slot(&self, family: ResourceFamily) -> &ResourceSlot {
        &self.slots[slot_index(family)]
    }

    /// True when every slot's resource content (name + decoded value) is
    /// identical, ignoring both the revision version and the per-slot
    /// version strings derived from it.
    pub fn content_equals(&self, other: &Snapshot) -> bool {
        self.node_id == other.node_id
            && FAMILY_ORDER.into_iter().all(|family| self.slot(family).content_equals(other.slot(family)))
    }

    pub fn builder(node_id: NodeId, revision_version: String) -> SnapshotBuilder {
        SnapshotBuilder::new(node_id, revision_version)
    }
}

fn slot_index(family: ResourceFamily) -> usize {
    FAMILY_ORDER.iter().position(|f| *f == family).expect("FAMILY_ORDER covers every family")
}

/// Accumulates named resources per family, then derives slot versions and
/// builds the immutable [`Snapshot`].
pub struct SnapshotBuilder {
    node_id: NodeId,
    revision_version: String,
    entries: [Vec<SlotEntry>; 6],
}

impl SnapshotBuilder {
    fn new(node_id: NodeId, revision_version: String) -> Self {
        Self { node_id, revision_version, entries: Default::default() }
    }

    pub fn push(&mut self, family: ResourceFamily, name: String, resource: CacheResource) {
        self.entries[slot_index(family)].push(SlotEntry { name, resource });
    }

    pub fn build(mut self) -> Snapshot {
        let slots: [ResourceSlot; 6] = std::array::from_fn(|i| {
            let family = FAMILY_ORDER[i];
            let entries = std::mem::take(&mut self.entries[i]);
            let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            let version = slot_version(family, &self.revision_version, &names);
            ResourceSlot { family, version, entries }
        });
        Snapshot { node_id: self.node_id.clone(), version: self.revision_version.clone(), slots }
    }
}

fn slot_version(family: ResourceFamily, revision_version: &str, names: &[&str]) -> String {
    match family {
        ResourceFamily::Secrets => {
            if names.is_empty() {
                format!("{}{}", revision_version, EMPTY_SECRETS_SUFFIX)
            } else {
                format!("{}-{}", revision_version, sorted_name_digest(names))
            }
        }
        _ => revision_version.to_string(),
    }
}

/// First 10 hex characters of the SHA-256 digest of the sorted, comma-joined
/// resource names. Used so a secret's *content* changing (without the
/// revision's own version changing) still yields a distinct slot version.
fn sorted_name_digest(names: &[&str]) -> String {
    let mut sorted: Vec<&str> = names.to_vec();
    sorted.sort_unstable();
    let joined = sorted.join(",");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..10].to_string()
}
