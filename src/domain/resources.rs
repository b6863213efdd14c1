//! The closed set of Envoy resource families and the textual resource bundle
//! a revision carries before decoding.

use crate::domain::id::{Name, Namespace};
use serde::{Deserialize, Serialize};

/// One of the six xDS resource families. A closed, tagged set rather than an
/// open-ended type hierarchy: decoding and the snapshot cache both dispatch
/// on this enum, and the cache's six slots are indexed by it in a fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFamily {
    Endpoints,
    Clusters,
    Routes,
    Listeners,
    Secrets,
    Runtimes,
}

/// The six families in the cache's fixed slot order.
pub const FAMILY_ORDER: [ResourceFamily; 6] = [
    ResourceFamily::Endpoints,
    ResourceFamily::Clusters,
    ResourceFamily::Routes,
    ResourceFamily::Listeners,
    ResourceFamily::Secrets,
    ResourceFamily::Runtimes,
];

impl ResourceFamily {
    /// The xDS v3 type URL Envoy uses to request this family.
    pub fn type_url(&self) -> &'static str {
        match self {
            ResourceFamily::Endpoints => {
                "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment"
            }
            ResourceFamily::Clusters => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            ResourceFamily::Routes => {
                "type.googleapis.com/envoy.config.route.v3.RouteConfiguration"
            }
            ResourceFamily::Listeners => "type.googleapis.com/envoy.config.listener.v3.Listener",
            ResourceFamily::Secrets => {
                "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret"
            }
            ResourceFamily::Runtimes => "type.googleapis.com/envoy.service.runtime.v3.Runtime",
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        FAMILY_ORDER.into_iter().find(|f| f.type_url() == type_url)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceFamily::Endpoints => "endpoints",
            ResourceFamily::Clusters => "clusters",
            ResourceFamily::Routes => "routes",
            ResourceFamily::Listeners => "listeners",
            ResourceFamily::Secrets => "secrets",
            ResourceFamily::Runtimes => "runtimes",
        }
    }
}

/// The textual encoding a revision's resource values are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Serialization {
    #[default]
    Json,
    Yaml,
}

/// A single named, not-yet-decoded resource value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    pub value: String,
}

/// A reference to a secret object living in the orchestrator's secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    pub namespace: Namespace,
    pub name: Name,
}

impl SecretRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: Namespace::new(namespace), name: Name::new(name) }
    }
}

/// A named secret slot entry: the local resource name Envoy will request,
/// paired with the orchestrator object that supplies the key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub name: String,
    pub reference: SecretRef,
}

/// The full set of resources declared by one revision, still in textual form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvoyResources {
    #[serde(default)]
    pub endpoints: Vec<ResourceEntry>,
    #[serde(default)]
    pub clusters: Vec<ResourceEntry>,
    #[serde(default)]
    pub routes: Vec<ResourceEntry>,
    #[serde(default)]
    pub listeners: Vec<ResourceEntry>,
    #[serde(default)]
    pub runtimes: Vec<ResourceEntry>,
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

impl EnvoyResources {
    pub fn entries(&self, family: ResourceFamily) -> &[ResourceEntry] {
        match family {
            ResourceFamily::Endpoints => &self.endpoints,
            ResourceFamily::Clusters => &self.clusters,
            ResourceFamily::Routes => &self.routes,
            ResourceFamily::Listeners => &self.listeners,
            ResourceFamily::Runtimes => &self.runtimes,
            ResourceFamily::Secrets => &[],
        }
    }

    /// Secret names referenced by this revision, used both to build the
    /// secrets cache slot and to index this revision in the secret watcher.
    pub fn referenced_secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.secrets.iter().map(|s| format!("{}/{}", s.reference.namespace, s.reference.name)).collect();
        names.sort();
        names.dedup();
        names
    }
}
