//! The `EnvoyConfigRevision` domain object: one declarative unit the
//! reconciler drives toward a published snapshot.

use serde::{Deserialize, Serialize};

use crate::domain::condition::RevisionStatus;
use crate::domain::id::{NamespacedName, NodeId};
use crate::domain::resources::{EnvoyResources, Serialization};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionSpec {
    pub node_id: NodeId,
    pub version: String,
    #[serde(default)]
    pub serialization: Serialization,
    #[serde(default)]
    pub resources: EnvoyResources,
}

#[derive(Debug, Clone)]
pub struct Revision {
    pub key: NamespacedName,
    pub spec: RevisionSpec,
    pub status: RevisionStatus,
}

impl Revision {
    pub fn new(key: NamespacedName, spec: RevisionSpec) -> Self {
        Self { key, spec, status: RevisionStatus::default() }
    }
}
