//! # Orchestrator Boundary (A4)
//!
//! `RevisionStore` and `SecretStore` stand in for the cluster-orchestration
//! API client named out of scope in the core's purpose statement: a
//! concrete deployment backs these traits with its own client (e.g. a
//! Kubernetes watch over `EnvoyConfigRevision` custom resources); this crate
//! ships only the trait contract plus [`memory::MemoryStore`], an in-memory
//! reference implementation used by the binary's default mode and by every
//! test in this repository.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::id::NamespacedName;
use crate::domain::resources::SecretRef;
use crate::domain::revision::Revision;
use crate::domain::secret::SecretObject;
use crate::domain::RevisionStatus;
use crate::errors::Result;

/// A create/update/delete notification from the revision store's watch
/// channel. Carries only the key: the secret watcher (C5) and the work
/// queue (A5) both re-fetch via `get` rather than trusting a stale payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionEvent {
    Created(NamespacedName),
    Updated(NamespacedName),
    Deleted(NamespacedName),
}

impl RevisionEvent {
    pub fn key(&self) -> &NamespacedName {
        match self {
            RevisionEvent::Created(key) | RevisionEvent::Updated(key) | RevisionEvent::Deleted(key) => key,
        }
    }
}

/// A mutation notification from the secret store's watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEvent {
    pub secret_ref: SecretRef,
}

/// A status-only mutation applied in place by [`RevisionStore::patch_status`].
/// Boxed rather than generic so the trait stays object-safe.
pub type StatusPatch = Box<dyn FnOnce(&mut RevisionStatus) + Send>;

/// The revision half of the orchestrator boundary: get/list/watch plus a
/// status-only patch, mirroring a Kubernetes custom resource's spec/status
/// split (callers never mutate `spec` through this trait).
#[async_trait]
pub trait RevisionStore: Send + Sync {
    async fn get(&self, key: &NamespacedName) -> Result<Option<Revision>>;
    async fn list(&self) -> Result<Vec<Revision>>;
    async fn patch_status(&self, key: &NamespacedName, patch: StatusPatch) -> Result<()>;
    fn watch(&self) -> broadcast::Receiver<RevisionEvent>;
}

/// The secret half of the orchestrator boundary.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, secret_ref: &SecretRef) -> Result<SecretObject>;
    fn watch(&self) -> broadcast::Receiver<SecretEvent>;
}
