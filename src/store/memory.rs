//! In-memory `RevisionStore`/`SecretStore` reference implementation.
//!
//! Sufficient to drive the work queue (A5), the secret-change watcher (C5),
//! and every scenario in the testable-properties section: a `DashMap` per
//! object type plus a `broadcast` channel per watch stream, matching the
//! concurrency primitives the rest of the crate already uses for the
//! snapshot cache.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::id::{Name, NamespacedName, Namespace};
use crate::domain::resources::SecretRef;
use crate::domain::revision::Revision;
use crate::domain::secret::SecretObject;
use crate::errors::{RevisionError, Result};

use super::{RevisionEvent, RevisionStore, SecretEvent, SecretStore, StatusPatch};

const WATCH_CAPACITY: usize = 256;

/// In-memory stand-in for the cluster-orchestration API. Cheap to clone
/// (internally `Arc`-free by design: callers share one instance behind
/// their own `Arc<MemoryStore>`).
pub struct MemoryStore {
    revisions: DashMap<NamespacedName, Revision>,
    revision_events: broadcast::Sender<RevisionEvent>,
    secrets: DashMap<(Namespace, Name), SecretObject>,
    secret_events: broadcast::Sender<SecretEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            revisions: DashMap::new(),
            revision_events: broadcast::channel(WATCH_CAPACITY).0,
            secrets: DashMap::new(),
            secret_events: broadcast::channel(WATCH_CAPACITY).0,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a revision and notifies watchers. Used by tests
    /// and by whatever external process stands in for the promotion
    /// controller in a standalone deployment.
    pub fn put_revision(&self, revision: Revision) {
        let key = revision.key.clone();
        let event = if self.revisions.contains_key(&key) {
            RevisionEvent::Updated(key.clone())
        } else {
            RevisionEvent::Created(key.clone())
        };
        self.revisions.insert(key, revision);
        let _ = self.revision_events.send(event);
    }

    pub fn delete_revision(&self, key: &NamespacedName) {
        if self.revisions.remove(key).is_some() {
            let _ = self.revision_events.send(RevisionEvent::Deleted(key.clone()));
        }
    }

    /// Inserts or replaces a secret object and notifies watchers (the
    /// trigger C5 reacts to).
    pub fn put_secret(&self, secret: SecretObject) {
        let key = (secret.namespace.clone(), secret.name.clone());
        let secret_ref = SecretRef { namespace: secret.namespace.clone(), name: secret.name.clone() };
        self.secrets.insert(key, secret);
        let _ = self.secret_events.send(SecretEvent { secret_ref });
    }
}

#[async_trait::async_trait]
impl RevisionStore for MemoryStore {
    async fn get(&self, key: &NamespacedName) -> Result<Option<Revision>> {
        Ok(self.revisions.get(key).map(|entry| entry.clone()))
    }

    async fn list(&self) -> Result<Vec<Revision>> {
        Ok(self.revisions.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn patch_status(&self, key: &NamespacedName, patch: StatusPatch) -> Result<()> {
        let mut entry = self
            .revisions
            .get_mut(key)
            .ok_or_else(|| RevisionError::PatchStatus(key.to_string(), "revision not found".to_string()))?;
        patch(&mut entry.status);
        drop(entry);
        let _ = self.revision_events.send(RevisionEvent::Updated(key.clone()));
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<RevisionEvent> {
        self.revision_events.subscribe()
    }
}

#[async_trait::async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, secret_ref: &SecretRef) -> Result<SecretObject> {
        self.secrets
            .get(&(secret_ref.namespace.clone(), secret_ref.name.clone()))
            .map(|entry| entry.clone())
            .ok_or_else(|| RevisionError::secret_not_found(secret_ref.namespace.as_str(), secret_ref.name.as_str()))
    }

    fn watch(&self) -> broadcast::Receiver<SecretEvent> {
        self.secret_events.subscribe()
    }
}
