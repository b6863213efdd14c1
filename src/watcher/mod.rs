//! # Secret-Change Watcher (C5)
//!
//! Maps orchestrator secret mutation events to the revisions that reference
//! them and marks those revisions out-of-sync. Maintains the reverse index
//! design note from the core's architecture: `secret-ref -> set<revision
//! key>`, rebuilt from each revision's `envoy_resources.secrets[].ref` on
//! create/update and trimmed on delete, so a secret event never has to
//! scan every revision in the store.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::id::NamespacedName;
use crate::domain::resources::SecretRef;
use crate::observability::metrics;
use crate::store::{RevisionEvent, RevisionStore, SecretStore};

/// The reverse index from a secret reference to the revisions that
/// currently declare it. Thread-safe and cheap to clone (`Arc`-backed
/// internally via `DashMap`).
#[derive(Default)]
pub struct SecretIndex {
    by_secret: DashMap<SecretRef, HashSet<NamespacedName>>,
}

impl SecretIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of secret references attributed to `key`, first
    /// removing any stale attribution left over from a previous version of
    /// the same revision.
    pub fn reindex(&self, key: &NamespacedName, secret_refs: &[SecretRef]) {
        self.remove(key);
        for secret_ref in secret_refs {
            self.by_secret.entry(secret_ref.clone()).or_default().insert(key.clone());
        }
    }

    /// Removes every attribution for `key`, used on revision delete.
    pub fn remove(&self, key: &NamespacedName) {
        self.by_secret.retain(|_, revisions| {
            revisions.remove(key);
            !revisions.is_empty()
        });
    }

    pub fn revisions_referencing(&self, secret_ref: &SecretRef) -> Vec<NamespacedName> {
        self.by_secret.get(secret_ref).map(|entry| entry.iter().cloned().collect()).unwrap_or_default()
    }
}

/// Keeps a [`SecretIndex`] current by following the revision store's watch
/// channel. Runs until `cancel` fires.
pub async fn run_index_builder(
    revisions: Arc<dyn RevisionStore>,
    index: Arc<SecretIndex>,
    cancel: CancellationToken,
) {
    // Seed the index from whatever revisions already exist before
    // following the live watch channel.
    if let Ok(existing) = revisions.list().await {
        for revision in existing {
            let refs: Vec<SecretRef> =
                revision.spec.resources.secrets.iter().map(|entry| entry.reference.clone()).collect();
            index.reindex(&revision.key, &refs);
        }
    }

    let mut events = revisions.watch();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                match event {
                    Ok(RevisionEvent::Created(key)) | Ok(RevisionEvent::Updated(key)) => {
                        match revisions.get(&key).await {
                            Ok(Some(revision)) => {
                                let refs: Vec<SecretRef> = revision
                                    .spec
                                    .resources
                                    .secrets
                                    .iter()
                                    .map(|entry| entry.reference.clone())
                                    .collect();
                                index.reindex(&key, &refs);
                            }
                            Ok(None) => index.remove(&key),
                            Err(err) => warn!(key = %key, error = %err, "failed to refresh secret index"),
                        }
                    }
                    Ok(RevisionEvent::Deleted(key)) => index.remove(&key),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "secret index builder missed revision events; index may be briefly stale");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Subscribes to `secrets.watch()` and marks every revision the index
/// attributes to the mutated secret as out-of-sync. Idempotent: patching an
/// already-out-of-sync revision is a harmless overwrite.
pub async fn run_secret_watcher(
    secrets: Arc<dyn SecretStore>,
    revisions: Arc<dyn RevisionStore>,
    index: Arc<SecretIndex>,
    cancel: CancellationToken,
) {
    let mut events = secrets.watch();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let affected = index.revisions_referencing(&event.secret_ref);
                        for key in affected {
                            let result = revisions
                                .patch_status(&key, Box::new(|status| {
                                    status.set_resources_out_of_sync(
                                        "SecretChanged",
                                        "a referenced secret was mutated",
                                        Utc::now(),
                                    );
                                }))
                                .await;
                            match result {
                                Ok(()) => {
                                    metrics::record_secret_invalidation();
                                    info!(key = %key, secret = %event.secret_ref.name, "marked revision out of sync");
                                }
                                Err(err) => warn!(key = %key, error = %err, "failed to mark revision out of sync"),
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "secret watcher missed mutation events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::RevisionStatus;
    use crate::domain::id::NodeId;
    use crate::domain::resources::{EnvoyResources, SecretEntry, Serialization};
    use crate::domain::revision::{Revision, RevisionSpec};
    use crate::domain::secret::{SecretObject, SecretType, TlsPair};
    use crate::domain::{Name, Namespace};
    use crate::store::memory::MemoryStore;
    use std::time::Duration;

    fn revision_with_secret(key: NamespacedName, secret_ref: SecretRef) -> Revision {
        let mut resources = EnvoyResources::default();
        resources.secrets = vec![SecretEntry { name: "server-cert".to_string(), reference: secret_ref }];
        Revision {
            key,
            spec: RevisionSpec {
                node_id: NodeId::new("node-1"),
                version: "v1".to_string(),
                serialization: Serialization::Json,
                resources,
            },
            status: RevisionStatus::default(),
        }
    }

    #[test]
    fn reindex_replaces_stale_attributions() {
        let index = SecretIndex::new();
        let key = NamespacedName::new("default", "edge");
        let old_ref = SecretRef::new("default", "old-cert");
        let new_ref = SecretRef::new("default", "new-cert");

        index.reindex(&key, &[old_ref.clone()]);
        assert_eq!(index.revisions_referencing(&old_ref), vec![key.clone()]);

        index.reindex(&key, &[new_ref.clone()]);
        assert!(index.revisions_referencing(&old_ref).is_empty());
        assert_eq!(index.revisions_referencing(&new_ref), vec![key]);
    }

    #[test]
    fn remove_drops_every_attribution_for_a_key() {
        let index = SecretIndex::new();
        let key = NamespacedName::new("default", "edge");
        let secret_ref = SecretRef::new("default", "cert");
        index.reindex(&key, &[secret_ref.clone()]);
        index.remove(&key);
        assert!(index.revisions_referencing(&secret_ref).is_empty());
    }

    #[tokio::test]
    async fn secret_mutation_flips_only_referencing_revisions_out_of_sync() {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(SecretIndex::new());

        let referencing_key = NamespacedName::new("default", "ecr");
        let other_key = NamespacedName::new("default", "unrelated");
        let secret_ref = SecretRef::new("default", "secret");

        store.put_revision(revision_with_secret(referencing_key.clone(), secret_ref.clone()));
        store.put_revision(revision_with_secret(other_key.clone(), SecretRef::new("default", "other-secret")));
        store.put_secret(SecretObject {
            namespace: Namespace::new("default"),
            name: Name::new("secret"),
            secret_type: SecretType::TlsPair,
            tls: Some(TlsPair { cert_pem: "CERT".to_string(), key_pem: "KEY".to_string() }),
        });

        let cancel = CancellationToken::new();
        let index_builder = tokio::spawn(run_index_builder(store.clone(), index.clone(), cancel.clone()));
        let watcher = tokio::spawn(run_secret_watcher(store.clone(), store.clone(), index.clone(), cancel.clone()));

        // give the background tasks a moment to seed the index and observe the mutation
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.put_secret(SecretObject {
            namespace: Namespace::new("default"),
            name: Name::new("secret"),
            secret_type: SecretType::TlsPair,
            tls: Some(TlsPair { cert_pem: "CERT2".to_string(), key_pem: "KEY2".to_string() }),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let _ = tokio::join!(index_builder, watcher);

        let referencing = RevisionStore::get(&*store, &referencing_key).await.unwrap().unwrap();
        assert!(referencing.status.is_true(crate::domain::condition::ConditionType::ResourcesOutOfSync));

        let other = RevisionStore::get(&*store, &other_key).await.unwrap().unwrap();
        assert!(!other.status.is_true(crate::domain::condition::ConditionType::ResourcesOutOfSync));
    }
}
