//! # Revision Reconciler (C4)
//!
//! Drives one `EnvoyConfigRevision` to a published snapshot. `reconcile` is
//! the crate's one message-driven, idempotent entry point: given a key and
//! the current world state (the two orchestrator stores plus the snapshot
//! cache), it either republishes, skips, taints, or declines to touch
//! anything, and never panics on user-supplied data.

pub mod queue;

use chrono::Utc;

use crate::cache::SnapshotCache;
use crate::decode;
use crate::domain::condition::ConditionType;
use crate::domain::id::NamespacedName;
use crate::domain::resources::{ResourceFamily, FAMILY_ORDER};
use crate::domain::revision::Revision;
use crate::errors::{RevisionError, Result};
use crate::observability::metrics;
use crate::secrets;
use crate::store::{RevisionStore, SecretStore};

/// The non-error result of one reconcile pass, named so callers (the work
/// queue, tests) can tell a Published run from a no-op one without
/// inspecting side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No revision exists at this key; nothing to do.
    Gone,
    /// The revision exists but is not `RevisionPublished`; left untouched.
    Unpublished,
    /// One or more resources failed to materialize; the revision was tainted.
    Tainted,
    /// The materialized snapshot differed from the cached one and was published.
    Published,
    /// The materialized snapshot was content-identical to the cached one.
    Skipped,
}

impl ReconcileOutcome {
    fn metric_label(self) -> &'static str {
        match self {
            ReconcileOutcome::Gone => "gone",
            ReconcileOutcome::Unpublished => "unpublished",
            ReconcileOutcome::Tainted => "tainted",
            ReconcileOutcome::Published => "published",
            ReconcileOutcome::Skipped => "skipped",
        }
    }
}

/// Runs one reconcile pass for `key` against the given stores and cache.
/// Only infrastructure errors (`RevisionError::is_infra`) are returned as
/// `Err`; every user-data fault is resolved to `Ok(ReconcileOutcome::Tainted)`
/// with the fault recorded as a taint on the revision's status.
pub async fn reconcile(
    key: &NamespacedName,
    revisions: &dyn RevisionStore,
    secret_store: &dyn SecretStore,
    cache: &SnapshotCache,
) -> Result<ReconcileOutcome> {
    let outcome = reconcile_inner(key, revisions, secret_store, cache).await?;
    metrics::record_reconcile_outcome(outcome.metric_label());
    Ok(outcome)
}

async fn reconcile_inner(
    key: &NamespacedName,
    revisions: &dyn RevisionStore,
    secret_store: &dyn SecretStore,
    cache: &SnapshotCache,
) -> Result<ReconcileOutcome> {
    let revision = match revisions.get(key).await? {
        Some(revision) => revision,
        None => return Ok(ReconcileOutcome::Gone),
    };

    if !revision.status.is_true(ConditionType::RevisionPublished) {
        return Ok(ReconcileOutcome::Unpublished);
    }

    let build_result = build_snapshot(&revision, secret_store).await?;

    let snapshot = match build_result {
        Ok(snapshot) => snapshot,
        Err(failures) => {
            taint(revisions, key, &failures).await?;
            return Ok(ReconcileOutcome::Tainted);
        }
    };

    let current = cache.get(&revision.spec.node_id);
    let unchanged = current.as_ref().is_some_and(|current| current.content_equals(&snapshot));

    if !unchanged {
        cache.set(snapshot);
    }

    let key = key.clone();
    revisions
        .patch_status(&key, Box::new(move |status| status.set_resources_in_sync(Utc::now())))
        .await?;

    Ok(if unchanged { ReconcileOutcome::Skipped } else { ReconcileOutcome::Published })
}

/// Builds a fresh snapshot from `revision`'s resource bundle. Returns
/// `Ok(Err(failures))`, not `Err`, when resources fail to materialize: that
/// is a user-data fault the caller resolves to a taint, not an infra error.
/// A `SecretStore` transport failure is the one infra path threaded through
/// here and is propagated as `Err` directly.
async fn build_snapshot(
    revision: &Revision,
    secret_store: &dyn SecretStore,
) -> Result<std::result::Result<crate::cache::Snapshot, Vec<RevisionError>>> {
    let mut builder =
        crate::cache::Snapshot::builder(revision.spec.node_id.clone(), revision.spec.version.clone());
    let mut failures = Vec::new();

    for family in FAMILY_ORDER {
        if family == ResourceFamily::Secrets {
            continue;
        }
        for (index, entry) in revision.spec.resources.entries(family).iter().enumerate() {
            let path = format!("spec.resources.{}[{}].value", family.as_str(), index);
            match decode::decode(family, &entry.name, &path, &entry.value, revision.spec.serialization) {
                Ok(decoded) => builder.push(family, entry.name.clone(), decoded.into()),
                Err(err) => failures.push(err),
            }
        }
    }

    for secret_entry in &revision.spec.resources.secrets {
        match secret_store.get(&secret_entry.reference).await {
            Ok(secret_object) => {
                match secrets::resolve(&secret_entry.reference, &secret_entry.name, &secret_object) {
                    Ok(secret) => builder.push(
                        ResourceFamily::Secrets,
                        secret_entry.name.clone(),
                        crate::cache::CacheResource::Secret(secret),
                    ),
                    Err(err) => failures.push(err),
                }
            }
            Err(err) if err.is_infra() => return Err(err),
            Err(err) => failures.push(err),
        }
    }

    if failures.is_empty() {
        Ok(Ok(builder.build()))
    } else {
        Ok(Err(failures))
    }
}

async fn taint(revisions: &dyn RevisionStore, key: &NamespacedName, failures: &[RevisionError]) -> Result<()> {
    let message = failures.iter().map(|err| err.to_string()).collect::<Vec<_>>().join("; ");
    let key = key.clone();
    revisions
        .patch_status(
            &key,
            Box::new(move |status| status.set_tainted("ResourceMaterializationFailed", &message, Utc::now())),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheResource;
    use crate::domain::condition::RevisionStatus;
    use crate::domain::id::NodeId;
    use crate::domain::resources::{
        EnvoyResources, ResourceEntry, SecretEntry, SecretRef, Serialization,
    };
    use crate::domain::revision::RevisionSpec;
    use crate::domain::secret::{SecretObject, SecretType, TlsPair};
    use crate::domain::{Name, Namespace};
    use crate::store::memory::MemoryStore;
    use envoy_types::pb::envoy::config::cluster::v3::Cluster;

    fn published_revision(key: NamespacedName, node_id: &str, version: &str) -> Revision {
        let mut status = RevisionStatus::default();
        status.set_published(true, Utc::now());
        Revision {
            key,
            spec: RevisionSpec {
                node_id: NodeId::new(node_id),
                version: version.to_string(),
                serialization: Serialization::Json,
                resources: EnvoyResources::default(),
            },
            status,
        }
    }

    fn cluster_entry(name: &str) -> ResourceEntry {
        ResourceEntry { name: name.to_string(), value: format!(r#"{{"name":"{name}"}}"#) }
    }

    #[tokio::test]
    async fn absent_revision_is_gone_and_leaves_the_cache_untouched() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "missing");

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Gone);
    }

    #[tokio::test]
    async fn unpublished_revision_never_touches_the_cache_or_status() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "edge");
        let mut revision = published_revision(key.clone(), "node-1", "v1");
        revision.status = RevisionStatus::default(); // not published
        store.put_revision(revision);

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unpublished);
        assert!(cache.get(&NodeId::new("node-1")).is_none());

        let after = RevisionStore::get(&store, &key).await.unwrap().unwrap();
        assert!(!after.status.is_true(ConditionType::ResourcesInSync));
        assert!(!after.status.is_true(ConditionType::RevisionTainted));
    }

    #[tokio::test]
    async fn new_node_publish_materializes_every_family_at_the_revisions_version() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "edge");
        let mut revision = published_revision(key.clone(), "node3", "xxxx");
        revision.spec.resources.endpoints = vec![ResourceEntry {
            name: "endpoint".to_string(),
            value: r#"{"cluster_name":"endpoint"}"#.to_string(),
        }];
        store.put_revision(revision);

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Published);

        let snapshot = cache.get(&NodeId::new("node3")).unwrap();
        assert_eq!(snapshot.slot(ResourceFamily::Endpoints).version, "xxxx");
        assert_eq!(snapshot.slot(ResourceFamily::Endpoints).entries.len(), 1);
        assert_eq!(snapshot.slot(ResourceFamily::Runtimes).version, "xxxx");
        assert_eq!(snapshot.slot(ResourceFamily::Secrets).version, "xxxx-74d569cc4");

        let after = RevisionStore::get(&store, &key).await.unwrap().unwrap();
        assert!(after.status.is_true(ConditionType::ResourcesInSync));
    }

    #[tokio::test]
    async fn idempotent_no_op_leaves_the_stored_snapshot_at_its_original_version() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();

        let mut builder = crate::cache::Snapshot::builder(NodeId::new("node1"), "aaaa".to_string());
        builder.push(
            ResourceFamily::Endpoints,
            "endpoint1".to_string(),
            CacheResource::Endpoint(Default::default()),
        );
        builder.push(ResourceFamily::Clusters, "cluster1".to_string(), CacheResource::Cluster(Cluster {
            name: "cluster1".to_string(),
            ..Default::default()
        }));
        cache.set(builder.build());

        let key = NamespacedName::new("default", "edge");
        let mut revision = published_revision(key.clone(), "node1", "bbbb");
        revision.spec.resources.endpoints =
            vec![ResourceEntry { name: "endpoint1".to_string(), value: "{}".to_string() }];
        revision.spec.resources.clusters = vec![cluster_entry("cluster1")];
        store.put_revision(revision);

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Skipped);
        assert_eq!(cache.get(&NodeId::new("node1")).unwrap().version, "aaaa");
    }

    #[tokio::test]
    async fn bad_json_taints_without_an_infra_error() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "edge");
        let mut revision = published_revision(key.clone(), "node1", "v1");
        revision.spec.resources.endpoints =
            vec![ResourceEntry { name: "bad".to_string(), value: "giberish".to_string() }];
        store.put_revision(revision);

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Tainted);
        assert!(cache.get(&NodeId::new("node1")).is_none());

        let after = RevisionStore::get(&store, &key).await.unwrap().unwrap();
        assert!(after.status.is_true(ConditionType::RevisionTainted));
    }

    #[tokio::test]
    async fn wrong_type_secret_taints_without_touching_the_cache() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();
        store.put_secret(SecretObject {
            namespace: Namespace::new("default"),
            name: Name::new("basic-auth"),
            secret_type: SecretType::Opaque,
            tls: None,
        });

        let key = NamespacedName::new("default", "edge");
        let mut revision = published_revision(key.clone(), "node1", "v1");
        revision.spec.resources.secrets = vec![SecretEntry {
            name: "server-cert".to_string(),
            reference: SecretRef::new("default", "basic-auth"),
        }];
        store.put_revision(revision);

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Tainted);
        assert!(cache.get(&NodeId::new("node1")).is_none());
    }

    #[tokio::test]
    async fn a_tls_pair_secret_publishes_with_a_content_derived_slot_version() {
        let store = MemoryStore::new();
        let cache = SnapshotCache::new();
        store.put_secret(SecretObject {
            namespace: Namespace::new("default"),
            name: Name::new("tls-pair"),
            secret_type: SecretType::TlsPair,
            tls: Some(TlsPair { cert_pem: "CERT".to_string(), key_pem: "KEY".to_string() }),
        });

        let key = NamespacedName::new("default", "edge");
        let mut revision = published_revision(key.clone(), "node1", "v1");
        revision.spec.resources.secrets = vec![SecretEntry {
            name: "server-cert".to_string(),
            reference: SecretRef::new("default", "tls-pair"),
        }];
        store.put_revision(revision);

        let outcome = reconcile(&key, &store, &store, &cache).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Published);

        let snapshot = cache.get(&NodeId::new("node1")).unwrap();
        assert!(snapshot.slot(ResourceFamily::Secrets).version.starts_with("v1-"));
    }

    #[tokio::test]
    async fn fetch_revision_infra_error_propagates_for_requeue() {
        struct FailingRevisionStore;
        #[async_trait::async_trait]
        impl RevisionStore for FailingRevisionStore {
            async fn get(&self, key: &NamespacedName) -> Result<Option<Revision>> {
                Err(RevisionError::FetchRevision(key.to_string(), "timeout".to_string()))
            }
            async fn list(&self) -> Result<Vec<Revision>> {
                Ok(vec![])
            }
            async fn patch_status(&self, _: &NamespacedName, _: crate::store::StatusPatch) -> Result<()> {
                Ok(())
            }
            fn watch(&self) -> tokio::sync::broadcast::Receiver<crate::store::RevisionEvent> {
                tokio::sync::broadcast::channel(1).1
            }
        }

        let store = FailingRevisionStore;
        let secrets = MemoryStore::new();
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "edge");
        let err = reconcile(&key, &store, &secrets, &cache).await.unwrap_err();
        assert!(err.is_infra());
    }
}
