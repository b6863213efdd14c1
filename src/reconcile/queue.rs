//! # Work Queue (A5)
//!
//! An at-most-one-in-flight-per-key reconcile scheduler. Distinct keys run
//! in parallel across a fixed pool of worker tasks; a key already being
//! processed is re-queued behind a short delay instead of running a second
//! worker on it concurrently. Infrastructure errors from `reconcile()` are
//! requeued with exponential backoff; user-data faults (already resolved to
//! a taint inside `reconcile()`) are never requeued.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::cache::SnapshotCache;
use crate::config::ReconcileConfig;
use crate::domain::id::NamespacedName;
use crate::reconcile::reconcile;
use crate::store::{RevisionStore, SecretStore};

/// Delay before a key whose worker slot is already taken is retried. Short
/// relative to reconcile backoff: this is lock contention, not a fault.
const REQUEUE_CONTENDED_DELAY: Duration = Duration::from_millis(25);

/// Shared handles every worker needs to run a reconcile pass.
struct WorkerContext {
    revisions: Arc<dyn RevisionStore>,
    secrets: Arc<dyn SecretStore>,
    cache: SnapshotCache,
}

/// The reconcile work queue. Clone to hand `enqueue` to the revision-store
/// watch loop that feeds it; the queue itself owns the worker pool and
/// stops it when dropped (workers observe their `CancellationToken`).
#[derive(Clone)]
pub struct ReconcileQueue {
    sender: mpsc::UnboundedSender<NamespacedName>,
}

impl ReconcileQueue {
    /// Spawns `config.workers` worker tasks and returns a handle to enqueue
    /// keys onto them. `cancel` stops all workers once fired; in-flight
    /// reconciles are allowed to finish (per the concurrency model's
    /// cancellation contract).
    pub fn spawn(
        config: ReconcileConfig,
        revisions: Arc<dyn RevisionStore>,
        secrets: Arc<dyn SecretStore>,
        cache: SnapshotCache,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let active = Arc::new(DashSet::new());
        let attempts: Arc<DashMap<NamespacedName, AtomicU32>> = Arc::new(DashMap::new());
        let context = Arc::new(WorkerContext { revisions, secrets, cache });

        for worker_id in 0..config.workers {
            tokio::spawn(worker_loop(
                worker_id,
                receiver.clone(),
                sender.clone(),
                active.clone(),
                attempts.clone(),
                context.clone(),
                config.clone(),
                cancel.clone(),
            ));
        }

        Self { sender }
    }

    /// Enqueues `key` for reconciliation. A key that is already queued or
    /// in flight is simply reconciled again once its current pass finishes
    /// (reconcile is idempotent, so this is always safe).
    pub fn enqueue(&self, key: NamespacedName) {
        let _ = self.sender.send(key);
    }
}

/// Feeds the queue from the revision store: every create/update/delete event
/// enqueues its key, and a periodic full list resync (catching anything a
/// missed or lagged watch event dropped) does the same for every key in the
/// store. Runs until `cancel` fires.
pub async fn drive_from_store(
    queue: ReconcileQueue,
    revisions: Arc<dyn RevisionStore>,
    resync_interval: Duration,
    cancel: CancellationToken,
) {
    if let Ok(existing) = revisions.list().await {
        for revision in existing {
            queue.enqueue(revision.key);
        }
    }

    let mut events = revisions.watch();
    let mut resync = tokio::time::interval(resync_interval);
    resync.tick().await; // first tick fires immediately; the initial list() above already covers it

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = resync.tick() => {
                if let Ok(existing) = revisions.list().await {
                    for revision in existing {
                        queue.enqueue(revision.key);
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => queue.enqueue(event.key().clone()),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "reconcile driver missed revision events; relying on the next resync");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<NamespacedName>>>,
    sender: mpsc::UnboundedSender<NamespacedName>,
    active: Arc<DashSet<NamespacedName>>,
    attempts: Arc<DashMap<NamespacedName, AtomicU32>>,
    context: Arc<WorkerContext>,
    config: ReconcileConfig,
    cancel: CancellationToken,
) {
    loop {
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = async {
                let mut guard = receiver.lock().await;
                guard.recv().await
            } => match key {
                Some(key) => key,
                None => break,
            },
        };

        if !active.insert(key.clone()) {
            // Another worker already owns this key; try again shortly
            // rather than running two reconciles for it concurrently.
            let sender = sender.clone();
            tokio::spawn(async move {
                tokio::time::sleep(REQUEUE_CONTENDED_DELAY).await;
                let _ = sender.send(key);
            });
            continue;
        }

        let result = reconcile(&key, &*context.revisions, &*context.secrets, &context.cache).await;
        active.remove(&key);

        match result {
            Ok(_) => {
                attempts.remove(&key);
            }
            Err(err) if err.is_infra() => {
                let attempt =
                    attempts.entry(key.clone()).or_insert_with(|| AtomicU32::new(0)).fetch_add(1, Ordering::SeqCst);
                let backoff = backoff_for(&config, attempt);
                warn!(worker = worker_id, key = %key, error = %err, backoff_ms = backoff.as_millis() as u64, "reconcile failed, requeueing");
                let sender = sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    let _ = sender.send(key);
                });
            }
            Err(err) => {
                // reconcile() resolves every user-data fault to a taint and
                // an Ok outcome; an Err this isn't infra is a bug.
                error!(worker = worker_id, key = %key, error = %err, "reconcile returned a non-infra error");
            }
        }
    }
}

fn backoff_for(config: &ReconcileConfig, attempt: u32) -> Duration {
    let exponent = attempt.min(16);
    let scaled = config.backoff_base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(scaled.min(config.backoff_max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::RevisionStatus;
    use crate::domain::id::NodeId;
    use crate::domain::resources::{EnvoyResources, Serialization};
    use crate::domain::revision::{Revision, RevisionSpec};
    use crate::store::memory::MemoryStore;
    use std::time::Duration as StdDuration;

    fn published_revision(key: NamespacedName, node_id: &str) -> Revision {
        let mut status = RevisionStatus::default();
        status.set_published(true, chrono::Utc::now());
        Revision {
            key,
            spec: RevisionSpec {
                node_id: NodeId::new(node_id),
                version: "v1".to_string(),
                serialization: Serialization::Json,
                resources: EnvoyResources::default(),
            },
            status,
        }
    }

    #[test]
    fn backoff_grows_exponentially_up_to_the_configured_max() {
        let config = ReconcileConfig { workers: 1, backoff_base_ms: 100, backoff_max_ms: 1000 };
        assert_eq!(backoff_for(&config, 0), Duration::from_millis(100));
        assert_eq!(backoff_for(&config, 1), Duration::from_millis(200));
        assert_eq!(backoff_for(&config, 2), Duration::from_millis(400));
        assert_eq!(backoff_for(&config, 10), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn enqueued_published_revision_gets_reconciled() {
        let store = Arc::new(MemoryStore::new());
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "edge");
        store.put_revision(published_revision(key.clone(), "node-1"));

        let cancel = CancellationToken::new();
        let config = ReconcileConfig { workers: 2, backoff_base_ms: 50, backoff_max_ms: 500 };
        let queue = ReconcileQueue::spawn(config, store.clone(), store.clone(), cache.clone(), cancel.clone());

        queue.enqueue(key.clone());
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        cancel.cancel();

        let after = RevisionStore::get(&*store, &key).await.unwrap().unwrap();
        assert!(after.status.is_true(crate::domain::condition::ConditionType::ResourcesInSync));
    }

    #[tokio::test]
    async fn drive_from_store_enqueues_existing_revisions_and_later_events() {
        let store = Arc::new(MemoryStore::new());
        let cache = SnapshotCache::new();
        let key = NamespacedName::new("default", "edge");
        store.put_revision(published_revision(key.clone(), "node-1"));

        let cancel = CancellationToken::new();
        let config = ReconcileConfig { workers: 2, backoff_base_ms: 50, backoff_max_ms: 500 };
        let queue = ReconcileQueue::spawn(config, store.clone(), store.clone(), cache.clone(), cancel.clone());

        let driver = tokio::spawn(drive_from_store(
            queue,
            store.clone(),
            StdDuration::from_secs(3600),
            cancel.clone(),
        ));

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        cancel.cancel();
        let _ = driver.await;

        let after = RevisionStore::get(&*store, &key).await.unwrap().unwrap();
        assert!(after.status.is_true(crate::domain::condition::ConditionType::ResourcesInSync));
    }
}
