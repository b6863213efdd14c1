//! # Snapshot Cache (C3)
//!
//! Holds one versioned [`Snapshot`] per node, one fixed slot per xDS
//! resource family. `SnapshotCache::set` is idempotent: pushing a snapshot
//! whose content is identical to what is already cached for that node is a
//! no-op, so bumping a revision's version string without changing its
//! resources never triggers a redundant push to connected streams.

mod snapshot;

pub use snapshot::{CacheResource, ResourceSlot, Snapshot};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::id::NodeId;

const BROADCAST_CAPACITY: usize = 64;

/// Per-node snapshot store with change notification for connected xDS
/// streams. Cheap to clone: internally `Arc`-backed.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    snapshots: Arc<DashMap<NodeId, Arc<Snapshot>>>,
    channels: Arc<DashMap<NodeId, broadcast::Sender<Arc<Snapshot>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Arc<Snapshot>> {
        self.snapshots.get(node_id).map(|entry| entry.clone())
    }

    /// The slot version currently cached for `(node_id, family)`, if this
    /// node has a snapshot at all. What a discovery response's
    /// `version_info` is built from.
    pub fn version(&self, node_id: &NodeId, family: crate::domain::resources::ResourceFamily) -> Option<String> {
        self.get(node_id).map(|snapshot| snapshot.slot(family).version.clone())
    }

    /// Publishes `snapshot` for its node. Returns `true` if this changed the
    /// cached content (and so notified subscribers), `false` if the new
    /// snapshot is content-identical to what was already cached.
    pub fn set(&self, snapshot: Snapshot) -> bool {
        let node_id = snapshot.node_id.clone();
        let snapshot = Arc::new(snapshot);

        let changed = match self.snapshots.get(&node_id) {
            Some(existing) => !existing.content_equals(&snapshot),
            None => true,
        };

        if !changed {
            return false;
        }

        self.snapshots.insert(node_id.clone(), snapshot.clone());

        if let Some(sender) = self.channels.get(&node_id) {
            // No receivers is a normal, common case (no stream open for this
            // node yet); the send error is not an error for the cache.
            let _ = sender.send(snapshot);
        }

        true
    }

    /// Subscribes to snapshot updates for `node_id`. The stream handler
    /// should call [`SnapshotCache::get`] once up front to pick up whatever
    /// is already cached, then read from this receiver for subsequent pushes.
    pub fn subscribe(&self, node_id: &NodeId) -> broadcast::Receiver<Arc<Snapshot>> {
        self.channels
            .entry(node_id.clone())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    pub fn remove(&self, node_id: &NodeId) {
        self.snapshots.remove(node_id);
        self.channels.remove(node_id);
    }
}
