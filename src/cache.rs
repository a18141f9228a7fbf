//! Last-known-snapshot cache of the app's storage.
//!
//! The cache is the relay's only view of the app's state. It is owned by
//! the relay event loop and mutated exclusively by inbound `STORAGE_DATA`
//! messages; the panel observes it through a `watch` channel, which gives
//! latest-value semantics (a slow panel sees the newest snapshot, never a
//! backlog).

use tokio::sync::watch;

use crate::protocol::StorageSnapshot;

/// Holds the last full snapshot pushed by the app.
///
/// Starts empty, is replaced wholesale on every push (no partial merges),
/// and keeps its last value across peer disconnects so the panel can keep
/// showing stale-but-available data.
#[derive(Debug)]
pub(crate) struct StateCache {
    snapshot_tx: watch::Sender<StorageSnapshot>,
}

impl StateCache {
    /// Create an empty cache.
    pub(crate) fn new() -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(StorageSnapshot::new());
        Self { snapshot_tx }
    }

    /// Atomically overwrite the held snapshot and notify observers.
    ///
    /// Every push notifies, even when the contents are identical: the app
    /// re-sent its state and the panel re-renders, matching the original
    /// refresh-per-message behavior.
    pub(crate) fn replace(&mut self, snapshot: StorageSnapshot) {
        log::debug!("[Cache] Snapshot replaced ({} entries)", snapshot.len());
        self.snapshot_tx.send_replace(snapshot);
    }

    /// The currently held snapshot (empty until the first push).
    pub(crate) fn current(&self) -> StorageSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    ///
    /// Each receiver independently observes every replacement; the value at
    /// subscription time counts as already seen.
    pub(crate) fn subscribe(&self) -> watch::Receiver<StorageSnapshot> {
        self.snapshot_tx.subscribe()
    }
}
