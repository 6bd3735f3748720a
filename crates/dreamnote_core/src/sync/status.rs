//! Per-thought background sync status.
//!
//! Lets the UI distinguish "syncing", "synced" and "sync failed, retry
//! later" without blocking on the remote write. Remote deletes that failed
//! are queued here until a retry removes them.

use super::remote_store::SyncError;
use crate::model::thought::ThoughtId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Resolution state of the latest remote write for one thought.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Syncing,
    Synced,
    Failed { message: String },
}

impl SyncStatus {
    pub fn failed(err: &SyncError) -> Self {
        Self::Failed {
            message: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Counts by status, for a compact status indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub syncing: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Called on every status transition.
pub type StatusListener = Arc<dyn Fn(&ThoughtId, &SyncStatus) + Send + Sync>;

/// Thread-safe status table with an optional transition listener.
#[derive(Default)]
pub struct SyncStatusTracker {
    statuses: Mutex<HashMap<ThoughtId, SyncStatus>>,
    removals: Mutex<BTreeSet<ThoughtId>>,
    listener: Mutex<Option<StatusListener>>,
}

impl SyncStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&self, listener: StatusListener) {
        *lock(&self.listener) = Some(listener);
    }

    pub fn clear_listener(&self) {
        lock(&self.listener).take();
    }

    /// Stores `status` for `id` and notifies the listener outside the lock.
    pub fn record(&self, id: &ThoughtId, status: SyncStatus) {
        lock(&self.statuses).insert(id.clone(), status.clone());
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener(id, &status);
        }
    }

    pub fn status(&self, id: &ThoughtId) -> Option<SyncStatus> {
        lock(&self.statuses).get(id).cloned()
    }

    /// Ids whose latest write failed, sorted for determinism.
    pub fn failed_ids(&self) -> Vec<ThoughtId> {
        let mut ids: Vec<ThoughtId> = lock(&self.statuses)
            .iter()
            .filter(|(_, status)| status.is_failed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn forget(&self, id: &ThoughtId) {
        lock(&self.statuses).remove(id);
    }

    /// Queues a remote delete that has to be issued again.
    pub fn queue_removal(&self, id: &ThoughtId) {
        lock(&self.removals).insert(id.clone());
    }

    pub fn removal_done(&self, id: &ThoughtId) {
        lock(&self.removals).remove(id);
    }

    /// Ids whose remote delete is still outstanding, sorted.
    pub fn pending_removals(&self) -> Vec<ThoughtId> {
        lock(&self.removals).iter().cloned().collect()
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for status in lock(&self.statuses).values() {
            match status {
                SyncStatus::Syncing => summary.syncing += 1,
                SyncStatus::Synced => summary.synced += 1,
                SyncStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Handle to one background remote write.
#[derive(Debug)]
pub struct PendingSync {
    pub thought_id: ThoughtId,
    handle: JoinHandle<SyncStatus>,
}

impl PendingSync {
    pub fn new(thought_id: ThoughtId, handle: JoinHandle<SyncStatus>) -> Self {
        Self { thought_id, handle }
    }

    /// Waits for the background write to resolve.
    pub async fn wait(self) -> SyncStatus {
        match self.handle.await {
            Ok(status) => status,
            Err(err) => SyncStatus::Failed {
                message: format!("background sync task ended abnormally: {err}"),
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
