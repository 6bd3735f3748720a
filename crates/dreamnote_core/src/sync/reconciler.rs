//! Read-time reconciliation of LocalStore and RemoteStore.
//!
//! # Responsibility
//! - Combine the latest remote snapshot with the local "unsynced tail".
//! - Recompute whenever either source changes and publish the result.
//! - Fall back to a local-only view while the remote is unreachable.
//!
//! # Invariants
//! - Every id in local ∪ remote appears exactly once.
//! - The view is sorted by timestamp descending, exact ties by id.
//! - Remote records win over local records with the same id, except while
//!   a local write of that id is not yet confirmed by a remote snapshot.
//! - The view is derived state: never persisted, never written back.

use super::remote_store::{RemoteStore, Subscription};
use crate::model::thought::{newest_first, Thought, ThoughtId};
use crate::repo::thought_repo::LocalStore;
use log::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Merges a remote snapshot with local records into one ordered view.
///
/// Local records whose id is absent from `remote` form the unsynced tail.
pub fn reconcile(local: &[Thought], remote: &[Thought]) -> Vec<Thought> {
    reconcile_preferring(local, remote, |_| false)
}

/// Like [`reconcile`], but local records for which `prefer_local` holds win
/// over the remote copy.
pub fn reconcile_preferring(
    local: &[Thought],
    remote: &[Thought],
    prefer_local: impl Fn(&ThoughtId) -> bool,
) -> Vec<Thought> {
    let mut seen: HashSet<&ThoughtId> = HashSet::with_capacity(remote.len() + local.len());
    let mut combined = Vec::with_capacity(remote.len() + local.len());
    let preferred = local.iter().filter(|thought| prefer_local(&thought.id));
    for thought in preferred.chain(remote.iter()).chain(local.iter()) {
        if seen.insert(&thought.id) {
            combined.push(thought.clone());
        }
    }
    combined.sort_by(newest_first);
    combined
}

/// Remote writes started for one locally saved id.
#[derive(Debug, Default, Clone, Copy)]
struct LocalHold {
    in_flight: usize,
    confirmed: bool,
}

#[derive(Default)]
struct ReconcilerState {
    remote_snapshot: Option<Vec<Thought>>,
    remote_reachable: bool,
    /// Locally deleted ids still present in the last remote snapshot.
    pending_removals: HashSet<ThoughtId>,
    /// Locally saved ids whose local copy wins until a remote snapshot
    /// arrives after their last write was confirmed.
    held: HashMap<ThoughtId, LocalHold>,
}

/// Owner-scoped combined view over both stores.
pub struct SyncReconciler {
    local: Arc<dyn LocalStore>,
    state: Mutex<ReconcilerState>,
    view_tx: watch::Sender<Vec<Thought>>,
}

impl SyncReconciler {
    pub fn new(local: Arc<dyn LocalStore>) -> Arc<Self> {
        let (view_tx, _) = watch::channel(Vec::new());
        Arc::new(Self {
            local,
            state: Mutex::new(ReconcilerState::default()),
            view_tx,
        })
    }

    pub fn owner_id(&self) -> &str {
        self.local.owner_id()
    }

    /// Receiver that observes every recomputed view.
    pub fn watch(&self) -> watch::Receiver<Vec<Thought>> {
        self.view_tx.subscribe()
    }

    /// Whether the last remote interaction succeeded.
    pub fn is_remote_reachable(&self) -> bool {
        self.lock().remote_reachable
    }

    /// Subscribes to remote pushes for this owner.
    ///
    /// The subscription holds only a weak reference, so it never keeps the
    /// reconciler alive.
    pub fn attach(self: &Arc<Self>, remote: &dyn RemoteStore) -> Subscription {
        let weak = Arc::downgrade(self);
        remote.subscribe(
            self.owner_id(),
            Box::new(move |snapshot| {
                if let Some(reconciler) = weak.upgrade() {
                    reconciler.apply_remote_snapshot(snapshot);
                }
            }),
        )
    }

    /// Replaces the remote snapshot and recomputes.
    pub fn apply_remote_snapshot(&self, snapshot: Vec<Thought>) -> Vec<Thought> {
        let mut state = self.lock();
        let present: HashSet<&ThoughtId> = snapshot.iter().map(|thought| &thought.id).collect();
        state.pending_removals.retain(|id| present.contains(id));
        state.held.retain(|_, hold| !hold.confirmed);
        debug!(
            "event=remote_snapshot module=sync status=ok owner={} count={}",
            self.owner_id(),
            snapshot.len()
        );
        state.remote_snapshot = Some(snapshot);
        state.remote_reachable = true;
        self.recompute(&state)
    }

    /// Drops the remote snapshot; the view becomes local-only.
    pub fn mark_remote_unreachable(&self) -> Vec<Thought> {
        let mut state = self.lock();
        state.remote_snapshot = None;
        state.remote_reachable = false;
        self.recompute(&state)
    }

    /// Recomputes after a local write.
    pub fn refresh_local(&self) -> Vec<Thought> {
        let state = self.lock();
        self.recompute(&state)
    }

    /// Projects a local write of `id` and keeps its local copy in front of
    /// the remote one until the write is confirmed.
    ///
    /// Pair every call with one [`SyncReconciler::settle_local`].
    pub fn hold_local(&self, id: &ThoughtId) -> Vec<Thought> {
        let mut state = self.lock();
        let hold = state.held.entry(id.clone()).or_default();
        hold.in_flight += 1;
        hold.confirmed = false;
        self.recompute(&state)
    }

    /// Records the outcome of one remote write started after `hold_local`.
    ///
    /// A failed write keeps the local copy in front until a later write of
    /// the same id succeeds.
    pub fn settle_local(&self, id: &ThoughtId, confirmed: bool) {
        let mut state = self.lock();
        if let Some(hold) = state.held.get_mut(id) {
            hold.in_flight = hold.in_flight.saturating_sub(1);
            if confirmed && hold.in_flight == 0 {
                hold.confirmed = true;
            }
        }
    }

    /// Hides ids deleted locally until the remote snapshot confirms removal.
    pub fn hide_pending_removals(&self, ids: &[ThoughtId]) -> Vec<Thought> {
        let mut state = self.lock();
        for id in ids {
            state.held.remove(id);
            state.pending_removals.insert(id.clone());
        }
        self.recompute(&state)
    }

    /// Shows ids again after their remote removal failed.
    pub fn restore_pending_removals(&self, ids: &[ThoughtId]) -> Vec<Thought> {
        let mut state = self.lock();
        for id in ids {
            state.pending_removals.remove(id);
        }
        self.recompute(&state)
    }

    /// Current combined view, recomputed from both sources.
    pub fn current_view(&self) -> Vec<Thought> {
        self.refresh_local()
    }

    /// Pulls a fresh remote snapshot; on failure falls back to local-only.
    pub async fn refresh_from_remote(&self, remote: &dyn RemoteStore) -> Vec<Thought> {
        match remote.load_all(self.owner_id()).await {
            Ok(snapshot) => self.apply_remote_snapshot(snapshot),
            Err(err) => {
                warn!(
                    "event=remote_load module=sync status=error owner={} error={err}",
                    self.owner_id()
                );
                self.mark_remote_unreachable()
            }
        }
    }

    // Runs under the state lock so published views never go backwards.
    fn recompute(&self, state: &ReconcilerState) -> Vec<Thought> {
        let local = match self.local.get_all() {
            Ok(local) => local,
            Err(err) => {
                error!(
                    "event=reconcile module=sync status=error owner={} error_code=local_read_failed error={err}",
                    self.owner_id()
                );
                Vec::new()
            }
        };
        let remote = state.remote_snapshot.as_deref().unwrap_or(&[]);
        let mut view = if state.held.is_empty() {
            reconcile(&local, remote)
        } else {
            reconcile_preferring(&local, remote, |id| state.held.contains_key(id))
        };
        if !state.pending_removals.is_empty() {
            view.retain(|thought| !state.pending_removals.contains(&thought.id));
        }
        self.view_tx.send_replace(view.clone());
        view
    }

    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
