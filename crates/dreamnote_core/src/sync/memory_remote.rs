//! In-process RemoteStore implementation.
//!
//! # Responsibility
//! - Hold owner-scoped remote documents in memory using the remote codec.
//! - Push full snapshots to subscribers after every change.
//! - Offer fault injection so failure paths can be exercised.
//!
//! # Invariants
//! - The state lock is never held while a subscriber callback runs.
//! - Every delivered snapshot is sorted newest first.

use super::remote_codec::{decode, encode, RemoteDocument};
use super::remote_store::{
    RemoteFuture, RemoteStore, SnapshotCallback, Subscription, SubscriptionSlot, SyncError,
    SyncResult,
};
use crate::model::thought::{newest_first, Thought, ThoughtId};
use log::warn;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Faults {
    offline: bool,
    failing_saves: usize,
    failing_removes: HashSet<ThoughtId>,
    batch_fail_after: Option<usize>,
}

#[derive(Default)]
struct RemoteState {
    documents: HashMap<String, BTreeMap<String, RemoteDocument>>,
    subscribers: Vec<Arc<SubscriptionSlot>>,
    faults: Faults,
}

/// Memory-backed remote store with push subscriptions.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with `Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().faults.offline = offline;
    }

    /// Makes the next `count` single saves fail with `Rejected`.
    pub fn fail_next_saves(&self, count: usize) {
        self.lock().faults.failing_saves = count;
    }

    /// Makes every remove of `id` fail until cleared.
    pub fn fail_removes_for(&self, id: ThoughtId) {
        self.lock().faults.failing_removes.insert(id);
    }

    pub fn clear_remove_failures(&self) {
        self.lock().faults.failing_removes.clear();
    }

    /// Makes the next batch stop after writing `written` records.
    pub fn fail_batch_after(&self, written: usize) {
        self.lock().faults.batch_fail_after = Some(written);
    }

    pub fn contains(&self, owner: &str, id: &ThoughtId) -> bool {
        self.lock()
            .documents
            .get(owner)
            .is_some_and(|documents| documents.contains_key(id.as_str()))
    }

    pub fn document_count(&self, owner: &str) -> usize {
        self.lock().documents.get(owner).map_or(0, BTreeMap::len)
    }

    /// Number of subscriptions that have not been cancelled.
    pub fn active_subscriptions(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|slot| !slot.is_cancelled())
            .count()
    }

    /// Decoded snapshot for `owner`, newest first. Undecodable documents are
    /// skipped and logged.
    pub fn snapshot(&self, owner: &str) -> Vec<Thought> {
        let documents: Vec<RemoteDocument> = self
            .lock()
            .documents
            .get(owner)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default();

        let mut thoughts: Vec<Thought> = documents
            .iter()
            .filter_map(|document| match decode(document) {
                Ok(thought) => Some(thought),
                Err(err) => {
                    warn!("event=remote_snapshot module=sync status=skipped error={err}");
                    None
                }
            })
            .collect();
        thoughts.sort_by(newest_first);
        thoughts
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(state: &RemoteState) -> SyncResult<()> {
        if state.faults.offline {
            return Err(SyncError::Unreachable("remote store is offline".to_string()));
        }
        Ok(())
    }

    fn write_documents(&self, owner: &str, thoughts: &[Thought], batch: bool) -> SyncResult<()> {
        let encoded = thoughts.iter().map(encode).collect::<SyncResult<Vec<_>>>()?;

        let mut state = self.lock();
        Self::check_online(&state)?;

        if !batch && state.faults.failing_saves > 0 {
            state.faults.failing_saves -= 1;
            return Err(SyncError::Rejected("injected save failure".to_string()));
        }

        let limit = if batch {
            state.faults.batch_fail_after.take()
        } else {
            None
        };
        let documents = state.documents.entry(owner.to_string()).or_default();
        for (written, document) in encoded.into_iter().enumerate() {
            if limit == Some(written) {
                return Err(SyncError::BatchInterrupted {
                    written,
                    reason: "injected batch failure".to_string(),
                });
            }
            documents.insert(document.id.clone(), document);
        }
        Ok(())
    }

    fn notify(&self, owner: &str) {
        let slots: Vec<Arc<SubscriptionSlot>> = {
            let mut state = self.lock();
            state.subscribers.retain(|slot| !slot.is_cancelled());
            state
                .subscribers
                .iter()
                .filter(|slot| slot.owner() == owner)
                .cloned()
                .collect()
        };
        for slot in slots {
            slot.deliver(|| self.snapshot(owner));
        }
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn save<'a>(&'a self, thought: &'a Thought, owner: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let written = self.write_documents(owner, std::slice::from_ref(thought), false);
            if written.is_ok() {
                self.notify(owner);
            }
            written
        })
    }

    fn save_batch<'a>(&'a self, thoughts: &'a [Thought], owner: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let written = self.write_documents(owner, thoughts, true);
            // A partial batch still changed remote state.
            let changed = match &written {
                Ok(()) => true,
                Err(SyncError::BatchInterrupted { written: count, .. }) => *count > 0,
                Err(_) => false,
            };
            if changed {
                self.notify(owner);
            }
            written
        })
    }

    fn remove<'a>(&'a self, id: &'a ThoughtId, owner: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let removed = {
                let mut state = self.lock();
                Self::check_online(&state)?;
                if state.faults.failing_removes.contains(id) {
                    return Err(SyncError::Rejected(format!("injected remove failure for `{id}`")));
                }
                state
                    .documents
                    .get_mut(owner)
                    .and_then(|documents| documents.remove(id.as_str()))
                    .is_some()
            };
            if removed {
                self.notify(owner);
            }
            Ok(())
        })
    }

    fn load_all<'a>(&'a self, owner: &'a str) -> RemoteFuture<'a, Vec<Thought>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            Self::check_online(&self.lock())?;
            Ok(self.snapshot(owner))
        })
    }

    fn subscribe(&self, owner: &str, callback: SnapshotCallback) -> Subscription {
        let slot = SubscriptionSlot::new(owner, callback);
        self.lock().subscribers.push(Arc::clone(&slot));
        slot.deliver(|| self.snapshot(owner));
        Subscription::new(slot)
    }
}
