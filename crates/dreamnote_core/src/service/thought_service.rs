//! Thought use-case facade exposed to UI and capture collaborators.
//!
//! # Responsibility
//! - Run every mutation write-ahead: LocalStore first, then project the
//!   change into the combined view, then push to the RemoteStore in the
//!   background.
//! - Track per-thought remote resolution so callers can show sync state.
//! - Drive graph operations (links, drag-release, merge) against the
//!   current combined view.
//!
//! # Invariants
//! - A RemoteStore write is never attempted before the LocalStore accepted
//!   the same mutation.
//! - Local failures are returned synchronously and carry the unsaved thought.
//! - Remote failures never roll back local state; they only change status.
//! - A saved thought shows its local version until the remote confirms it.
//! - A failed remote delete stays queued until `retry_failed` completes it.
//! - Background pushes require a running Tokio runtime.

use crate::config::GraphConfig;
use crate::emotion::EmotionKey;
use crate::graph::merge::MergePlan;
use crate::graph::thought_graph::ThoughtGraph;
use crate::graph::GraphConsistencyError;
use crate::model::link::ManualLink;
use crate::model::thought::{create_thought, Position, Thought, ThoughtId, ThoughtTag};
use crate::repo::thought_repo::{LocalStore, StorageError};
use crate::sync::reconciler::SyncReconciler;
use crate::sync::remote_store::{RemoteStore, Subscription, SyncError};
use crate::sync::status::{PendingSync, SyncStatus, SyncStatusTracker};
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Facade-level error.
#[derive(Debug)]
pub enum ServiceError {
    /// LocalStore rejected the write. `unsaved` holds the content the user
    /// still has to retry, when the action carried new content.
    Storage {
        source: StorageError,
        unsaved: Option<Box<Thought>>,
    },
    /// Referenced ids do not fit the current graph; nothing was changed.
    Graph(GraphConsistencyError),
}

impl ServiceError {
    fn storage(source: StorageError) -> Self {
        Self::Storage {
            source,
            unsaved: None,
        }
    }

    fn storage_with(source: StorageError, unsaved: Thought) -> Self {
        Self::Storage {
            source,
            unsaved: Some(Box::new(unsaved)),
        }
    }

    /// Whether the triggering action must be reported as a blocking error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    pub fn unsaved(&self) -> Option<&Thought> {
        match self {
            Self::Storage { unsaved, .. } => unsaved.as_deref(),
            Self::Graph(_) => None,
        }
    }

    pub fn into_unsaved(self) -> Option<Thought> {
        match self {
            Self::Storage { unsaved, .. } => unsaved.map(|thought| *thought),
            Self::Graph(_) => None,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage { source, .. } => write!(f, "{source}"),
            Self::Graph(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::Graph(err) => Some(err),
        }
    }
}

impl From<GraphConsistencyError> for ServiceError {
    fn from(value: GraphConsistencyError) -> Self {
        Self::Graph(value)
    }
}

/// Result of a merge: the new id plus its background sync handle.
#[derive(Debug)]
pub struct MergeReceipt {
    pub merged_id: ThoughtId,
    pub pending: PendingSync,
}

/// What a drag-release did.
#[derive(Debug)]
pub enum DragOutcome {
    /// The node was stored at its new position.
    Moved(PendingSync),
    /// The node landed on another node and both were merged.
    Merged(MergeReceipt),
}

/// Per-id outcome of a bulk delete.
#[derive(Debug, Default)]
pub struct BulkDeleteReport {
    pub removed_locally: usize,
    pub removed_remotely: Vec<ThoughtId>,
    /// Ids whose remote delete failed; they stay visible and valid.
    pub failed: Vec<(ThoughtId, SyncError)>,
}

impl BulkDeleteReport {
    /// True only when every remote delete succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owner-scoped facade over both stores, the reconciler and the graph.
pub struct ThoughtService {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    reconciler: Arc<SyncReconciler>,
    status: Arc<SyncStatusTracker>,
    graph_config: GraphConfig,
    subscription: Mutex<Option<Subscription>>,
}

impl ThoughtService {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        graph_config: GraphConfig,
    ) -> Self {
        let reconciler = SyncReconciler::new(Arc::clone(&local));
        Self {
            local,
            remote,
            reconciler,
            status: Arc::new(SyncStatusTracker::new()),
            graph_config,
            subscription: Mutex::new(None),
        }
    }

    pub fn owner_id(&self) -> &str {
        self.local.owner_id()
    }

    /// Subscribes to remote pushes. No-op when already subscribed.
    pub fn start_sync(&self) {
        let mut subscription = self.lock_subscription();
        if subscription.is_some() {
            return;
        }
        *subscription = Some(self.reconciler.attach(self.remote.as_ref()));
        info!(
            "event=sync_start module=service status=ok owner={}",
            self.owner_id()
        );
    }

    /// Cancels the remote subscription; no snapshot is applied afterwards.
    pub fn stop_sync(&self) {
        if let Some(subscription) = self.lock_subscription().take() {
            subscription.unsubscribe();
            info!(
                "event=sync_stop module=service status=ok owner={}",
                self.owner_id()
            );
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.lock_subscription()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Pulls a remote snapshot; an unreachable remote leaves a local-only view.
    pub async fn refresh(&self) -> Vec<Thought> {
        self.reconciler
            .refresh_from_remote(self.remote.as_ref())
            .await
    }

    /// Combined view, newest first.
    pub fn get_combined_view(&self) -> Vec<Thought> {
        self.reconciler.current_view()
    }

    pub fn watch_view(&self) -> watch::Receiver<Vec<Thought>> {
        self.reconciler.watch()
    }

    pub fn is_remote_reachable(&self) -> bool {
        self.reconciler.is_remote_reachable()
    }

    /// Builds a thought from finished capture input and saves it.
    pub fn capture(
        &self,
        text: &str,
        tags: impl IntoIterator<Item = ThoughtTag>,
        duration_seconds: u64,
        emotion: Option<EmotionKey>,
    ) -> Result<PendingSync, ServiceError> {
        self.save(create_thought(text, tags, duration_seconds, emotion))
    }

    /// Write-ahead save.
    ///
    /// # Errors
    /// - `Storage` with the thought attached when the LocalStore refused it;
    ///   nothing is sent to the remote in that case.
    pub fn save(&self, thought: Thought) -> Result<PendingSync, ServiceError> {
        if let Err(err) = self.local.put(&thought) {
            error!(
                "event=thought_save module=service status=error thought_id={} error={err}",
                thought.id
            );
            return Err(ServiceError::storage_with(err, thought));
        }
        self.reconciler.hold_local(&thought.id);
        debug!(
            "event=thought_save module=service status=ok thought_id={}",
            thought.id
        );
        let tracked = thought.id.clone();
        Ok(self.spawn_remote(tracked, Some(thought), Vec::new()))
    }

    /// Applies `edit` to the current version of `id` and saves the result.
    ///
    /// The durable local record is the base; the view is used only for ids
    /// known from the remote alone.
    pub fn update(
        &self,
        id: &ThoughtId,
        edit: impl FnOnce(&mut Thought),
    ) -> Result<PendingSync, ServiceError> {
        let current = match self.local.get(id).map_err(ServiceError::storage)? {
            Some(thought) => Some(thought),
            None => self
                .get_combined_view()
                .into_iter()
                .find(|thought| &thought.id == id),
        };
        let mut thought =
            current.ok_or_else(|| GraphConsistencyError::UnknownThought(id.clone()))?;
        edit(&mut thought);
        self.save(thought)
    }

    /// Deletes locally (pruning links), hides the id, removes it remotely.
    ///
    /// If the remote delete fails the remote copy becomes visible again.
    pub fn delete(&self, id: &ThoughtId) -> Result<PendingSync, ServiceError> {
        self.local.delete(id).map_err(|err| {
            error!("event=thought_delete module=service status=error thought_id={id} error={err}");
            ServiceError::storage(err)
        })?;
        self.reconciler.hide_pending_removals(std::slice::from_ref(id));
        debug!("event=thought_delete module=service status=ok thought_id={id}");
        Ok(self.spawn_remote(id.clone(), None, vec![id.clone()]))
    }

    /// Deletes many thoughts; remote deletes run concurrently.
    ///
    /// Succeeds as a whole only when every remote delete succeeded; the
    /// report lists the ids that did not.
    pub async fn delete_all(&self, ids: &[ThoughtId]) -> Result<BulkDeleteReport, ServiceError> {
        let removed_locally = self.local.delete_many(ids).map_err(|err| {
            error!(
                "event=thought_delete_all module=service status=error count={} error={err}",
                ids.len()
            );
            ServiceError::storage(err)
        })?;
        self.reconciler.hide_pending_removals(ids);

        let owner = self.owner_id();
        let outcomes = join_all(ids.iter().map(|id| async move {
            let outcome = self.remote.remove(id, owner).await;
            (id.clone(), outcome)
        }))
        .await;

        let mut report = BulkDeleteReport {
            removed_locally,
            ..BulkDeleteReport::default()
        };
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    self.status.removal_done(&id);
                    self.status.forget(&id);
                    report.removed_remotely.push(id);
                }
                Err(err) => {
                    self.status.queue_removal(&id);
                    self.status.record(&id, SyncStatus::failed(&err));
                    report.failed.push((id, err));
                }
            }
        }

        if report.is_complete() {
            info!(
                "event=thought_delete_all module=service status=ok count={}",
                ids.len()
            );
        } else {
            let failed: Vec<ThoughtId> = report.failed.iter().map(|(id, _)| id.clone()).collect();
            self.reconciler.restore_pending_removals(&failed);
            warn!(
                "event=thought_delete_all module=service status=partial count={} failed={}",
                ids.len(),
                failed.len()
            );
        }
        Ok(report)
    }

    /// Merges `a` and `b` into a new thought and returns its id.
    ///
    /// # Errors
    /// - `Graph` when either id is unknown or both are the same; no-op.
    /// - `Storage` when the local merge transaction failed; nothing changed.
    pub fn merge(&self, a: &ThoughtId, b: &ThoughtId) -> Result<MergeReceipt, ServiceError> {
        let graph = self.graph()?;
        let plan = graph.plan_merge(a, b)?;
        self.commit_merge(plan)
    }

    /// Persists a manual link. `Ok(false)` when it already existed.
    pub fn create_manual_link(&self, a: &ThoughtId, b: &ThoughtId) -> Result<bool, ServiceError> {
        let mut graph = self.graph()?;
        graph.add_manual_link(a, b)?;
        let link = checked_link(a, b)?;
        self.local.add_link(&link).map_err(ServiceError::storage)
    }

    /// Removes a manual link. `Ok(false)` when there was none.
    pub fn remove_manual_link(&self, a: &ThoughtId, b: &ThoughtId) -> Result<bool, ServiceError> {
        let link = checked_link(a, b)?;
        self.local.remove_link(&link).map_err(ServiceError::storage)
    }

    /// Graph over the current combined view and the persisted links.
    ///
    /// Links left dangling by remote deletions are pruned from the
    /// LocalStore, but only while the view includes remote records.
    pub fn graph(&self) -> Result<ThoughtGraph, ServiceError> {
        let links = self.local.links().map_err(ServiceError::storage)?;
        let graph = ThoughtGraph::new(self.get_combined_view(), links, self.graph_config);
        if self.reconciler.is_remote_reachable() {
            for link in graph.dangling_links() {
                if let Err(err) = self.local.remove_link(link) {
                    warn!(
                        "event=link_prune module=service status=error low={} high={} error={err}",
                        link.low(),
                        link.high()
                    );
                }
            }
        }
        Ok(graph)
    }

    /// Stores the released position, or merges when the node overlaps another.
    ///
    /// On overlap the node it landed on comes first in the merged text.
    pub fn drag_release(
        &self,
        id: &ThoughtId,
        position: Position,
    ) -> Result<DragOutcome, ServiceError> {
        let mut graph = self.graph()?;
        let start = graph
            .node(id)
            .map(|node| node.position)
            .ok_or_else(|| GraphConsistencyError::UnknownThought(id.clone()))?;
        graph.drag_by(id, position.x - start.x, position.y - start.y)?;

        if let Some(target) = graph.merge_target(id).map(|node| node.id().clone()) {
            debug!(
                "event=drag_release module=service status=merge dragged_id={id} target_id={target}"
            );
            let plan = graph.plan_merge(&target, id)?;
            return self.commit_merge(plan).map(DragOutcome::Merged);
        }

        let moved = graph
            .node(id)
            .map(|node| node.placed_thought())
            .ok_or_else(|| GraphConsistencyError::UnknownThought(id.clone()))?;
        self.save(moved).map(DragOutcome::Moved)
    }

    /// Re-pushes thoughts whose last remote write failed and re-issues
    /// queued remote deletes.
    ///
    /// Failed ids that are neither present locally nor queued for deletion
    /// are dropped from the status table. A queued delete whose id exists
    /// locally again is dropped, since the local record supersedes it.
    pub fn retry_failed(&self) -> Result<Vec<PendingSync>, ServiceError> {
        let queued = self.status.pending_removals();
        let mut pending = Vec::new();
        for id in self.status.failed_ids() {
            if queued.contains(&id) {
                continue;
            }
            match self.local.get(&id).map_err(ServiceError::storage)? {
                Some(thought) => {
                    self.reconciler.hold_local(&id);
                    pending.push(self.spawn_remote(id, Some(thought), Vec::new()));
                }
                None => self.status.forget(&id),
            }
        }

        let mut removals = Vec::with_capacity(queued.len());
        for id in queued {
            if self.local.get(&id).map_err(ServiceError::storage)?.is_some() {
                self.status.removal_done(&id);
            } else {
                removals.push(id);
            }
        }
        if !removals.is_empty() {
            self.reconciler.hide_pending_removals(&removals);
        }
        for id in removals {
            pending.push(self.spawn_remote(id.clone(), None, vec![id]));
        }

        info!(
            "event=sync_retry module=service status=ok count={}",
            pending.len()
        );
        Ok(pending)
    }

    pub fn sync_status(&self, id: &ThoughtId) -> Option<SyncStatus> {
        self.status.status(id)
    }

    pub fn status_tracker(&self) -> &Arc<SyncStatusTracker> {
        &self.status
    }

    fn commit_merge(&self, plan: MergePlan) -> Result<MergeReceipt, ServiceError> {
        if let Err(err) = self.local.commit_merge(&plan) {
            error!(
                "event=thought_merge module=service status=error merged_id={} error={err}",
                plan.merged.id
            );
            return Err(ServiceError::storage_with(err, plan.merged));
        }
        self.reconciler.hold_local(&plan.merged.id);
        self.reconciler.hide_pending_removals(&plan.retired);
        info!(
            "event=thought_merge module=service status=ok merged_id={} retired={},{} links_added={}",
            plan.merged.id,
            plan.retired[0],
            plan.retired[1],
            plan.links_added.len()
        );

        let merged_id = plan.merged.id.clone();
        let [first, second] = plan.retired;
        let pending = self.spawn_remote(merged_id.clone(), Some(plan.merged), vec![first, second]);
        Ok(MergeReceipt { merged_id, pending })
    }

    /// Pushes one mutation to the remote in the background.
    ///
    /// Removals run even when the upsert failed. A failed removal makes the
    /// remote copy visible again, queues the delete for `retry_failed` and
    /// marks `tracked` as failed.
    fn spawn_remote(
        &self,
        tracked: ThoughtId,
        upsert: Option<Thought>,
        removals: Vec<ThoughtId>,
    ) -> PendingSync {
        self.status.record(&tracked, SyncStatus::Syncing);

        let remote = Arc::clone(&self.remote);
        let reconciler = Arc::clone(&self.reconciler);
        let tracker = Arc::clone(&self.status);
        let owner = self.owner_id().to_string();
        let id = tracked.clone();

        let handle = tokio::spawn(async move {
            let mut failure: Option<SyncError> = None;
            if let Some(thought) = upsert.as_ref() {
                let saved = remote.save(thought, &owner).await;
                reconciler.settle_local(&thought.id, saved.is_ok());
                if let Err(err) = saved {
                    warn!(
                        "event=remote_save module=service status=error thought_id={id} retryable={} error={err}",
                        err.is_retryable()
                    );
                    failure = Some(err);
                }
            }

            let mut restored = Vec::new();
            for removed in &removals {
                match remote.remove(removed, &owner).await {
                    Ok(()) => tracker.removal_done(removed),
                    Err(err) => {
                        warn!(
                            "event=remote_remove module=service status=error thought_id={removed} error={err}"
                        );
                        tracker.queue_removal(removed);
                        restored.push(removed.clone());
                        if failure.is_none() {
                            failure = Some(err);
                        }
                    }
                }
            }
            if !restored.is_empty() {
                reconciler.restore_pending_removals(&restored);
            }

            let status = match failure {
                Some(err) => SyncStatus::failed(&err),
                None => SyncStatus::Synced,
            };
            tracker.record(&id, status.clone());
            if upsert.is_none() && !status.is_failed() {
                tracker.forget(&id);
            }
            debug!(
                "event=remote_push module=service status={} thought_id={id}",
                if status.is_failed() { "error" } else { "ok" }
            );
            status
        });

        PendingSync::new(tracked, handle)
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ThoughtService {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

fn checked_link(a: &ThoughtId, b: &ThoughtId) -> Result<ManualLink, GraphConsistencyError> {
    ManualLink::new(a.clone(), b.clone()).ok_or_else(|| GraphConsistencyError::SelfLink(a.clone()))
}
