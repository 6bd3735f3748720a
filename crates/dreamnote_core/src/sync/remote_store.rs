//! RemoteStore contract and subscription handles.
//!
//! # Responsibility
//! - Describe the authoritative, multi-device, owner-scoped store.
//! - Provide a cancellable subscription primitive shared by implementations.
//!
//! # Invariants
//! - Subscriptions deliver full replacement snapshots, never diffs.
//! - Deliveries for one subscription never overlap.
//! - After `Subscription::unsubscribe` returns, its callback is never invoked
//!   again; an in-flight delivery finishes before `unsubscribe` returns.

use crate::model::thought::{Thought, ThoughtId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

pub type SyncResult<T> = Result<T, SyncError>;

/// Boxed future returned by RemoteStore operations.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = SyncResult<T>> + Send + 'a>>;

/// Receives a full snapshot of an owner's thoughts on every remote change.
pub type SnapshotCallback = Box<dyn FnMut(Vec<Thought>) + Send>;

/// RemoteStore failure. Transient from the user's point of view: the local
/// record stays durable and the write can be retried later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network or backend unavailable.
    Unreachable(String),
    /// Backend refused the write (quota, permission).
    Rejected(String),
    /// Remote document could not be converted to or from a thought.
    Codec { id: String, message: String },
    /// A batch write stopped after `written` records.
    BatchInterrupted { written: usize, reason: String },
}

impl SyncError {
    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::BatchInterrupted { .. } | Self::Rejected(_) => true,
            Self::Codec { .. } => false,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable(reason) => write!(f, "remote store unreachable: {reason}"),
            Self::Rejected(reason) => write!(f, "remote store rejected the request: {reason}"),
            Self::Codec { id, message } => {
                write!(f, "remote document `{id}` is invalid: {message}")
            }
            Self::BatchInterrupted { written, reason } => {
                write!(f, "remote batch interrupted after {written} records: {reason}")
            }
        }
    }
}

impl Error for SyncError {}

/// Authoritative, eventually-consistent, owner-scoped thought store.
pub trait RemoteStore: Send + Sync {
    /// Upsert keyed by `thought.id`. Last completed write wins.
    fn save<'a>(&'a self, thought: &'a Thought, owner: &'a str) -> RemoteFuture<'a, ()>;
    /// Upserts every thought in one batch.
    ///
    /// A failure may leave a prefix of the batch written.
    fn save_batch<'a>(&'a self, thoughts: &'a [Thought], owner: &'a str) -> RemoteFuture<'a, ()>;
    /// Deletes one record. Deleting a missing id succeeds.
    fn remove<'a>(&'a self, id: &'a ThoughtId, owner: &'a str) -> RemoteFuture<'a, ()>;
    /// One-shot snapshot read.
    fn load_all<'a>(&'a self, owner: &'a str) -> RemoteFuture<'a, Vec<Thought>>;
    /// Registers a push subscription for `owner`.
    fn subscribe(&self, owner: &str, callback: SnapshotCallback) -> Subscription;
}

/// Delivery slot shared between a store and one [`Subscription`].
///
/// The callback runs while the slot lock is held, which both serializes
/// deliveries and lets `cancel` wait out an in-flight delivery.
pub struct SubscriptionSlot {
    owner: String,
    callback: Mutex<Option<SnapshotCallback>>,
}

impl SubscriptionSlot {
    pub fn new(owner: impl Into<String>, callback: SnapshotCallback) -> Arc<Self> {
        Arc::new(Self {
            owner: owner.into(),
            callback: Mutex::new(Some(callback)),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Invokes the callback with a snapshot built under the slot lock.
    ///
    /// Building the snapshot inside the lock keeps deliveries monotonic: a
    /// later delivery never carries older data than an earlier one. Returns
    /// `false` once the slot is cancelled.
    pub fn deliver(&self, snapshot: impl FnOnce() -> Vec<Thought>) -> bool {
        let mut guard = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(callback) => {
                callback(snapshot());
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn cancel(&self) {
        let mut guard = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }
}

/// Handle returned by [`RemoteStore::subscribe`].
///
/// Must not be unsubscribed from inside its own callback.
pub struct Subscription {
    slot: Arc<SubscriptionSlot>,
}

impl Subscription {
    pub fn new(slot: Arc<SubscriptionSlot>) -> Self {
        Self { slot }
    }

    /// Stops deliveries. No callback runs after this returns.
    pub fn unsubscribe(self) {
        self.slot.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.slot.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.slot.cancel();
    }
}
