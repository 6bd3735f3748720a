//! Remote synchronization and read-time reconciliation.
//!
//! # Responsibility
//! - Define the RemoteStore contract (async upsert/delete/load + push
//!   subscription with guaranteed-effective unsubscribe).
//! - Encode thoughts into remote documents with ISO-8601 timestamps.
//! - Combine local and remote snapshots into one ordered view.
//! - Track per-thought background sync status.
//!
//! # Invariants
//! - Only `SyncReconciler` presents a combined view; it never writes to
//!   either store.
//! - Remote failures never remove or roll back durable local records.

pub mod memory_remote;
pub mod reconciler;
pub mod remote_codec;
pub mod remote_store;
pub mod status;
