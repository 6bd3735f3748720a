//! Core domain logic for DreamNote.
//! This crate is the single source of truth for thought sync and graph
//! invariants; hosts only call into it.

pub mod capture;
pub mod config;
pub mod db;
pub mod emotion;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use capture::TranscriptSession;
pub use config::{ConfigError, CoreConfig, GraphConfig};
pub use db::{open_db, open_db_in_memory, open_shared_db, open_shared_db_in_memory, DbError};
pub use emotion::{EmotionKey, EmotionVector, Rgb};
pub use graph::merge::{merge_thoughts, plan_merge, MergePlan};
pub use graph::thought_graph::{GraphNode, ThoughtGraph};
pub use graph::GraphConsistencyError;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::link::ManualLink;
pub use model::thought::{create_thought, Position, Thought, ThoughtId, ThoughtTag};
pub use repo::flag_repo::{MigrationFlagStore, SqliteFlagStore};
pub use repo::legacy_repo::{LegacySource, SqliteLegacySource};
pub use repo::thought_repo::{LocalStore, SqliteLocalStore, StorageError};
pub use service::migration_service::{MigrationError, MigrationReport, MigrationService};
pub use service::thought_service::{
    BulkDeleteReport, DragOutcome, MergeReceipt, ServiceError, ThoughtService,
};
pub use sync::memory_remote::InMemoryRemoteStore;
pub use sync::remote_store::{RemoteStore, Subscription, SyncError};
pub use sync::status::{PendingSync, SyncStatus};

/// Minimal health-check API for host smoke tests.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
