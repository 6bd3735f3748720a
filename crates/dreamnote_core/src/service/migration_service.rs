//! One-time upgrade of legacy on-device records into the remote store.
//!
//! # Responsibility
//! - Gate on a device+account scoped "already migrated" flag.
//! - Read legacy payloads, upgrade them, and batch-upsert them remotely.
//!
//! # Invariants
//! - The flag is set only after the whole batch committed, or when there was
//!   nothing to migrate.
//! - Any failure leaves the flag unset so the next sign-in retries; records
//!   already written are overwritten by id on that retry.

use crate::model::legacy::{upgrade_legacy_records, LegacyTransformError};
use crate::model::thought::now_millis;
use crate::repo::flag_repo::{migration_flag_key, MigrationFlagStore};
use crate::repo::legacy_repo::{LegacyReadError, LegacySource};
use crate::repo::StorageError;
use crate::sync::remote_store::{RemoteStore, SyncError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Migration failure. The flag stays unset; retrying is safe.
#[derive(Debug)]
pub enum MigrationError {
    LegacyRead(LegacyReadError),
    Transform(LegacyTransformError),
    RemoteWrite(SyncError),
    Flag(StorageError),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LegacyRead(err) => write!(f, "legacy read failed: {err}"),
            Self::Transform(err) => write!(f, "legacy transform failed: {err}"),
            Self::RemoteWrite(err) => write!(f, "remote batch write failed: {err}"),
            Self::Flag(err) => write!(f, "migration flag access failed: {err}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LegacyRead(err) => Some(err),
            Self::Transform(err) => Some(err),
            Self::RemoteWrite(err) => Some(err),
            Self::Flag(err) => Some(err),
        }
    }
}

impl From<LegacyReadError> for MigrationError {
    fn from(value: LegacyReadError) -> Self {
        Self::LegacyRead(value)
    }
}

impl From<LegacyTransformError> for MigrationError {
    fn from(value: LegacyTransformError) -> Self {
        Self::Transform(value)
    }
}

impl From<SyncError> for MigrationError {
    fn from(value: SyncError) -> Self {
        Self::RemoteWrite(value)
    }
}

impl From<StorageError> for MigrationError {
    fn from(value: StorageError) -> Self {
        Self::Flag(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated_count: usize,
    /// True when the flag was already set and nothing ran.
    pub skipped: bool,
}

pub struct MigrationService {
    remote: Arc<dyn RemoteStore>,
    flags: Arc<dyn MigrationFlagStore>,
    legacy: Arc<dyn LegacySource>,
    device_id: String,
}

impl MigrationService {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        flags: Arc<dyn MigrationFlagStore>,
        legacy: Arc<dyn LegacySource>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            flags,
            legacy,
            device_id: device_id.into(),
        }
    }

    /// Migrates legacy records for `owner_id`. Safe to call on every sign-in.
    ///
    /// # Errors
    /// Any step failing returns the matching `MigrationError` with the flag
    /// left unset.
    pub async fn migrate(&self, owner_id: &str) -> Result<MigrationReport, MigrationError> {
        let started_at = Instant::now();
        let flag_key = migration_flag_key(&self.device_id, owner_id);
        if self.flags.is_set(&flag_key)? {
            info!("event=migration module=service status=skipped owner={owner_id} reason=flag_set");
            return Ok(MigrationReport {
                migrated_count: 0,
                skipped: true,
            });
        }
        info!("event=migration module=service status=start owner={owner_id}");

        let outcome = self.run(owner_id, &flag_key).await;
        let duration_ms = started_at.elapsed().as_millis();
        match &outcome {
            Ok(report) => info!(
                "event=migration module=service status=ok owner={owner_id} migrated={} duration_ms={duration_ms}",
                report.migrated_count
            ),
            Err(err) => warn!(
                "event=migration module=service status=error owner={owner_id} duration_ms={duration_ms} error={err}"
            ),
        }
        outcome
    }

    async fn run(&self, owner_id: &str, flag_key: &str) -> Result<MigrationReport, MigrationError> {
        let records = self.legacy.read_legacy()?;
        let upgraded = upgrade_legacy_records(&records, now_millis())?;

        if !upgraded.is_empty() {
            self.remote.save_batch(&upgraded, owner_id).await?;
        }
        self.flags.set(flag_key)?;

        Ok(MigrationReport {
            migrated_count: upgraded.len(),
            skipped: false,
        })
    }
}
