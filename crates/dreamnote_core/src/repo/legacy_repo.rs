//! Reader for the deprecated pre-migration record namespace.
//!
//! # Responsibility
//! - Load raw legacy payloads stored under their historical storage keys.
//! - Decode them into the versioned legacy schema.
//!
//! # Invariants
//! - Legacy rows live in `legacy_records`, never in `thoughts`.
//! - This module only reads legacy data; migration never deletes it.

use super::{ensure_tables, lock_connection, StorageError, StorageResult};
use crate::db::SharedConnection;
use crate::model::legacy::{LegacyRecord, LegacySessionV0, LegacyThoughtV1};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage key of the session-based V0 layout.
pub const LEGACY_SESSIONS_KEY: &str = "thoughtTimer:sessions";
/// Storage key of the flat V1 layout.
pub const LEGACY_THOUGHTS_KEY: &str = "dreamdelusion:thoughts";

/// Failure to read or decode legacy payloads.
#[derive(Debug)]
pub enum LegacyReadError {
    Storage(StorageError),
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

impl Display for LegacyReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::Decode { key, source } => {
                write!(f, "legacy payload `{key}` is undecodable: {source}")
            }
        }
    }
}

impl Error for LegacyReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Decode { source, .. } => Some(source),
        }
    }
}

impl From<StorageError> for LegacyReadError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for LegacyReadError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.into())
    }
}

/// Source of legacy-schema records.
pub trait LegacySource: Send + Sync {
    fn read_legacy(&self) -> Result<Vec<LegacyRecord>, LegacyReadError>;
}

/// SQLite-backed legacy source over `legacy_records`.
pub struct SqliteLegacySource {
    conn: SharedConnection,
}

impl SqliteLegacySource {
    pub fn try_new(conn: SharedConnection) -> StorageResult<Self> {
        ensure_tables(&conn, &["legacy_records"])?;
        Ok(Self { conn })
    }

    /// Stores one raw legacy payload under its historical key.
    ///
    /// Used by importers that copy old on-device data into this namespace.
    pub fn write_raw(&self, storage_key: &str, payload: &str) -> StorageResult<()> {
        let conn = lock_connection(&self.conn)?;
        conn.execute(
            "INSERT INTO legacy_records (storage_key, payload)
             VALUES (?1, ?2)
             ON CONFLICT (storage_key) DO UPDATE SET payload = excluded.payload;",
            [storage_key, payload],
        )?;
        Ok(())
    }
}

impl LegacySource for SqliteLegacySource {
    fn read_legacy(&self) -> Result<Vec<LegacyRecord>, LegacyReadError> {
        let raw = {
            let conn = lock_connection(&self.conn)?;
            let mut stmt = conn.prepare(
                "SELECT storage_key, payload
                 FROM legacy_records
                 ORDER BY storage_key ASC;",
            )?;
            let mut rows = stmt.query([])?;
            let mut raw = Vec::new();
            while let Some(row) = rows.next()? {
                let key: String = row.get("storage_key")?;
                let payload: String = row.get("payload")?;
                raw.push((key, payload));
            }
            raw
        };

        let mut records = Vec::new();
        for (key, payload) in raw {
            match key.as_str() {
                LEGACY_SESSIONS_KEY => {
                    let sessions: Vec<LegacySessionV0> = decode(&key, &payload)?;
                    records.extend(sessions.into_iter().map(LegacyRecord::V0Session));
                }
                LEGACY_THOUGHTS_KEY => {
                    let thoughts: Vec<LegacyThoughtV1> = decode(&key, &payload)?;
                    records.extend(thoughts.into_iter().map(LegacyRecord::V1Thought));
                }
                _ => {
                    log::debug!("event=legacy_read module=repo status=skipped key={key}");
                }
            }
        }
        Ok(records)
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, payload: &str) -> Result<T, LegacyReadError> {
    serde_json::from_str(payload).map_err(|source| LegacyReadError::Decode {
        key: key.to_string(),
        source,
    })
}
