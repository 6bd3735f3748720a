//! Device-local boolean flags.
//!
//! Kept in their own table, apart from both record stores, so clearing or
//! re-syncing thoughts never resets a completed migration.

use super::{ensure_tables, lock_connection, StorageResult};
use crate::db::SharedConnection;
use rusqlite::OptionalExtension;

const MIGRATION_FLAG_PREFIX: &str = "remote_migration_done";

/// Persisted migration-completed flags.
pub trait MigrationFlagStore: Send + Sync {
    fn is_set(&self, key: &str) -> StorageResult<bool>;
    fn set(&self, key: &str) -> StorageResult<()>;
}

/// Flag key scoped to one device and one account.
pub fn migration_flag_key(device_id: &str, owner_id: &str) -> String {
    format!("{MIGRATION_FLAG_PREFIX}:{device_id}:{owner_id}")
}

/// SQLite-backed flag store over `device_flags`.
pub struct SqliteFlagStore {
    conn: SharedConnection,
}

impl SqliteFlagStore {
    pub fn try_new(conn: SharedConnection) -> StorageResult<Self> {
        ensure_tables(&conn, &["device_flags"])?;
        Ok(Self { conn })
    }
}

impl MigrationFlagStore for SqliteFlagStore {
    fn is_set(&self, key: &str) -> StorageResult<bool> {
        let conn = lock_connection(&self.conn)?;
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM device_flags WHERE flag_key = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value == Some(1))
    }

    fn set(&self, key: &str) -> StorageResult<()> {
        let conn = lock_connection(&self.conn)?;
        conn.execute(
            "INSERT INTO device_flags (flag_key, value)
             VALUES (?1, 1)
             ON CONFLICT (flag_key) DO UPDATE SET
                value = 1,
                updated_at = (strftime('%s', 'now') * 1000);",
            [key],
        )?;
        Ok(())
    }
}
