//! Device-local persistence contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define the LocalStore contract (thoughts + manual links).
//! - Keep the migration-completed flag apart from record storage.
//! - Read the deprecated legacy record namespace for migration.
//!
//! # Invariants
//! - Writes are synchronous: a call returning `Ok` means the data is durable.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod flag_repo;
pub mod legacy_repo;
pub mod thought_repo;

use crate::db::{DbError, SharedConnection};
use rusqlite::Connection;
use std::sync::MutexGuard;

pub use thought_repo::{StorageError, StorageResult};

fn lock_connection(conn: &SharedConnection) -> StorageResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StorageError::Unavailable(DbError::Poisoned))
}

fn table_exists(conn: &Connection, table: &str) -> StorageResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_tables(conn: &SharedConnection, tables: &[&'static str]) -> StorageResult<()> {
    let guard = lock_connection(conn)?;
    for table in tables {
        if !table_exists(&guard, table)? {
            return Err(StorageError::MissingTable(table));
        }
    }
    Ok(())
}
