//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure the device-local SQLite database.
//! - Apply schema migrations in deterministic order.
//! - Hand out one shared connection to every local store.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No store reads or writes before migrations succeed.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_shared_db, open_shared_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Connection shared by the thought, link, flag and legacy stores.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Wraps a migrated connection for sharing across stores.
pub fn share(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A thread panicked while holding the shared connection.
    Poisoned,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Poisoned => write!(f, "shared connection lock is poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
