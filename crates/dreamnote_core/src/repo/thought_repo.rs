//! LocalStore contract and SQLite implementation.
//!
//! # Responsibility
//! - Durable, synchronous, owner-scoped upsert/read/delete of thoughts.
//! - Persist manual links next to the thoughts they connect.
//! - Apply a precomputed merge as one transaction.
//!
//! # Invariants
//! - `put` is an idempotent upsert keyed by id and validates first.
//! - `get_all` is ordered newest timestamp first, ties by ascending id.
//! - Deleting a thought prunes every manual link touching it.
//! - A failed write never leaves a partial record or partial merge behind.

use super::{ensure_tables, lock_connection};
use crate::db::{DbError, SharedConnection};
use crate::graph::merge::MergePlan;
use crate::model::link::ManualLink;
use crate::model::thought::{newest_first, Thought, ThoughtId, ThoughtValidationError};
use log::{debug, error};
use rusqlite::{params, Connection, ErrorCode, Row, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StorageResult<T> = Result<T, StorageError>;

/// LocalStore write/read failure.
///
/// Fatal to the triggering user action: the caller keeps the unsaved content
/// and asks the user to retry. Never retried silently.
#[derive(Debug)]
pub enum StorageError {
    /// Device storage is out of space.
    Full,
    /// Database could not be reached or the statement failed.
    Unavailable(DbError),
    Serialization(serde_json::Error),
    Validation(ThoughtValidationError),
    /// Persisted state does not match the expected shape.
    InvalidData(String),
    MissingTable(&'static str),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "local storage is full"),
            Self::Unavailable(err) => write!(f, "local storage unavailable: {err}"),
            Self::Serialization(err) => write!(f, "thought serialization failed: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted thought data: {message}"),
            Self::MissingTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Full | Self::InvalidData(_) | Self::MissingTable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::DiskFull) => Self::Full,
            _ => Self::Unavailable(DbError::Sqlite(value)),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<ThoughtValidationError> for StorageError {
    fn from(value: ThoughtValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Durable, single-device, owner-scoped thought persistence.
pub trait LocalStore: Send + Sync {
    /// Owner whose namespace this store reads and writes.
    fn owner_id(&self) -> &str;
    /// Idempotent upsert keyed by `thought.id`.
    fn put(&self, thought: &Thought) -> StorageResult<()>;
    fn get(&self, id: &ThoughtId) -> StorageResult<Option<Thought>>;
    /// All thoughts, newest first.
    fn get_all(&self) -> StorageResult<Vec<Thought>>;
    /// Deletes one thought and its manual links. Returns whether a row existed.
    fn delete(&self, id: &ThoughtId) -> StorageResult<bool>;
    /// Deletes many thoughts and their links in one transaction.
    fn delete_many(&self, ids: &[ThoughtId]) -> StorageResult<usize>;
    fn links(&self) -> StorageResult<Vec<ManualLink>>;
    /// Returns `false` when the link already existed.
    fn add_link(&self, link: &ManualLink) -> StorageResult<bool>;
    /// Returns `false` when the link did not exist.
    fn remove_link(&self, link: &ManualLink) -> StorageResult<bool>;
    /// Inserts the merged thought, retires both sources and rewires links
    /// as one atomic step.
    fn commit_merge(&self, plan: &MergePlan) -> StorageResult<()>;
}

/// SQLite-backed LocalStore scoped to one owner.
pub struct SqliteLocalStore {
    conn: SharedConnection,
    owner_id: String,
}

impl SqliteLocalStore {
    /// Constructs a store from a migrated connection.
    ///
    /// # Errors
    /// - `MissingTable` when the connection was not migrated.
    pub fn try_new(conn: SharedConnection, owner_id: impl Into<String>) -> StorageResult<Self> {
        ensure_tables(&conn, &["thoughts", "manual_links"])?;
        Ok(Self {
            conn,
            owner_id: owner_id.into(),
        })
    }
}

impl LocalStore for SqliteLocalStore {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn put(&self, thought: &Thought) -> StorageResult<()> {
        thought.validate()?;
        let payload = serde_json::to_string(thought)?;
        let conn = lock_connection(&self.conn)?;
        upsert_thought(&conn, &self.owner_id, thought, &payload).inspect_err(|err| {
            error!(
                "event=local_put module=repo status=error thought_id={} error={err}",
                thought.id
            );
        })?;
        debug!(
            "event=local_put module=repo status=ok thought_id={}",
            thought.id
        );
        Ok(())
    }

    fn get(&self, id: &ThoughtId) -> StorageResult<Option<Thought>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, payload
             FROM thoughts
             WHERE owner_id = ?1 AND id = ?2;",
        )?;
        let mut rows = stmt.query(params![self.owner_id, id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_thought_row(row)?));
        }
        Ok(None)
    }

    fn get_all(&self) -> StorageResult<Vec<Thought>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, payload
             FROM thoughts
             WHERE owner_id = ?1
             ORDER BY timestamp_ms DESC, id ASC;",
        )?;
        let mut rows = stmt.query([self.owner_id.as_str()])?;
        let mut thoughts = Vec::new();
        while let Some(row) = rows.next()? {
            thoughts.push(parse_thought_row(row)?);
        }
        // The column only has millisecond resolution.
        thoughts.sort_by(newest_first);
        Ok(thoughts)
    }

    fn delete(&self, id: &ThoughtId) -> StorageResult<bool> {
        Ok(self.delete_many(std::slice::from_ref(id))? == 1)
    }

    fn delete_many(&self, ids: &[ThoughtId]) -> StorageResult<usize> {
        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += delete_thought_in_tx(&tx, &self.owner_id, id)?;
        }
        tx.commit()?;
        debug!(
            "event=local_delete module=repo status=ok requested={} removed={removed}",
            ids.len()
        );
        Ok(removed)
    }

    fn links(&self) -> StorageResult<Vec<ManualLink>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT low_id, high_id
             FROM manual_links
             WHERE owner_id = ?1
             ORDER BY low_id ASC, high_id ASC;",
        )?;
        let mut rows = stmt.query([self.owner_id.as_str()])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            let low: String = row.get("low_id")?;
            let high: String = row.get("high_id")?;
            let link = ManualLink::new(ThoughtId::new(low.clone()), ThoughtId::new(high))
                .ok_or_else(|| {
                    StorageError::InvalidData(format!("self link `{low}` in manual_links"))
                })?;
            links.push(link);
        }
        Ok(links)
    }

    fn add_link(&self, link: &ManualLink) -> StorageResult<bool> {
        let conn = lock_connection(&self.conn)?;
        Ok(insert_link(&conn, &self.owner_id, link)? == 1)
    }

    fn remove_link(&self, link: &ManualLink) -> StorageResult<bool> {
        let conn = lock_connection(&self.conn)?;
        Ok(delete_link(&conn, &self.owner_id, link)? == 1)
    }

    fn commit_merge(&self, plan: &MergePlan) -> StorageResult<()> {
        plan.merged.validate()?;
        let payload = serde_json::to_string(&plan.merged)?;

        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction()?;
        for link in &plan.links_removed {
            delete_link(&tx, &self.owner_id, link)?;
        }
        for id in &plan.retired {
            delete_thought_in_tx(&tx, &self.owner_id, id)?;
        }
        upsert_thought(&tx, &self.owner_id, &plan.merged, &payload)?;
        for link in &plan.links_added {
            insert_link(&tx, &self.owner_id, link)?;
        }
        tx.commit()?;

        debug!(
            "event=local_merge module=repo status=ok merged_id={} links_removed={} links_added={}",
            plan.merged.id,
            plan.links_removed.len(),
            plan.links_added.len()
        );
        Ok(())
    }
}

fn upsert_thought(
    conn: &Connection,
    owner_id: &str,
    thought: &Thought,
    payload: &str,
) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO thoughts (owner_id, id, timestamp_ms, payload)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (owner_id, id) DO UPDATE SET
            timestamp_ms = excluded.timestamp_ms,
            payload = excluded.payload,
            stored_at = (strftime('%s', 'now') * 1000);",
        params![
            owner_id,
            thought.id.as_str(),
            thought.timestamp.timestamp_millis(),
            payload,
        ],
    )?;
    Ok(())
}

fn delete_thought_in_tx(
    tx: &Transaction<'_>,
    owner_id: &str,
    id: &ThoughtId,
) -> StorageResult<usize> {
    tx.execute(
        "DELETE FROM manual_links
         WHERE owner_id = ?1 AND (low_id = ?2 OR high_id = ?2);",
        params![owner_id, id.as_str()],
    )?;
    let removed = tx.execute(
        "DELETE FROM thoughts WHERE owner_id = ?1 AND id = ?2;",
        params![owner_id, id.as_str()],
    )?;
    Ok(removed)
}

fn insert_link(conn: &Connection, owner_id: &str, link: &ManualLink) -> StorageResult<usize> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO manual_links (owner_id, low_id, high_id)
         VALUES (?1, ?2, ?3);",
        params![owner_id, link.low().as_str(), link.high().as_str()],
    )?;
    Ok(changed)
}

fn delete_link(conn: &Connection, owner_id: &str, link: &ManualLink) -> StorageResult<usize> {
    let changed = conn.execute(
        "DELETE FROM manual_links
         WHERE owner_id = ?1 AND low_id = ?2 AND high_id = ?3;",
        params![owner_id, link.low().as_str(), link.high().as_str()],
    )?;
    Ok(changed)
}

fn parse_thought_row(row: &Row<'_>) -> StorageResult<Thought> {
    let id: String = row.get("id")?;
    let payload: String = row.get("payload")?;
    let thought: Thought = serde_json::from_str(&payload).map_err(|err| {
        StorageError::InvalidData(format!("undecodable payload for thought `{id}`: {err}"))
    })?;
    if thought.id.as_str() != id {
        return Err(StorageError::InvalidData(format!(
            "payload id `{}` does not match row id `{id}`",
            thought.id
        )));
    }
    thought.validate()?;
    Ok(thought)
}
