use dreamnote_core::db::migrations::latest_version;
use dreamnote_core::db::{open_db, open_db_in_memory, open_shared_db_in_memory, DbError};
use dreamnote_core::repo::StorageError;
use dreamnote_core::SqliteLocalStore;
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "thoughts");
    assert_table_exists(&conn, "manual_links");
    assert_table_exists(&conn, "device_flags");
    assert_table_exists(&conn, "legacy_records");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dreamnote.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "thoughts");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn manual_links_reject_unordered_pairs() {
    let conn = open_db_in_memory().unwrap();
    let err = conn
        .execute(
            "INSERT INTO manual_links (owner_id, low_id, high_id) VALUES ('o', 'b', 'a');",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("CHECK"));
}

#[test]
fn store_construction_requires_migrated_connection() {
    let raw = dreamnote_core::db::share(Connection::open_in_memory().unwrap());
    let err = SqliteLocalStore::try_new(raw, "owner").err().unwrap();
    assert!(matches!(err, StorageError::MissingTable("thoughts")));

    let migrated = open_shared_db_in_memory().unwrap();
    assert!(SqliteLocalStore::try_new(migrated, "owner").is_ok());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
