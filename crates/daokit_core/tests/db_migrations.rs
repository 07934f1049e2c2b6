use daokit_core::db::migrations::{apply_migrations, latest_version};
use daokit_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "entities");
    assert_table_exists(&conn, "unique_keys");
}

#[test]
fn reopening_a_database_file_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daokit.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO entities (uuid, entity_type, runtime_type, payload)
             VALUES ('a', 'app::User', 'app::User', '{}');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let rows: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM entities;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn unique_keys_table_rejects_duplicate_values_per_type() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO entities (uuid, entity_type, runtime_type, payload)
         VALUES ('a', 'app::User', 'app::User', '{}'), ('b', 'app::User', 'app::User', '{}');
         INSERT INTO unique_keys (entity_type, key_name, key_value, entity_uuid)
         VALUES ('app::User', 'email', '[\"x\"]', 'a');",
    )
    .unwrap();

    let err = conn
        .execute(
            "INSERT INTO unique_keys (entity_type, key_name, key_value, entity_uuid)
             VALUES ('app::User', 'email', '[\"x\"]', 'b');",
            [],
        )
        .unwrap_err();
    assert_eq!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    );

    conn.execute(
        "INSERT INTO unique_keys (entity_type, key_name, key_value, entity_uuid)
         VALUES ('shop::Order', 'email', '[\"x\"]', 'b');",
        [],
    )
    .unwrap();
}

#[test]
fn version_one_database_upgrades_to_unique_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.db");

    let mut conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_storage.sql"))
        .unwrap();
    conn.execute_batch(
        "PRAGMA user_version = 1;
         INSERT INTO entities (uuid, entity_type, runtime_type, payload)
         VALUES ('a', 'app::User', 'app::User', '{}');",
    )
    .unwrap();

    apply_migrations(&mut conn).unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "unique_keys");
    let kept: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(kept, 1);

    apply_migrations(&mut conn).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

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
