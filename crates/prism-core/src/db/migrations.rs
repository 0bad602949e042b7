//! Database migrations
//!
//! Migrations are additive only: each version creates new tables or indexes
//! and never rewrites an existing collection.

use crate::error::Result;
use rusqlite::{params, Connection};

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Statements creating one entity collection with its secondary indexes
fn entity_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            sort_key TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id);
        CREATE INDEX IF NOT EXISTS idx_{table}_sort ON {table}(sort_key);
        CREATE INDEX IF NOT EXISTS idx_{table}_created ON {table}(created_at);
        CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table}(updated_at DESC);"
    )
}

/// Apply one migration atomically and record its version
fn apply(conn: &mut Connection, version: i32, statements: &[String]) -> Result<()> {
    let tx = conn.transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated local store to version {version}");
    Ok(())
}

/// Migration to version 1: contacts, groups and custom field schemas
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )"
        .to_string(),
        entity_table("contacts"),
        entity_table("groups"),
        entity_table("custom_field_schemas"),
    ];
    apply(conn, 1, &statements)
}

/// Migration to version 2: per-contact custom field values
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    apply(conn, 2, &[entity_table("custom_fields")])
}

/// Migration to version 3: outbound sync queue
fn migrate_v3(conn: &mut Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            operation TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_ready ON sync_queue(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_entity ON sync_queue(entity_type, entity_id);"
            .to_string(),
    ];
    apply(conn, 3, &statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
        for table in [
            "contacts",
            "groups",
            "custom_field_schemas",
            "custom_fields",
            "sync_queue",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_upgrade_keeps_existing_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_v1(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO groups (id, owner_id, sort_key, created_at, updated_at, data)
             VALUES ('g1', 'u1', 'friends', 0, 0, '{}')",
            [],
        )
        .unwrap();

        run(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM groups", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }
}
