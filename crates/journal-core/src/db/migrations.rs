//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

/// Run a migration's statements atomically
fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: entries with sync metadata, settings
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                entry_date INTEGER NOT NULL,
                location TEXT,
                images TEXT NOT NULL DEFAULT '[]',
                is_marked INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                device_origin TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                local_version INTEGER NOT NULL DEFAULT 1,
                last_synced_version INTEGER NOT NULL DEFAULT 0,
                last_synced_at INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending_push'
            )",
            "CREATE INDEX IF NOT EXISTS idx_entries_updated ON entries(updated_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_entries_status ON entries(status)",
            "CREATE INDEX IF NOT EXISTS idx_entries_deleted ON entries(is_deleted)",
            // Settings table (local only)
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    )
}

/// Migration to version 2: shadow copies for conflicted entries
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        CURRENT_VERSION,
        &[
            "CREATE TABLE IF NOT EXISTS conflict_shadows (
                entry_id TEXT PRIMARY KEY REFERENCES entries(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                entry_date INTEGER NOT NULL,
                location TEXT,
                images TEXT NOT NULL DEFAULT '[]',
                is_marked INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                device_origin TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                recorded_at INTEGER NOT NULL
            )",
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v2_creates_shadow_table() {
        let conn = setup();
        run(&conn).unwrap();

        assert!(table_exists(&conn, "entries"));
        assert!(table_exists(&conn, "conflict_shadows"));
    }
}
