//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration is a SQL batch that
//! transforms the schema from version N to N+1.

use rusqlite::Connection;

use synchub_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: it can be called on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated store schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Content items of every node. Filterable attributes are columns;
        -- the full item is kept as CBOR.
        CREATE TABLE items (
            node_id INTEGER NOT NULL,
            item_id INTEGER NOT NULL,
            item_type TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            language TEXT,
            sync_status TEXT NOT NULL DEFAULT 'none',
            sync_root TEXT,                   -- sync id without host
            data BLOB NOT NULL,

            PRIMARY KEY (node_id, item_id)
        );

        -- Loosely typed per-item metadata (JSON text).
        CREATE TABLE item_meta (
            node_id INTEGER NOT NULL,
            item_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT NOT NULL,
            PRIMARY KEY (node_id, item_id, meta_key)
        );

        CREATE TABLE clusters (
            cluster_id INTEGER PRIMARY KEY,
            data BLOB NOT NULL                -- CBOR Cluster
        );

        CREATE TABLE distribution_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            root_gid TEXT NOT NULL,
            destination_id TEXT NOT NULL,
            action TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            enqueued_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_error TEXT
        );

        CREATE TABLE reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL,
            item_id INTEGER NOT NULL,
            state TEXT NOT NULL,
            data BLOB NOT NULL,               -- CBOR ReviewRecord
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE condition_members (
            condition_id INTEGER PRIMARY KEY,
            members BLOB NOT NULL,            -- CBOR array of item ids
            fingerprint TEXT NOT NULL,
            checked_at INTEGER NOT NULL,
            next_run_at INTEGER NOT NULL
        );

        CREATE INDEX idx_items_name ON items(node_id, name, item_type);
        CREATE INDEX idx_items_sync_root ON items(node_id, sync_root);
        CREATE INDEX idx_distribution_status ON distribution_items(status);
        CREATE INDEX idx_reviews_item ON reviews(node_id, item_id);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "items",
            "item_meta",
            "clusters",
            "distribution_items",
            "reviews",
            "condition_members",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
