use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = include_str!("../db/schema.sql");

/// Which key/value table a store reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    /// Survives restarts until explicitly removed.
    Durable,
    /// Holds the state of one login attempt.
    Session,
}

impl StorageScope {
    fn table(self) -> &'static str {
        match self {
            StorageScope::Durable => "local_storage",
            StorageScope::Session => "session_storage",
        }
    }
}

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Read a value from the given scope.
pub fn get_value(conn: &Connection, scope: StorageScope, key: &str) -> Result<Option<String>> {
    let sql = format!("SELECT value FROM {} WHERE key = ?1 LIMIT 1", scope.table());
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(params![key], |r| r.get::<_, String>(0))
        .optional()?;
    Ok(row)
}

/// Insert or overwrite a value in the given scope.
pub fn set_value(conn: &Connection, scope: StorageScope, key: &str, value: &str) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} (key, value, updated_at) VALUES (?1, ?2, strftime('%s','now')) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = strftime('%s','now')",
        scope.table()
    );
    conn.execute(&sql, params![key, value])?;
    Ok(())
}

/// Delete a key. Returns true if a row was removed.
pub fn remove_value(conn: &Connection, scope: StorageScope, key: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE key = ?1", scope.table());
    let removed = conn.execute(&sql, params![key])?;
    Ok(removed > 0)
}

/// Delete rows last written before `cutoff` (epoch seconds). Returns how many
/// rows were removed.
pub fn prune_older_than(conn: &Connection, scope: StorageScope, cutoff: i64) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE updated_at < ?1", scope.table());
    let removed = conn.execute(&sql, params![cutoff])?;
    Ok(removed)
}
