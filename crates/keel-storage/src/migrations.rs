//! Database schema migrations.
//!
//! Applies the memory schema: the conversation log, the context table,
//! and the schema_migrations bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use keel_core::error::KeelError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), KeelError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| KeelError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = current_version(conn)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: memory_schema");
    }

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, KeelError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| KeelError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: conversation log and context table.
///
/// AUTOINCREMENT keeps ids strictly increasing even after the log has been
/// cleared or trimmed, so id order is insertion order for the lifetime of
/// the file.
fn apply_v1(conn: &Connection) -> Result<(), KeelError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp   TEXT NOT NULL,
            role        TEXT NOT NULL
                        CHECK (role IN ('user', 'assistant', 'system')),
            content     TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_role
            ON conversations (role, id DESC);

        CREATE TABLE IF NOT EXISTS context (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'memory_schema');
        ",
    )
    .map_err(|e| KeelError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}
