//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex so that every caller is
//! serialized through one writer. Configures WAL mode on initialization.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use keel_core::error::KeelError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Creates the parent directory, configures WAL mode and
    /// synchronous=NORMAL, and runs all pending migrations.
    pub fn new(path: &Path) -> Result<Self, KeelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| KeelError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| KeelError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, KeelError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KeelError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure, so a closure that
    /// opens a transaction has exclusive use of the store until it returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, KeelError>
    where
        F: FnOnce(&Connection) -> Result<T, KeelError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| KeelError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
