//! Bounded conversation memory and key/value context.
//!
//! The conversation log is append-only and capped at `max_history`
//! entries; when an append pushes it over the cap the oldest entries are
//! evicted by ascending id in the same transaction. The context table is
//! a plain upsert store of JSON values.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use keel_core::error::KeelError;
use keel_core::types::{ContextEntry, ConversationEntry, Params, Role};

use crate::db::Database;

/// Conversation log plus context table over one [`Database`].
pub struct MemoryStore {
    db: Arc<Database>,
    max_history: u64,
}

impl MemoryStore {
    /// Create a store that keeps at most `max_history` conversation entries.
    pub fn new(db: Arc<Database>, max_history: u64) -> Result<Self, KeelError> {
        if max_history == 0 {
            return Err(KeelError::Config(
                "memory.max_history_items must be at least 1".to_string(),
            ));
        }
        Ok(Self { db, max_history })
    }

    pub fn max_history(&self) -> u64 {
        self.max_history
    }

    // -----------------------------------------------------------------
    // Conversation log
    // -----------------------------------------------------------------

    /// Append one entry and evict the oldest surplus entries.
    ///
    /// After this returns the log holds at most `max_history` entries.
    pub fn append(
        &self,
        role: Role,
        content: &str,
        metadata: Params,
    ) -> Result<ConversationEntry, KeelError> {
        if content.is_empty() {
            return Err(KeelError::InvalidInput(
                "content must not be empty".to_string(),
            ));
        }

        let timestamp = Utc::now().trunc_subsecs(6);
        let metadata_json = serde_json::to_string(&metadata)?;
        let max = self.max_history as i64;

        let (id, evicted) = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;

            tx.execute(
                "INSERT INTO conversations (timestamp, role, content, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_timestamp(&timestamp),
                    role.as_str(),
                    content,
                    metadata_json
                ],
            )
            .map_err(|e| KeelError::Storage(format!("Failed to append entry: {}", e)))?;
            let id = tx.last_insert_rowid();

            let count: i64 = tx
                .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
                .map_err(storage_err)?;

            let surplus = count - max;
            let evicted = if surplus > 0 {
                tx.execute(
                    "DELETE FROM conversations
                     WHERE id IN (
                         SELECT id FROM conversations
                         ORDER BY id ASC
                         LIMIT ?1
                     )",
                    params![surplus],
                )
                .map_err(|e| KeelError::Storage(format!("Failed to evict entries: {}", e)))?
            } else {
                0
            };

            tx.commit().map_err(storage_err)?;
            Ok((id, evicted))
        })?;

        debug!(id, role = %role, content_len = content.len(), "Conversation entry appended");
        if evicted > 0 {
            info!(evicted, max_history = self.max_history, "Conversation log trimmed");
        }

        Ok(ConversationEntry {
            id,
            timestamp,
            role,
            content: content.to_string(),
            metadata,
        })
    }

    /// The most recent `limit` entries, optionally of one role, oldest first.
    pub fn recall(
        &self,
        limit: usize,
        role: Option<Role>,
    ) -> Result<Vec<ConversationEntry>, KeelError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit as i64;

        let mut entries = self.db.with_conn(|conn| {
            let mut stmt = match role {
                Some(_) => conn.prepare(
                    "SELECT id, timestamp, role, content, metadata
                     FROM conversations
                     WHERE role = ?1
                     ORDER BY id DESC
                     LIMIT ?2",
                ),
                None => conn.prepare(
                    "SELECT id, timestamp, role, content, metadata
                     FROM conversations
                     ORDER BY id DESC
                     LIMIT ?1",
                ),
            }
            .map_err(|e| KeelError::Storage(format!("Recall query prepare: {}", e)))?;

            let rows = match role {
                Some(r) => stmt.query_map(params![r.as_str(), limit], map_entry),
                None => stmt.query_map(params![limit], map_entry),
            }
            .map_err(|e| KeelError::Storage(format!("Recall query: {}", e)))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(storage_err)??);
            }
            Ok(entries)
        })?;

        // Selected newest-first by id; callers want chronological order.
        entries.reverse();
        Ok(entries)
    }

    /// Number of entries currently in the conversation log.
    pub fn count(&self) -> Result<u64, KeelError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
                .map_err(storage_err)?;
            Ok(count as u64)
        })
    }

    /// Delete all conversation entries, and the context table too if asked.
    pub fn clear(&self, clear_context: bool) -> Result<(), KeelError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;
            tx.execute("DELETE FROM conversations", [])
                .map_err(storage_err)?;
            if clear_context {
                tx.execute("DELETE FROM context", []).map_err(storage_err)?;
            }
            tx.commit().map_err(storage_err)
        })?;
        info!(clear_context, "Memory cleared");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Context table
    // -----------------------------------------------------------------

    /// Value stored under `key`, if any.
    pub fn get_context(&self, key: &str) -> Result<Option<serde_json::Value>, KeelError> {
        Ok(self.get_context_entry(key)?.map(|entry| entry.value))
    }

    /// Full context row stored under `key`, if any.
    pub fn get_context_entry(&self, key: &str) -> Result<Option<ContextEntry>, KeelError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT key, value, updated_at FROM context WHERE key = ?1",
                    params![key],
                    |row| Ok(row_to_context(row)),
                )
                .optional()
                .map_err(storage_err)?;
            row.transpose()
        })
    }

    /// Insert or overwrite the value under `key`, refreshing `updated_at`.
    pub fn set_context(&self, key: &str, value: &serde_json::Value) -> Result<(), KeelError> {
        if key.is_empty() {
            return Err(KeelError::InvalidInput("key must not be empty".to_string()));
        }
        let value_json = serde_json::to_string(value)?;
        let updated_at = format_timestamp(&Utc::now().trunc_subsecs(6));

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO context (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value_json, updated_at],
            )
            .map_err(|e| KeelError::Storage(format!("Failed to set context: {}", e)))?;
            Ok(())
        })?;

        debug!(key, "Context updated");
        Ok(())
    }

    /// Remove `key`. Returns whether a row was deleted.
    pub fn delete_context(&self, key: &str) -> Result<bool, KeelError> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM context WHERE key = ?1", params![key])
                .map_err(storage_err)?;
            Ok(deleted > 0)
        })
    }

    /// All context rows ordered by key.
    pub fn list_context(&self) -> Result<Vec<ContextEntry>, KeelError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value, updated_at FROM context ORDER BY key ASC")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| Ok(row_to_context(row)))
                .map_err(storage_err)?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(storage_err)??);
            }
            Ok(entries)
        })
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn storage_err(e: rusqlite::Error) -> KeelError {
    KeelError::Storage(e.to_string())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, KeelError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| KeelError::Storage(format!("Invalid timestamp '{}': {}", raw, e)))
}

/// Row callback for `query_map`; decoding errors stay in the inner result.
fn map_entry(row: &rusqlite::Row) -> rusqlite::Result<Result<ConversationEntry, KeelError>> {
    Ok(row_to_entry(row))
}

fn row_to_entry(row: &rusqlite::Row) -> Result<ConversationEntry, KeelError> {
    let id: i64 = row.get(0).map_err(storage_err)?;
    let timestamp: String = row.get(1).map_err(storage_err)?;
    let role: String = row.get(2).map_err(storage_err)?;
    let content: String = row.get(3).map_err(storage_err)?;
    let metadata: String = row.get(4).map_err(storage_err)?;

    Ok(ConversationEntry {
        id,
        timestamp: parse_timestamp(&timestamp)?,
        role: role.parse::<Role>().map_err(KeelError::Storage)?,
        content,
        metadata: serde_json::from_str(&metadata)?,
    })
}

fn row_to_context(row: &rusqlite::Row) -> Result<ContextEntry, KeelError> {
    let key: String = row.get(0).map_err(storage_err)?;
    let value: String = row.get(1).map_err(storage_err)?;
    let updated_at: String = row.get(2).map_err(storage_err)?;

    Ok(ContextEntry {
        key,
        value: serde_json::from_str(&value)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
