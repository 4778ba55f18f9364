//! Keel storage crate - SQLite persistence for the assistant's memory.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and the
//! [`MemoryStore`]: a bounded, append-only conversation log plus a
//! key/value context table.

pub mod db;
pub mod memory;
pub mod migrations;

pub use db::Database;
pub use memory::MemoryStore;
