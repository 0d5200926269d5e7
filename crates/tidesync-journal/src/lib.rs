//! Tidesync Journal - persistent sync state
//!
//! SQLite-backed implementation of the `JournalStore` port from
//! `tidesync-core`: one row per synchronized entry plus resumable-upload
//! bookkeeping. It is a driven (secondary) adapter in the hexagonal
//! architecture.
//!
//! ## Key Components
//!
//! - [`JournalPool`] - Connection pool with migration support
//! - [`SqliteJournalStore`] - Full `JournalStore` implementation
//! - [`JournalError`] - Error types for journal operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use tidesync_journal::{JournalPool, SqliteJournalStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = JournalPool::new(Path::new("/home/user/.local/share/tidesync/journal.db")).await?;
//! let journal = SqliteJournalStore::new(pool.pool().clone());
//! // Use journal as JournalStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod store;

pub use pool::JournalPool;
pub use store::SqliteJournalStore;

/// Errors that can occur during journal operations
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for JournalError {
    fn from(e: sqlx::Error) -> Self {
        JournalError::QueryFailed(e.to_string())
    }
}
