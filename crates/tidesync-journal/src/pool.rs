//! Journal database setup.
//!
//! The journal is one SQLite file under the user's data directory. WAL mode
//! keeps scanner reads cheap while propagation commits rows; the schema is
//! embedded in the binary and applied on every open (idempotent `CREATE IF
//! NOT EXISTS` statements), so a fresh file and an existing journal go
//! through the same path.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::JournalError;

const SCHEMA: &str = include_str!("migrations/20260815_initial.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the SQLite pool behind the sync journal.
pub struct JournalPool {
    pool: SqlitePool,
}

impl JournalPool {
    /// Open the journal at `db_path`, creating the file and its parent
    /// directories when missing, and bring the schema up to date.
    pub async fn new(db_path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                JournalError::ConnectionFailed(format!(
                    "cannot create journal directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        // NORMAL sync suffices here: the journal is rebuildable state (a
        // resync re-derives it), and WAL already bounds the loss window.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                JournalError::ConnectionFailed(format!(
                    "cannot open journal at {}: {e}",
                    db_path.display()
                ))
            })?;

        let this = Self::with_schema(pool).await?;
        tracing::info!(path = %db_path.display(), "journal opened");
        Ok(this)
    }

    /// Private in-memory journal for tests. Capped at one connection: an
    /// in-memory SQLite database lives and dies with its connection.
    pub async fn in_memory() -> Result<Self, JournalError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                JournalError::ConnectionFailed(format!("cannot open in-memory journal: {e}"))
            })?;
        Self::with_schema(pool).await
    }

    /// The underlying connection pool, for the repository layer.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn with_schema(pool: SqlitePool) -> Result<Self, JournalError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(|e| {
            JournalError::MigrationFailed(format!("journal schema setup failed: {e}"))
        })?;
        Ok(Self { pool })
    }
}
