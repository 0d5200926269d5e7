//! Journal store port (driven/secondary port)
//!
//! Persistent path-keyed store of [`JournalRecord`]s. The SQLite adapter
//! lives in `tidesync-journal`; tests use an in-memory implementation.
//!
//! Errors use `anyhow::Result` at this boundary (adapter-specific detail);
//! the run controller folds any journal failure into the fatal
//! "journal unavailable" class, since the engine cannot claim convergence
//! without a durable record.

use crate::domain::journal_record::{JournalRecord, PinState, UploadInfo};
use crate::domain::newtypes::SyncPath;

/// Path-keyed persistent store of synchronized state.
///
/// Row-level atomicity is required: each upsert either fully lands or is
/// absent after a crash. No cross-row transaction is assumed except
/// [`rename_prefix`](JournalStore::rename_prefix), which must cascade a
/// directory move atomically.
#[async_trait::async_trait]
pub trait JournalStore: Send + Sync {
    /// Insert or replace the record for its path.
    async fn upsert(&self, record: &JournalRecord) -> anyhow::Result<()>;

    /// Point lookup.
    async fn get(&self, path: &SyncPath) -> anyhow::Result<Option<JournalRecord>>;

    /// Remove the record for a path, if present.
    async fn delete(&self, path: &SyncPath) -> anyhow::Result<()>;

    /// All records under a directory path (the directory itself excluded),
    /// in lexicographic path order.
    async fn scan_prefix(&self, prefix: &SyncPath) -> anyhow::Result<Vec<JournalRecord>>;

    /// Re-key a directory record and all its descendants from `from` to
    /// `to`, atomically.
    async fn rename_prefix(&self, from: &SyncPath, to: &SyncPath) -> anyhow::Result<()>;

    /// Remove a directory record and all its descendants.
    async fn delete_prefix(&self, prefix: &SyncPath) -> anyhow::Result<()>;

    /// Every record, in lexicographic path order.
    async fn all(&self) -> anyhow::Result<Vec<JournalRecord>>;

    /// Update only the pin state of a record.
    async fn set_pin_state(&self, path: &SyncPath, state: PinState) -> anyhow::Result<()>;

    /// Resumable-upload bookkeeping.
    async fn upload_info(&self, path: &SyncPath) -> anyhow::Result<Option<UploadInfo>>;
    async fn set_upload_info(&self, path: &SyncPath, info: &UploadInfo) -> anyhow::Result<()>;
    async fn clear_upload_info(&self, path: &SyncPath) -> anyhow::Result<()>;
}
