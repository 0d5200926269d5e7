//! SQLite implementation of the JournalStore port
//!
//! Handles all domain type serialization/deserialization and SQL query
//! construction.
//!
//! ## Type Mapping
//!
//! | Domain Type    | SQL Type | Strategy                                    |
//! |----------------|----------|---------------------------------------------|
//! | SyncPath       | TEXT     | Relative path string; root is the empty string |
//! | RemoteId, Etag | TEXT     | String via `.as_str()` / `::new()`          |
//! | Checksum       | TEXT     | `ALGO:hex` string, nullable                 |
//! | EntryKind      | TEXT     | `"file"` / `"directory"`                    |
//! | PinState       | TEXT     | `PinState::name()` / `PinState::parse()`    |
//! | Permissions    | TEXT     | Letter codes via `to_codes()` / `from_codes()` |
//! | DateTime<Utc>  | TEXT     | ISO 8601 via `to_rfc3339()`                 |
//!
//! Prefix scans rely on paths sorting bytewise: everything under `dir` lies
//! in the half-open range `["dir/", "dir0")` because `'0'` is the successor
//! of `'/'` in ASCII.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tidesync_core::domain::journal_record::{JournalRecord, PinState, UploadInfo};
use tidesync_core::domain::newtypes::{Checksum, SyncPath};
use tidesync_core::ports::JournalStore;

use crate::JournalError;

/// SQLite-based implementation of the journal store port
///
/// All operations go through a connection pool; row-level atomicity comes
/// from SQLite itself, and the prefix rename cascade runs in an explicit
/// transaction.
pub struct SqliteJournalStore {
    pool: SqlitePool,
}

impl SqliteJournalStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, JournalError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            JournalError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Reconstruct a JournalRecord from a database row
///
/// Uses serde JSON deserialization to reconstruct the record since the
/// struct has private fields that can only be set through constructors or
/// deserialization.
fn record_from_row(row: &SqliteRow) -> Result<JournalRecord, JournalError> {
    let path: String = row.get("path");
    let kind: String = row.get("kind");
    let remote_id: String = row.get("remote_id");
    let etag: String = row.get("etag");
    let checksum: Option<String> = row.get("checksum");
    let size: i64 = row.get("size");
    let modified: String = row.get("modified");
    let permissions: String = row.get("permissions");
    let inode: i64 = row.get("inode");
    let local_mtime: i64 = row.get("local_mtime");
    let local_size: i64 = row.get("local_size");
    let local_mode: i64 = row.get("local_mode");
    let pin_state: String = row.get("pin_state");
    let consecutive_failures: i64 = row.get("consecutive_failures");
    let retry_after: Option<String> = row.get("retry_after");

    // Validate the stored timestamps up front for a precise error message.
    parse_datetime(&modified)?;
    if let Some(ref ts) = retry_after {
        parse_datetime(ts)?;
    }

    let record_json = serde_json::json!({
        "path": path,
        "kind": kind,
        "remote_id": remote_id,
        "etag": etag,
        "checksum": checksum,
        "size": size as u64,
        "modified": modified,
        "permissions": permissions,
        "fingerprint": {
            "inode": inode as u64,
            "mtime": local_mtime,
            "size": local_size as u64,
            "mode": local_mode as u32,
        },
        "pin_state": pin_state,
        "consecutive_failures": consecutive_failures as u32,
        "retry_after": retry_after,
    });

    serde_json::from_value(record_json).map_err(|e| {
        JournalError::SerializationError(format!(
            "Failed to reconstruct journal record for '{}': {}",
            path, e
        ))
    })
}

fn upload_info_from_row(row: &SqliteRow) -> Result<UploadInfo, JournalError> {
    let transfer_id: String = row.get("transfer_id");
    let next_chunk: i64 = row.get("next_chunk");
    let chunk_count: i64 = row.get("chunk_count");
    let mtime: i64 = row.get("mtime");
    let size: i64 = row.get("size");
    let checksum: Option<String> = row.get("checksum");

    let checksum = checksum
        .map(|s| {
            Checksum::new(s).map_err(|e| {
                JournalError::SerializationError(format!("Invalid stored checksum: {}", e))
            })
        })
        .transpose()?;

    Ok(UploadInfo {
        transfer_id,
        next_chunk: next_chunk as u32,
        chunk_count: chunk_count as u32,
        mtime,
        size: size as u64,
        checksum,
    })
}

/// Upper bound of the bytewise range containing every descendant of `dir`.
fn prefix_bounds(dir: &SyncPath) -> (String, String) {
    let low = format!("{}/", dir.as_str());
    let high = format!("{}0", dir.as_str());
    (low, high)
}

// ============================================================================
// JournalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl JournalStore for SqliteJournalStore {
    async fn upsert(&self, record: &JournalRecord) -> anyhow::Result<()> {
        let fingerprint = record.fingerprint();
        sqlx::query(
            r#"
            INSERT INTO journal (
                path, kind, remote_id, etag, checksum, size, modified,
                permissions, inode, local_mtime, local_size, local_mode,
                pin_state, consecutive_failures, retry_after
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(path) DO UPDATE SET
                kind = excluded.kind,
                remote_id = excluded.remote_id,
                etag = excluded.etag,
                checksum = excluded.checksum,
                size = excluded.size,
                modified = excluded.modified,
                permissions = excluded.permissions,
                inode = excluded.inode,
                local_mtime = excluded.local_mtime,
                local_size = excluded.local_size,
                local_mode = excluded.local_mode,
                pin_state = excluded.pin_state,
                consecutive_failures = excluded.consecutive_failures,
                retry_after = excluded.retry_after
            "#,
        )
        .bind(record.path().as_str())
        .bind(record.kind().name())
        .bind(record.remote_id().as_str())
        .bind(record.etag().as_str())
        .bind(record.checksum().map(Checksum::as_str))
        .bind(record.size() as i64)
        .bind(record.modified().to_rfc3339())
        .bind(record.permissions().to_codes())
        .bind(fingerprint.inode as i64)
        .bind(fingerprint.mtime)
        .bind(fingerprint.size as i64)
        .bind(i64::from(fingerprint.mode))
        .bind(record.pin_state().name())
        .bind(i64::from(record.consecutive_failures()))
        .bind(record.retry_after().map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(JournalError::from)?;
        Ok(())
    }

    async fn get(&self, path: &SyncPath) -> anyhow::Result<Option<JournalRecord>> {
        let row = sqlx::query("SELECT * FROM journal WHERE path = ?1")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(JournalError::from)?;
        row.as_ref().map(record_from_row).transpose().map_err(Into::into)
    }

    async fn delete(&self, path: &SyncPath) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM journal WHERE path = ?1")
            .bind(path.as_str())
            .execute(&self.pool)
            .await
            .map_err(JournalError::from)?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &SyncPath) -> anyhow::Result<Vec<JournalRecord>> {
        let rows = if prefix.is_root() {
            sqlx::query("SELECT * FROM journal WHERE path != '' ORDER BY path")
                .fetch_all(&self.pool)
                .await
        } else {
            let (low, high) = prefix_bounds(prefix);
            sqlx::query("SELECT * FROM journal WHERE path >= ?1 AND path < ?2 ORDER BY path")
                .bind(low)
                .bind(high)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(JournalError::from)?;

        rows.iter()
            .map(|row| record_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn rename_prefix(&self, from: &SyncPath, to: &SyncPath) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(JournalError::from)?;

        sqlx::query("UPDATE journal SET path = ?2 WHERE path = ?1")
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *tx)
            .await
            .map_err(JournalError::from)?;

        let (low, high) = prefix_bounds(from);
        sqlx::query(
            r#"
            UPDATE journal
            SET path = ?3 || substr(path, length(?4) + 1)
            WHERE path >= ?1 AND path < ?2
            "#,
        )
        .bind(&low)
        .bind(&high)
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(JournalError::from)?;

        sqlx::query("UPDATE upload_info SET path = ?2 WHERE path = ?1")
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *tx)
            .await
            .map_err(JournalError::from)?;

        sqlx::query(
            r#"
            UPDATE upload_info
            SET path = ?3 || substr(path, length(?4) + 1)
            WHERE path >= ?1 AND path < ?2
            "#,
        )
        .bind(&low)
        .bind(&high)
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(JournalError::from)?;

        tx.commit().await.map_err(JournalError::from)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &SyncPath) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(JournalError::from)?;

        let (low, high) = prefix_bounds(prefix);
        sqlx::query("DELETE FROM journal WHERE path = ?1 OR (path >= ?2 AND path < ?3)")
            .bind(prefix.as_str())
            .bind(&low)
            .bind(&high)
            .execute(&mut *tx)
            .await
            .map_err(JournalError::from)?;

        sqlx::query("DELETE FROM upload_info WHERE path = ?1 OR (path >= ?2 AND path < ?3)")
            .bind(prefix.as_str())
            .bind(&low)
            .bind(&high)
            .execute(&mut *tx)
            .await
            .map_err(JournalError::from)?;

        tx.commit().await.map_err(JournalError::from)?;
        Ok(())
    }

    async fn all(&self) -> anyhow::Result<Vec<JournalRecord>> {
        let rows = sqlx::query("SELECT * FROM journal ORDER BY path")
            .fetch_all(&self.pool)
            .await
            .map_err(JournalError::from)?;
        rows.iter()
            .map(|row| record_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn set_pin_state(&self, path: &SyncPath, state: PinState) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE journal SET pin_state = ?2 WHERE path = ?1")
            .bind(path.as_str())
            .bind(state.name())
            .execute(&self.pool)
            .await
            .map_err(JournalError::from)?;
        if result.rows_affected() == 0 {
            anyhow::bail!("no journal record for '{}'", path);
        }
        Ok(())
    }

    async fn upload_info(&self, path: &SyncPath) -> anyhow::Result<Option<UploadInfo>> {
        let row = sqlx::query("SELECT * FROM upload_info WHERE path = ?1")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(JournalError::from)?;
        row.as_ref()
            .map(upload_info_from_row)
            .transpose()
            .map_err(Into::into)
    }

    async fn set_upload_info(&self, path: &SyncPath, info: &UploadInfo) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_info (path, transfer_id, next_chunk, chunk_count, mtime, size, checksum)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(path) DO UPDATE SET
                transfer_id = excluded.transfer_id,
                next_chunk = excluded.next_chunk,
                chunk_count = excluded.chunk_count,
                mtime = excluded.mtime,
                size = excluded.size,
                checksum = excluded.checksum
            "#,
        )
        .bind(path.as_str())
        .bind(&info.transfer_id)
        .bind(i64::from(info.next_chunk))
        .bind(i64::from(info.chunk_count))
        .bind(info.mtime)
        .bind(info.size as i64)
        .bind(info.checksum.as_ref().map(Checksum::as_str))
        .execute(&self.pool)
        .await
        .map_err(JournalError::from)?;
        Ok(())
    }

    async fn clear_upload_info(&self, path: &SyncPath) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM upload_info WHERE path = ?1")
            .bind(path.as_str())
            .execute(&self.pool)
            .await
            .map_err(JournalError::from)?;
        Ok(())
    }
}
