//! Remote store port (driven/secondary port)
//!
//! Interface to the server-hosted file tree: an opaque, capability-described
//! HTTP object store with etag versioning. The primary implementation lives
//! in `tidesync-remote`; tests use an in-memory fake.
//!
//! ## Design Notes
//!
//! - Errors are a typed [`RemoteError`] rather than `anyhow`, because the
//!   propagation scheduler keys retry decisions off the error class and must
//!   never parse message text.
//! - `RemoteEntry` is a port-level DTO, not a domain entity; discovery maps
//!   it onto change records.
//! - Mutations take an optional etag precondition (If-Match) so a concurrent
//!   remote edit fails the operation instead of being overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::errors::{ErrorClass, SyncError};
use crate::domain::journal_record::{EntryKind, Permissions};
use crate::domain::newtypes::{Checksum, Etag, RemoteId, SyncPath};

// ============================================================================
// RemoteError
// ============================================================================

/// Errors from the remote store adapter, pre-classified for the scheduler.
#[derive(Debug, Error, Clone)]
pub enum RemoteError {
    /// Connection-level failure (refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// The per-operation timeout elapsed
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Retryable server status (5xx, 408, 429)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response detail, if any
        message: String,
    },

    /// 403: the credential lacks the required capability
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404: the entry does not exist on the remote
    #[error("Not found: {0}")]
    NotFound(String),

    /// 507: remote quota exhausted
    #[error("Insufficient storage: {0}")]
    InsufficientStorage(String),

    /// 412: the etag precondition failed (remote changed underneath us)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The response could not be parsed into the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Fold into the engine-wide taxonomy.
    ///
    /// `NotFound` and `PreconditionFailed` map to `Transient`: both mean the
    /// remote moved underneath the run, and the correct response is to let
    /// the next discovery pass re-observe rather than to hard-fail the item.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_)
            | Self::Timeout(_)
            | Self::Server { .. }
            | Self::NotFound(_)
            | Self::PreconditionFailed(_) => ErrorClass::Transient,
            Self::Forbidden(_) | Self::InsufficientStorage(_) => ErrorClass::Policy,
            Self::InvalidResponse(_) => ErrorClass::Integrity,
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(msg) => SyncError::Network(msg),
            RemoteError::Timeout(msg) => SyncError::Timeout(msg),
            RemoteError::Server { status, message } => SyncError::Server { status, message },
            RemoteError::Forbidden(msg) => SyncError::PermissionDenied(msg),
            RemoteError::NotFound(msg) => SyncError::Network(format!("remote entry gone: {msg}")),
            RemoteError::InsufficientStorage(msg) => SyncError::QuotaExceeded(msg),
            RemoteError::PreconditionFailed(msg) => {
                SyncError::Network(format!("remote changed concurrently: {msg}"))
            }
            RemoteError::InvalidResponse(msg) => SyncError::MalformedManifest(msg),
        }
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// One entry from a remote directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Path relative to the sync root
    pub path: SyncPath,
    /// Opaque identifier, stable across renames
    pub id: RemoteId,
    pub kind: EntryKind,
    /// Version stamp; changes on every content/metadata change
    pub etag: Etag,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Server-computed content checksum, when the server provides one
    pub checksum: Option<Checksum>,
    /// Capability bitset for this entry
    pub permissions: Permissions,
}

/// Result of a successful remote mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutResult {
    pub id: RemoteId,
    pub etag: Etag,
}

// ============================================================================
// RemoteStore trait
// ============================================================================

/// Operations against the remote object store.
///
/// Every method is a suspension point; implementations apply the configured
/// per-operation timeout and surface it as [`RemoteError::Timeout`].
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the immediate children of a directory.
    async fn list(&self, path: &SyncPath) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Metadata of a single entry, or `None` if it does not exist.
    async fn stat(&self, path: &SyncPath) -> Result<Option<RemoteEntry>, RemoteError>;

    /// Download full content.
    async fn get(&self, id: &RemoteId) -> Result<Vec<u8>, RemoteError>;

    /// Download a byte range (for delta literal fetches and resume).
    async fn get_range(&self, id: &RemoteId, offset: u64, len: u64)
        -> Result<Vec<u8>, RemoteError>;

    /// Fetch the block-sum manifest for an entry, if the server keeps one.
    /// The raw bytes are parsed by the delta codec; a server without
    /// manifest support returns `Ok(None)`.
    async fn get_manifest(&self, id: &RemoteId) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Upload full content, creating or replacing the entry at `path`.
    async fn put(
        &self,
        path: &SyncPath,
        content: &[u8],
        if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError>;

    /// Upload one chunk of a resumable transfer.
    async fn put_chunk(
        &self,
        transfer_id: &str,
        index: u32,
        total: u32,
        content: &[u8],
    ) -> Result<(), RemoteError>;

    /// Assemble a finished chunked transfer into the entry at `path`.
    async fn finish_transfer(
        &self,
        transfer_id: &str,
        path: &SyncPath,
        if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError>;

    /// Create a directory.
    async fn mkdir(&self, path: &SyncPath) -> Result<PutResult, RemoteError>;

    /// Delete an entry (recursively, for directories).
    async fn delete(&self, id: &RemoteId, if_match: Option<&Etag>) -> Result<(), RemoteError>;

    /// Move/rename an entry; returns the (possibly new) etag.
    async fn move_entry(
        &self,
        id: &RemoteId,
        to: &SyncPath,
        if_match: Option<&Etag>,
    ) -> Result<PutResult, RemoteError>;
}
