//! Domain error types and the engine-wide error taxonomy
//!
//! Two layers live here:
//! - [`DomainError`]: validation failures raised by newtype constructors and
//!   entity state transitions.
//! - [`SyncError`] + [`ErrorClass`]: the taxonomy every per-item failure is
//!   folded into. The propagation scheduler keys its retry/skip/abort
//!   decisions off the class, never off error message text.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote identifier
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid entity tag
    #[error("Invalid etag: {0}")]
    InvalidEtag(String),

    /// Invalid checksum format (expected `ALGO:hex`)
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

// ============================================================================
// ErrorClass - retry taxonomy
// ============================================================================

/// Classification of a per-item failure, driving the scheduler's response.
///
/// | Class              | Scheduler response                                |
/// |--------------------|---------------------------------------------------|
/// | `Validation`       | never retried; recorded as a skip reason          |
/// | `Transient`        | retried with backoff up to a bound                |
/// | `Integrity`        | retried once as full-transfer fallback, then fail |
/// | `Policy`           | never retried; surfaced immediately               |
/// | `JournalUnavailable` | fatal to the whole run                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Unsupported filename/path, symlink, policy-excluded
    Validation,
    /// Network timeout, server 5xx, rate limit, disk-full-during-write
    Transient,
    /// Checksum mismatch, malformed delta manifest
    Integrity,
    /// Permission denied, quota exceeded, read-only share
    Policy,
    /// The journal store itself failed; the run cannot claim convergence
    JournalUnavailable,
}

impl ErrorClass {
    /// Whether the scheduler may re-attempt an operation failing with this class.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Integrity)
    }

    /// Whether a failure of this class aborts the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::JournalUnavailable)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::Integrity => "integrity",
            Self::Policy => "policy",
            Self::JournalUnavailable => "journal-unavailable",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// SyncError - classified per-item error
// ============================================================================

/// A classified error attached to one item (or to the run, when fatal).
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Filename/path rejected by validity rules
    #[error("Unsupported filename: {reason}")]
    UnsupportedName {
        /// Why the name was rejected
        reason: String,
    },

    /// Symbolic links are not synchronized
    #[error("Symbolic links are not supported: {0}")]
    SymlinkUnsupported(String),

    /// Network-level failure (connection, DNS, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Per-operation network timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Remote returned a retryable status (5xx, 429)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server-provided detail, if any
        message: String,
    },

    /// Local I/O failure during a job
    #[error("Local I/O error: {0}")]
    LocalIo(String),

    /// Transferred content did not match the declared checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Server-declared checksum
        expected: String,
        /// Checksum of the received bytes
        actual: String,
    },

    /// Delta manifest could not be parsed or was internally inconsistent
    #[error("Malformed delta manifest: {0}")]
    MalformedManifest(String),

    /// The remote denied the required capability
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote quota exhausted
    #[error("Insufficient remote storage: {0}")]
    QuotaExceeded(String),

    /// Target name collides case-insensitively with a different remote entry
    #[error("Case-insensitive name collision with remote entry: {0}")]
    CaseClash(String),

    /// The journal store failed; the run aborts
    #[error("Journal unavailable: {0}")]
    JournalUnavailable(String),
}

impl SyncError {
    /// Fold this error into its taxonomy class.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedName { .. } | Self::SymlinkUnsupported(_) => ErrorClass::Validation,
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } | Self::LocalIo(_) => {
                ErrorClass::Transient
            }
            Self::ChecksumMismatch { .. } | Self::MalformedManifest(_) => ErrorClass::Integrity,
            Self::PermissionDenied(_) | Self::QuotaExceeded(_) | Self::CaseClash(_) => {
                ErrorClass::Policy
            }
            Self::JournalUnavailable(_) => ErrorClass::JournalUnavailable,
        }
    }

    /// Shorthand for `self.class().is_retryable()`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}
