//! Events and run results exposed to the surrounding application
//!
//! The engine emits [`SyncEvent`]s over a broadcast channel; the GUI shell,
//! notifications and the CLI all consume the same stream. Events carry plain
//! data only; presentation is the consumer's problem.

use serde::{Deserialize, Serialize};

use super::errors::ErrorClass;
use super::newtypes::{RunId, SyncPath};

/// Why an item was skipped rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Filename failed validity rules
    InvalidName(String),
    /// Matched an ignore pattern
    Ignored(String),
    /// Symbolic link
    Symlink,
    /// Remote denied the required capability
    PolicyViolation(String),
    /// Path is in blacklist cooldown after repeated failures
    Blacklisted,
    /// A parent's job failed, cancelling this dependent
    DependencyFailed(SyncPath),
    /// The run was cancelled before this item started
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(reason) => write!(f, "invalid name: {reason}"),
            Self::Ignored(pattern) => write!(f, "ignored by pattern: {pattern}"),
            Self::Symlink => write!(f, "symbolic link"),
            Self::PolicyViolation(detail) => write!(f, "policy violation: {detail}"),
            Self::Blacklisted => write!(f, "blacklisted after repeated failures"),
            Self::DependencyFailed(parent) => write!(f, "parent failed: {parent}"),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// Terminal outcome of one item within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Side effect performed and journal committed
    Synced,
    /// Not attempted, with the recorded reason
    Skipped(SkipReason),
    /// Attempted and failed after retries were exhausted or barred
    Failed {
        /// Final error message
        error: String,
        /// Taxonomy class of the final error
        class: ErrorClass,
    },
    /// Two-sided edit resolved by preserving the local copy
    Conflict {
        /// Where the losing local bytes were preserved
        conflict_copy: SyncPath,
    },
}

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every instruction committed
    Success,
    /// Some items failed or were skipped; the rest committed
    Partial,
    /// The run aborted (journal unavailable or discovery failure)
    Error,
    /// Cancelled cooperatively; partial progress was kept
    Aborted,
}

/// Terminal result of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub items_synced: u64,
    /// Skipped items with their reasons
    pub skipped: Vec<(SyncPath, SkipReason)>,
    /// Failed items with their final error text
    pub failed: Vec<(SyncPath, String)>,
    /// Conflicts surfaced this run: (path, conflict copy)
    pub conflicts: Vec<(SyncPath, SyncPath)>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Derive the status from the counters: all-clean is `Success`,
    /// anything recorded is `Partial`.
    #[must_use]
    pub fn derive_status(&self) -> RunStatus {
        if self.failed.is_empty() && self.skipped.is_empty() && self.conflicts.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

/// Progress and result events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SyncEvent {
    RunStarted {
        run_id: RunId,
    },
    ItemStarted {
        path: SyncPath,
        action: String,
    },
    ItemProgress {
        path: SyncPath,
        bytes_transferred: u64,
        bytes_total: u64,
    },
    ItemResult {
        path: SyncPath,
        outcome: ItemOutcome,
    },
    ConflictDetected {
        path: SyncPath,
        conflict_copy: SyncPath,
    },
    RunFinished {
        summary: RunSummary,
    },
}
