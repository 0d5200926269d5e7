//! Sync instructions - the unified per-path decision of one discovery pass
//!
//! The discovery coordinator folds the local and remote change sets into at
//! most one [`SyncInstruction`] per path. Instructions are owned by a single
//! run; ordering guarantees (parents before children on creation, children
//! before parents on deletion) are established here and honored by the
//! propagation scheduler.

use serde::{Deserialize, Serialize};

use super::journal_record::{EntryKind, PinState};
use super::newtypes::{Checksum, Etag, RemoteId, SyncPath};

/// Which side's content is authoritative for an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSide {
    Local,
    Remote,
    /// Journal-only bookkeeping; neither side transfers content
    Neither,
}

/// The action the propagation stage must take for a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Transfer local content to the remote
    Upload,
    /// Transfer remote content to the local tree (or materialize a
    /// placeholder, depending on the pin state)
    Download,
    /// Create a directory on the remote
    MkdirRemote,
    /// Create a directory locally
    MkdirLocal,
    /// Delete the remote entry
    DeleteRemote,
    /// Delete the local entry
    DeleteLocal,
    /// Move/rename the remote entry to follow a local rename
    MoveRemote {
        /// Path the remote entry currently has
        from: SyncPath,
    },
    /// Rename the local entry to follow a remote rename
    RenameLocal {
        /// Path the local entry currently has
        from: SyncPath,
    },
    /// Both sides changed with different content: keep remote, preserve the
    /// local bytes under a conflict-marked name
    Conflict,
    /// Content converged; only journal metadata needs refreshing
    UpdateMetadata,
    /// Remove the journal row (entry gone from both sides)
    JournalCleanup,
    /// The remote denied the capability; local state is restored/kept and
    /// the violation reported
    PolicyRestore {
        /// Human-readable description of the denied capability
        denied: String,
    },
}

impl SyncAction {
    /// Stable name for logging and event payloads.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::MkdirRemote => "mkdir-remote",
            Self::MkdirLocal => "mkdir-local",
            Self::DeleteRemote => "delete-remote",
            Self::DeleteLocal => "delete-local",
            Self::MoveRemote { .. } => "move-remote",
            Self::RenameLocal { .. } => "rename-local",
            Self::Conflict => "conflict",
            Self::UpdateMetadata => "update-metadata",
            Self::JournalCleanup => "journal-cleanup",
            Self::PolicyRestore { .. } => "policy-restore",
        }
    }

    /// Whether this action deletes its target.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::DeleteRemote | Self::DeleteLocal)
    }

    /// Whether this action creates a directory.
    #[must_use]
    pub fn is_dir_creation(&self) -> bool {
        matches!(self, Self::MkdirRemote | Self::MkdirLocal)
    }
}

/// One per-path decision produced by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncInstruction {
    pub path: SyncPath,
    pub kind: EntryKind,
    pub action: SyncAction,
    pub source: SourceSide,
    /// Set when the instruction is the surfaced half of a two-sided edit
    pub is_conflict: bool,
    pub pin_state: PinState,
    /// Remote identity, when known (absent for first uploads)
    pub remote_id: Option<RemoteId>,
    /// Etag precondition for remote mutations (If-Match)
    pub expected_etag: Option<Etag>,
    /// Checksum the transfer must converge to, when known
    pub expected_checksum: Option<Checksum>,
    /// Bytes expected to move, for progress reporting
    pub expected_size: u64,
}

impl SyncInstruction {
    pub fn new(path: SyncPath, kind: EntryKind, action: SyncAction, source: SourceSide) -> Self {
        let is_conflict = matches!(action, SyncAction::Conflict);
        Self {
            path,
            kind,
            action,
            source,
            is_conflict,
            pin_state: PinState::Unspecified,
            remote_id: None,
            expected_etag: None,
            expected_checksum: None,
            expected_size: 0,
        }
    }

    pub fn with_pin_state(mut self, pin_state: PinState) -> Self {
        self.pin_state = pin_state;
        self
    }

    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn with_expected_etag(mut self, etag: Etag) -> Self {
        self.expected_etag = Some(etag);
        self
    }

    pub fn with_expected_checksum(mut self, checksum: Checksum) -> Self {
        self.expected_checksum = Some(checksum);
        self
    }

    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = size;
        self
    }

    /// Sort key honoring the directory-ordering invariant: creations are
    /// parent-first (ascending depth), deletions child-first (descending
    /// depth), and deletions run after all non-deletions so a replacement
    /// directory never races its doomed children.
    #[must_use]
    pub fn order_key(&self) -> (u8, i64, String) {
        let phase = u8::from(self.action.is_deletion());
        let depth = self.path.depth() as i64;
        let depth_key = if self.action.is_deletion() { -depth } else { depth };
        (phase, depth_key, self.path.as_str().to_string())
    }
}

/// Sort instructions into safe execution order.
pub fn order_instructions(instructions: &mut [SyncInstruction]) {
    instructions.sort_by_key(SyncInstruction::order_key);
}
