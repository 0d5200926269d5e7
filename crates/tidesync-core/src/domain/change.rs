//! Change records - transient per-side deltas from one discovery pass
//!
//! A [`ChangeRecord`] captures one observed difference between a side (local
//! or remote) and the journal. Change records are owned by a single sync run
//! and never persisted; the discovery coordinator consumes them entirely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::journal_record::{EntryKind, Permissions};
use super::newtypes::{Checksum, Etag, RemoteId, SyncPath};

/// Which side of the pipe observed a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// What kind of delta was observed for a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present on the side, absent from the journal
    Added,
    /// Absent from the side, present in the journal
    Removed,
    /// Present on both, content signature differs
    Modified,
    /// Same identity observed at a new path; `from` is the journaled path
    Renamed {
        /// Previous (journaled) path of the entry
        from: SyncPath,
    },
    /// Only the permission bits differ
    PermissionsChanged,
}

impl ChangeKind {
    /// Stable name for logging and event payloads.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Renamed { .. } => "renamed",
            Self::PermissionsChanged => "permissions-changed",
        }
    }
}

/// Raw metadata observed on a side during scanning.
///
/// Remote observations carry etag/remote-id; local observations carry the
/// inode/mtime fingerprint fields. Either side may carry a checksum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedMeta {
    pub kind: Option<EntryKind>,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub checksum: Option<Checksum>,
    pub etag: Option<Etag>,
    pub remote_id: Option<RemoteId>,
    pub permissions: Option<Permissions>,
    pub inode: Option<u64>,
    pub mtime: Option<i64>,
}

/// One observed delta on one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: SyncPath,
    pub side: Side,
    pub kind: ChangeKind,
    pub observed: ObservedMeta,
}

impl ChangeRecord {
    pub fn new(path: SyncPath, side: Side, kind: ChangeKind, observed: ObservedMeta) -> Self {
        Self {
            path,
            side,
            kind,
            observed,
        }
    }
}

/// All changes one side produced in a single discovery pass, keyed by path.
///
/// A `BTreeMap` keeps iteration in lexicographic path order, which puts
/// parents before children for free.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: BTreeMap<SyncPath, ChangeRecord>,
    /// Paths excluded by validity rules or ignore patterns, with the reason.
    /// Excluded paths never surface as changes.
    excluded: Vec<(SyncPath, String)>,
    /// Per-path scan failures (unreadable subtrees); the rest of the scan
    /// is unaffected.
    scan_errors: Vec<(SyncPath, String)>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a change record. At most one record per path per pass; a
    /// later record for the same path replaces the earlier one.
    pub fn push(&mut self, record: ChangeRecord) {
        self.changes.insert(record.path.clone(), record);
    }

    pub fn record_excluded(&mut self, path: SyncPath, reason: impl Into<String>) {
        self.excluded.push((path, reason.into()));
    }

    pub fn record_scan_error(&mut self, path: SyncPath, error: impl Into<String>) {
        self.scan_errors.push((path, error.into()));
    }

    #[must_use]
    pub fn get(&self, path: &SyncPath) -> Option<&ChangeRecord> {
        self.changes.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.changes.values()
    }

    /// All paths that carry a change, in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &SyncPath> {
        self.changes.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn excluded(&self) -> &[(SyncPath, String)] {
        &self.excluded
    }

    #[must_use]
    pub fn scan_errors(&self) -> &[(SyncPath, String)] {
        &self.scan_errors
    }
}
