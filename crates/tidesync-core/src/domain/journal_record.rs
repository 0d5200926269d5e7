//! Journal record - the persisted per-entry sync state
//!
//! One [`JournalRecord`] exists per synchronized filesystem entry. Its
//! presence is itself an invariant: a record exists if and only if the entry
//! was successfully synchronized at least once. Absence means "never synced"
//! and yields a create/download decision during discovery, never an update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Checksum, Etag, RemoteId, SyncPath};

// ============================================================================
// EntryKind
// ============================================================================

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Stable string name, used for journal persistence.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

// ============================================================================
// PinState
// ============================================================================

/// Selective-sync pin policy for a path.
///
/// Orthogonal to change detection; gates which propagation job a download
/// instruction selects (full content vs placeholder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinState {
    /// Content must always be fully present locally
    AlwaysLocal,
    /// Content may be represented by a lightweight placeholder
    OnlineOnly,
    /// Inherit the parent's policy (full content by default)
    #[default]
    Unspecified,
}

impl PinState {
    /// Stable string name, used for journal persistence.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AlwaysLocal => "always-local",
            Self::OnlineOnly => "online-only",
            Self::Unspecified => "unspecified",
        }
    }

    /// Parse the persisted name back into a pin state.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "always-local" => Some(Self::AlwaysLocal),
            "online-only" => Some(Self::OnlineOnly),
            "unspecified" => Some(Self::Unspecified),
            _ => None,
        }
    }
}

// ============================================================================
// Permissions - remote capability bitset
// ============================================================================

/// Remote capability bitset for an entry, as reported by the server.
///
/// Encoded on the wire and in the journal as a string of letter codes:
/// `W` update, `D` delete, `N` rename, `V` move, `C` add file,
/// `K` add subdirectory, `S` shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permissions(u8);

impl Permissions {
    pub const UPDATE: Permissions = Permissions(1 << 0);
    pub const DELETE: Permissions = Permissions(1 << 1);
    pub const RENAME: Permissions = Permissions(1 << 2);
    pub const MOVE: Permissions = Permissions(1 << 3);
    pub const ADD_FILE: Permissions = Permissions(1 << 4);
    pub const ADD_DIR: Permissions = Permissions(1 << 5);
    pub const SHARED: Permissions = Permissions(1 << 6);

    /// Every capability granted. Used when the remote does not report
    /// permissions at all.
    #[must_use]
    pub fn all() -> Self {
        Self::UPDATE | Self::DELETE | Self::RENAME | Self::MOVE | Self::ADD_FILE | Self::ADD_DIR
    }

    /// No capabilities (read-only entry).
    #[must_use]
    pub fn none() -> Self {
        Self(0)
    }

    /// Whether every bit of `other` is present in `self`.
    #[must_use]
    pub fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse the letter-code form. Unknown letters are ignored so newer
    /// servers can add codes without breaking older clients.
    #[must_use]
    pub fn from_codes(codes: &str) -> Self {
        let mut bits = Self(0);
        for c in codes.chars() {
            bits = bits
                | match c {
                    'W' => Self::UPDATE,
                    'D' => Self::DELETE,
                    'N' => Self::RENAME,
                    'V' => Self::MOVE,
                    'C' => Self::ADD_FILE,
                    'K' => Self::ADD_DIR,
                    'S' => Self::SHARED,
                    _ => Self(0),
                };
        }
        bits
    }

    /// Render the letter-code form.
    #[must_use]
    pub fn to_codes(&self) -> String {
        let mut out = String::new();
        for (bit, code) in [
            (Self::UPDATE, 'W'),
            (Self::DELETE, 'D'),
            (Self::RENAME, 'N'),
            (Self::MOVE, 'V'),
            (Self::ADD_FILE, 'C'),
            (Self::ADD_DIR, 'K'),
            (Self::SHARED, 'S'),
        ] {
            if self.contains(bit) {
                out.push(code);
            }
        }
        out
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

impl TryFrom<String> for Permissions {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(Self::from_codes(&s))
    }
}

impl From<Permissions> for String {
    fn from(p: Permissions) -> Self {
        p.to_codes()
    }
}

// ============================================================================
// LocalFingerprint
// ============================================================================

/// Cheap local-change detector: inode, mtime (whole seconds), size and
/// permission bits.
///
/// A differing fingerprint is the trigger for the expensive checksum path,
/// not proof of a content change by itself. Permission bits are tracked
/// separately from the content signature so a chmod surfaces as a
/// metadata-only change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFingerprint {
    /// Filesystem inode number (0 when unavailable)
    pub inode: u64,
    /// Modification time in whole seconds since the epoch
    pub mtime: i64,
    /// Size in bytes
    pub size: u64,
    /// Unix permission bits (0 when unknown or unsupported)
    #[serde(default)]
    pub mode: u32,
}

impl LocalFingerprint {
    /// Whether the content signature (inode, mtime, size) matches; the
    /// permission bits are deliberately not part of this comparison.
    #[must_use]
    pub fn same_content(&self, other: &LocalFingerprint) -> bool {
        self.inode == other.inode && self.mtime == other.mtime && self.size == other.size
    }

    /// Whether only the permission bits differ. Rows written before the
    /// bits were tracked carry 0 and never report a permission change.
    #[must_use]
    pub fn mode_differs(&self, other: &LocalFingerprint) -> bool {
        self.mode != 0 && other.mode != 0 && self.mode != other.mode
    }
}

// ============================================================================
// UploadInfo - resumable chunked-upload state
// ============================================================================

/// State of an interrupted chunked upload, persisted so the next run can
/// resume at the recorded chunk instead of restarting from zero.
///
/// Resume is only valid while the local file still matches the recorded
/// modtime, size and checksum; otherwise the transfer restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    /// Server-side transfer identifier
    pub transfer_id: String,
    /// Index of the next chunk to send
    pub next_chunk: u32,
    /// Total number of chunks in this transfer
    pub chunk_count: u32,
    /// Local mtime when the transfer started
    pub mtime: i64,
    /// Local size when the transfer started
    pub size: u64,
    /// Content checksum when the transfer started
    pub checksum: Option<Checksum>,
}

impl UploadInfo {
    /// Whether a resume is still valid for a file with the given signature.
    #[must_use]
    pub fn matches(&self, mtime: i64, size: u64, checksum: Option<&Checksum>) -> bool {
        if self.mtime != mtime || self.size != size {
            return false;
        }
        match (&self.checksum, checksum) {
            (Some(stored), Some(current)) => stored == current,
            // No checksum on either side: fall back to mtime+size only
            _ => true,
        }
    }
}

// ============================================================================
// JournalRecord
// ============================================================================

/// Persisted metadata for one synchronized entry, keyed by relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    path: SyncPath,
    kind: EntryKind,
    remote_id: RemoteId,
    etag: Etag,
    checksum: Option<Checksum>,
    size: u64,
    modified: DateTime<Utc>,
    permissions: Permissions,
    fingerprint: LocalFingerprint,
    pin_state: PinState,
    /// Consecutive propagation failures for this path across runs
    consecutive_failures: u32,
    /// Earliest time this path may be retried after blacklisting
    retry_after: Option<DateTime<Utc>>,
}

impl JournalRecord {
    /// Create a record for an entry that just synchronized successfully.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: SyncPath,
        kind: EntryKind,
        remote_id: RemoteId,
        etag: Etag,
        checksum: Option<Checksum>,
        size: u64,
        modified: DateTime<Utc>,
        permissions: Permissions,
        fingerprint: LocalFingerprint,
    ) -> Self {
        Self {
            path,
            kind,
            remote_id,
            etag,
            checksum,
            size,
            modified,
            permissions,
            fingerprint,
            pin_state: PinState::Unspecified,
            consecutive_failures: 0,
            retry_after: None,
        }
    }

    // --- accessors ---

    pub fn path(&self) -> &SyncPath {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn remote_id(&self) -> &RemoteId {
        &self.remote_id
    }

    pub fn etag(&self) -> &Etag {
        &self.etag
    }

    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn fingerprint(&self) -> LocalFingerprint {
        self.fingerprint
    }

    pub fn pin_state(&self) -> PinState {
        self.pin_state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        self.retry_after
    }

    // --- mutators ---

    /// Record a successful propagation: fresh server metadata, fresh local
    /// fingerprint, failure counters cleared.
    pub fn record_success(
        &mut self,
        etag: Etag,
        checksum: Option<Checksum>,
        size: u64,
        modified: DateTime<Utc>,
        fingerprint: LocalFingerprint,
    ) {
        self.etag = etag;
        self.checksum = checksum;
        self.size = size;
        self.modified = modified;
        self.fingerprint = fingerprint;
        self.consecutive_failures = 0;
        self.retry_after = None;
    }

    /// Record a propagation failure; past `threshold` the path sleeps until
    /// `now + cooldown`.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        cooldown: chrono::Duration,
    ) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= threshold {
            self.retry_after = Some(now + cooldown);
        }
    }

    /// Whether the path is currently blacklisted (cooldown not elapsed).
    #[must_use]
    pub fn is_blacklisted(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.is_some_and(|t| now < t)
    }

    /// Clear the blacklist counters (e.g. after a forced resync).
    pub fn clear_failures(&mut self) {
        self.consecutive_failures = 0;
        self.retry_after = None;
    }

    pub fn set_pin_state(&mut self, state: PinState) {
        self.pin_state = state;
    }

    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
    }

    /// Re-key the record after a rename/move, keeping the stable remote id.
    pub fn set_path(&mut self, path: SyncPath) {
        self.path = path;
    }

    pub fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = remote_id;
    }
}

// ============================================================================
// Tests
// ============================================================================
