//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers and values that flow through
//! the sync pipeline. Each newtype validates at construction time so the
//! rest of the engine never has to re-check path shape, checksum format or
//! identifier emptiness.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// SyncPath - relative path key
// ============================================================================

/// A validated path relative to the sync root, the unique key of the journal.
///
/// Always slash-separated, never absolute, never containing `.` / `..`
/// components or empty segments. The empty string denotes the sync root
/// itself and is only valid through [`SyncPath::root`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPath(String);

impl SyncPath {
    /// Create a new relative SyncPath.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is absolute, empty,
    /// contains traversal components, backslashes or empty segments.
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if path.is_empty() {
            return Err(DomainError::InvalidPath(
                "Relative path cannot be empty (use SyncPath::root)".to_string(),
            ));
        }
        if path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Path must be relative: {path}"
            )));
        }
        if path.contains('\\') {
            return Err(DomainError::InvalidPath(format!(
                "Path must be slash-separated: {path}"
            )));
        }
        if path.ends_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Path must not end with a slash: {path}"
            )));
        }
        for segment in path.split('/') {
            if segment.is_empty() {
                return Err(DomainError::InvalidPath(format!(
                    "Path contains an empty segment: {path}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(DomainError::InvalidPath(format!(
                    "Path contains a traversal component: {path}"
                )));
            }
        }
        Ok(Self(path))
    }

    /// The sync root itself (empty relative path).
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Whether this path is the sync root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of path components (0 for the root).
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Parent path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Final component, or `None` at the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.0.is_empty() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Join a single component onto this path.
    ///
    /// # Errors
    /// Returns an error if the component is empty or contains separators
    /// or traversal sequences.
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty()
            || component.contains('/')
            || component.contains('\\')
            || component == "."
            || component == ".."
        {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path component: {component}"
            )));
        }
        if self.0.is_empty() {
            Self::new(component)
        } else {
            Self::new(format!("{}/{component}", self.0))
        }
    }

    /// Whether `self` is a strict descendant of `ancestor`.
    ///
    /// The root is an ancestor of every non-root path.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &SyncPath) -> bool {
        if self == ancestor {
            return false;
        }
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.starts_with(&ancestor.0)
            && self.0.as_bytes().get(ancestor.0.len()) == Some(&b'/')
    }

    /// Rebase a descendant path from one ancestor to another.
    ///
    /// Used when cascading a directory rename to its descendants.
    ///
    /// # Errors
    /// Returns an error if `self` is not under `from`.
    pub fn rebase(&self, from: &SyncPath, to: &SyncPath) -> Result<Self, DomainError> {
        if self == from {
            return Ok(to.clone());
        }
        if !self.is_descendant_of(from) {
            return Err(DomainError::InvalidPath(format!(
                "{} is not under {}",
                self.0, from.0
            )));
        }
        let suffix = if from.is_root() {
            self.0.as_str()
        } else {
            &self.0[from.0.len() + 1..]
        };
        if to.is_root() {
            Self::new(suffix)
        } else {
            Self::new(format!("{}/{suffix}", to.0))
        }
    }

    /// Interpret this path beneath a local filesystem root.
    #[must_use]
    pub fn to_local(&self, local_root: &std::path::Path) -> std::path::PathBuf {
        if self.0.is_empty() {
            local_root.to_path_buf()
        } else {
            local_root.join(&self.0)
        }
    }
}

impl Display for SyncPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for SyncPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SyncPath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            Ok(Self::root())
        } else {
            Self::new(s)
        }
    }
}

impl From<SyncPath> for String {
    fn from(path: SyncPath) -> Self {
        path.0
    }
}

// ============================================================================
// RemoteId - opaque server identifier, stable across renames
// ============================================================================

/// Opaque identifier assigned by the remote store.
///
/// Stable across renames and moves, which makes it the primary rename
/// detector for the remote scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId.
    ///
    /// # Errors
    /// Returns an error if the identifier is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// Etag - opaque version stamp
// ============================================================================

/// Opaque entity tag from the remote store.
///
/// Changes whenever remote content or metadata changes; compared only for
/// equality, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Etag(String);

impl Etag {
    /// Create a new Etag.
    ///
    /// # Errors
    /// Returns an error if the tag is empty.
    pub fn new(tag: impl Into<String>) -> Result<Self, DomainError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(DomainError::InvalidEtag("Etag cannot be empty".to_string()));
        }
        Ok(Self(tag))
    }

    /// Inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Etag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Etag> for String {
    fn from(tag: Etag) -> Self {
        tag.0
    }
}

// ============================================================================
// Checksum - algorithm-tagged content checksum
// ============================================================================

/// Algorithm-tagged content checksum, e.g. `SHA256:9f86d0...`.
///
/// The tag travels with the value so that a comparison between checksums of
/// different algorithms can be refused instead of silently mismatching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Create a checksum from its tagged string form.
    ///
    /// # Errors
    /// Returns an error unless the value is `ALGO:hex` with a non-empty
    /// uppercase algorithm tag and lowercase hex digest.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let Some((algo, hex)) = value.split_once(':') else {
            return Err(DomainError::InvalidChecksum(format!(
                "Checksum must be ALGO:hex, got: {value}"
            )));
        };
        if algo.is_empty() || !algo.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(DomainError::InvalidChecksum(format!(
                "Invalid checksum algorithm tag: {value}"
            )));
        }
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(DomainError::InvalidChecksum(format!(
                "Checksum digest must be lowercase hex: {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Build a SHA-256 checksum from a raw digest.
    #[must_use]
    pub fn sha256(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(7 + digest.len() * 2);
        hex.push_str("SHA256:");
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Algorithm tag, e.g. `SHA256`.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }

    /// Hex digest without the tag.
    #[must_use]
    pub fn digest_hex(&self) -> &str {
        self.0.split_once(':').map(|(_, h)| h).unwrap_or("")
    }

    /// Inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether two checksums use the same algorithm.
    #[must_use]
    pub fn same_algorithm(&self, other: &Checksum) -> bool {
        self.algorithm() == other.algorithm()
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Checksum {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Checksum> for String {
    fn from(sum: Checksum) -> Self {
        sum.0
    }
}

// ============================================================================
// RunId - one sync run
// ============================================================================

/// Identifier for one end-to-end sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random RunId.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Inner UUID reference.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid RunId: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
