//! Tidesync Scanners - change detection on both sides of the pipe
//!
//! Two scanners produce per-side [`ChangeSet`]s for the discovery
//! coordinator:
//!
//! - [`LocalScanner`] walks the local mirror and diffs it against the
//!   journal using the cheap inode/mtime/size fingerprint.
//! - [`RemoteScanner`] lists remote directories, skipping whole unchanged
//!   subtrees via the journaled directory etag, and detects renames through
//!   the stable remote id.
//!
//! Both scanners are read-only observers; they never touch files or rows.
//!
//! [`ChangeSet`]: tidesync_core::domain::change::ChangeSet

pub mod ignore;
pub mod local;
pub mod names;
pub mod remote;

pub use ignore::IgnoreMatcher;
pub use local::LocalScanner;
pub use remote::RemoteScanner;
