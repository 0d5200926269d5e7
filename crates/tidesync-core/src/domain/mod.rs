//! Domain model for the sync engine
//!
//! Everything in here is plain data plus validation: no I/O, no clocks other
//! than timestamps passed in, no dependency on adapters.

pub mod change;
pub mod errors;
pub mod events;
pub mod instruction;
pub mod journal_record;
pub mod newtypes;

pub use change::{ChangeKind, ChangeRecord, ChangeSet, ObservedMeta, Side};
pub use errors::{DomainError, ErrorClass, SyncError};
pub use events::{ItemOutcome, RunSummary, SkipReason, SyncEvent};
pub use instruction::{SourceSide, SyncAction, SyncInstruction};
pub use journal_record::{
    EntryKind, JournalRecord, LocalFingerprint, Permissions, PinState, UploadInfo,
};
pub use newtypes::{Checksum, Etag, RemoteId, RunId, SyncPath};
