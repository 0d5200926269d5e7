//! Tidesync engine - the sync run controller
//!
//! Ties the pipeline together: scan both sides in parallel, reconcile the
//! change sets into instructions, propagate them, and report a run summary.
//! One pass moves through `Idle -> Discovering -> Propagating -> Idle`.
//!
//! Two entry points:
//!
//! - [`SyncEngine::run_once`] performs a single pass and returns the
//!   [`RunSummary`](tidesync_core::domain::events::RunSummary).
//! - [`SyncService`] runs continuously: a `notify` watcher plus a debounce
//!   queue trigger passes, a periodic poll catches remote-only changes, and
//!   an [`EngineCommand`] channel drives pause/resume/cancel and
//!   pin/resync maintenance.

pub mod controller;
pub mod service;
pub mod watcher;

pub use controller::{EngineState, SyncEngine};
pub use service::{EngineCommand, SyncService};
pub use watcher::{ChangeQueue, FileWatcher};
