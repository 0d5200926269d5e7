//! Tidesync Propagation - executes one run's instruction list
//!
//! Takes the ordered instructions from discovery and performs the side
//! effects: transfers, renames, deletions, conflict materialization. Work is
//! dispatched concurrently under a semaphore while honoring structural
//! dependencies (a directory exists before its children upload, children are
//! deleted before their parent). Every job follows the same commit protocol:
//! side effect first, confirmation, then the journal write. A crash between
//! the two leaves the side effect visible to the next scan, which re-detects
//! and converges.
//!
//! Failure handling is keyed off the error taxonomy, never message text:
//! transient errors back off and retry, integrity errors get one
//! full-transfer fallback, validation/policy errors fail immediately, and a
//! journal failure aborts the run.

pub mod jobs;
pub mod retry;
pub mod scheduler;

pub use jobs::{JobExecutor, JobOutcome};
pub use retry::RetryPolicy;
pub use scheduler::{PropagationReport, PropagationScheduler};
