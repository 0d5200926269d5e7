//! Tidesync Discovery - reconciliation of the two change sets
//!
//! Takes the local and remote [`ChangeSet`]s of one run plus the journal
//! and produces at most one [`SyncInstruction`] per path, in safe execution
//! order. The per-path tie-break lives in [`decision`] as a pure function;
//! [`coordinator`] handles the surrounding bookkeeping: local rename
//! matching, remote rename cascades, the blacklist gate and pin-state
//! inheritance.
//!
//! [`ChangeSet`]: tidesync_core::domain::change::ChangeSet
//! [`SyncInstruction`]: tidesync_core::domain::instruction::SyncInstruction

pub mod coordinator;
pub mod decision;

pub use coordinator::{DiscoveryCoordinator, DiscoveryOutcome};
pub use decision::{decide, PathContext};
