//! Content checksums and block-based delta transfers
//!
//! Two concerns live here, both pure (no I/O):
//!
//! - Whole-file checksums tagged with their algorithm, used to verify
//!   transfer integrity before the journal is allowed to commit.
//! - A block-sum delta codec: a [`BlockManifest`](manifest::BlockManifest)
//!   describes a file as fixed-size blocks with a cheap rolling sum and a
//!   strong hash per block; [`plan_delta`](delta::plan_delta) finds which of
//!   those blocks already exist in a local base file, and
//!   [`apply_delta`](delta::apply_delta) reconstructs the target from the
//!   base plus fetched literal ranges.
//!
//! The codec fails closed: any inconsistency between plan, base and literals
//! is an error, never a silently wrong file.

pub mod checksum;
pub mod delta;
pub mod manifest;
pub mod rolling;

pub use checksum::{compute_checksum, verify_checksum, ChecksumStatus};
pub use delta::{apply_delta, plan_delta, BlockSource, DeltaPlan, LiteralChunk};
pub use manifest::{BlockManifest, BlockSum};

use tidesync_core::domain::errors::ErrorClass;
use tidesync_core::domain::newtypes::Checksum;

/// Errors from the delta codec.
///
/// Everything here classifies as [`ErrorClass::Integrity`]: the caller's
/// correct response is to discard the delta attempt and fall back to a full
/// transfer, retried at most once.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The manifest bytes did not parse or violate internal consistency
    #[error("Malformed block manifest: {0}")]
    MalformedManifest(String),

    /// The plan references bytes outside the base file
    #[error("Delta plan out of bounds: {0}")]
    RangeOutOfBounds(String),

    /// Fetched literal ranges do not cover what the plan requires
    #[error("Literal ranges do not match plan: {0}")]
    LiteralMismatch(String),

    /// The reconstructed file failed final checksum verification
    #[error("Checksum mismatch after reconstruction: expected {expected}, got {actual}")]
    ChecksumMismatch {
        expected: Checksum,
        actual: Checksum,
    },
}

impl CodecError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Integrity
    }
}
