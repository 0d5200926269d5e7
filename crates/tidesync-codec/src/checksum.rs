//! Whole-file content checksums
//!
//! The engine records a checksum in the journal on every commit and verifies
//! it after every full download. Checksums carry their algorithm tag so a
//! server that reports a different algorithm is never compared digest-only.

use sha2::{Digest, Sha256};
use tidesync_core::domain::newtypes::Checksum;

/// Outcome of comparing an expected checksum against freshly computed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Same algorithm, same digest
    Match,
    /// Same algorithm, different digest
    Mismatch,
    /// Different algorithms; no comparison is possible
    AlgorithmMismatch,
}

/// Compute the canonical content checksum (SHA-256) of `bytes`.
#[must_use]
pub fn compute_checksum(bytes: &[u8]) -> Checksum {
    Checksum::sha256(bytes)
}

/// Verify `bytes` against an `expected` checksum.
///
/// Only SHA-256 expectations can be recomputed locally; any other algorithm
/// yields [`ChecksumStatus::AlgorithmMismatch`] and the caller decides
/// whether to trust the transfer (treated as a mismatch by propagation).
#[must_use]
pub fn verify_checksum(expected: &Checksum, bytes: &[u8]) -> ChecksumStatus {
    let actual = compute_checksum(bytes);
    if !expected.same_algorithm(&actual) {
        return ChecksumStatus::AlgorithmMismatch;
    }
    if expected.digest_hex() == actual.digest_hex() {
        ChecksumStatus::Match
    } else {
        ChecksumStatus::Mismatch
    }
}

/// Strong per-block hash: a truncated SHA-256 digest.
#[must_use]
pub fn strong_block_hash(block: &[u8], strong_len: usize) -> Vec<u8> {
    let digest = Sha256::digest(block);
    digest[..strong_len.min(digest.len())].to_vec()
}
