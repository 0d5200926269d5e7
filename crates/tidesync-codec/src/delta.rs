//! Delta planning and application
//!
//! Given a remote file's [`BlockManifest`] and the local base file, the
//! planner decides per target block whether its bytes already exist locally
//! (confirmed by weak sum plus strong hash) or must be fetched from the
//! remote as a literal range. Application rebuilds the target byte-for-byte
//! and refuses to hand back anything that fails the final whole-file
//! checksum.

use std::collections::HashMap;

use tidesync_core::domain::newtypes::Checksum;

use crate::checksum::{compute_checksum, strong_block_hash};
use crate::manifest::{hex_encode, BlockManifest};
use crate::rolling::RollingSum;
use crate::CodecError;

// ============================================================================
// Plan types
// ============================================================================

/// Where the bytes of one target block come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSource {
    /// Already present in the local base file at this byte offset
    Local { offset: u64 },
    /// Must be fetched from the remote
    Remote,
}

/// Per-block transfer plan for one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPlan {
    /// Block size of the manifest the plan was built from
    pub block_size: u32,
    /// Target file length
    pub total_len: u64,
    /// One source per target block, in file order
    pub sources: Vec<BlockSource>,
}

impl DeltaPlan {
    /// Coalesced `(offset, len)` ranges of the target that must be fetched.
    #[must_use]
    pub fn literal_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges: Vec<(u64, u64)> = Vec::new();
        for (i, source) in self.sources.iter().enumerate() {
            if matches!(source, BlockSource::Remote) {
                let offset = i as u64 * u64::from(self.block_size);
                let len = (self.total_len - offset).min(u64::from(self.block_size));
                match ranges.last_mut() {
                    Some((last_off, last_len)) if *last_off + *last_len == offset => {
                        *last_len += len;
                    }
                    _ => ranges.push((offset, len)),
                }
            }
        }
        ranges
    }

    /// Bytes that must travel over the wire.
    #[must_use]
    pub fn literal_bytes(&self) -> u64 {
        self.literal_ranges().iter().map(|(_, len)| len).sum()
    }

    /// Bytes reused from the local base.
    #[must_use]
    pub fn reused_bytes(&self) -> u64 {
        self.total_len - self.literal_bytes()
    }
}

/// One fetched literal range, positioned in target-file coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralChunk {
    pub offset: u64,
    pub data: Vec<u8>,
}

// ============================================================================
// Planning
// ============================================================================

/// Match the manifest's blocks against `base` and plan the transfer.
///
/// Full-size blocks are matched with a rolling scan over every base offset;
/// the short tail block (if any) gets its own pass at its own window length.
/// A weak-sum hit is only trusted after the strong hash confirms it.
#[must_use]
pub fn plan_delta(manifest: &BlockManifest, base: &[u8]) -> DeltaPlan {
    let mut sources = vec![BlockSource::Remote; manifest.blocks.len()];

    let block_size = manifest.block_size as usize;
    let tail_len = (manifest.total_len % u64::from(manifest.block_size)) as usize;
    let full_blocks = if tail_len == 0 {
        manifest.blocks.len()
    } else {
        manifest.blocks.len() - 1
    };

    match_window(manifest, base, block_size, 0..full_blocks, &mut sources);
    if tail_len > 0 {
        let tail = manifest.blocks.len() - 1;
        match_window(manifest, base, tail_len, tail..tail + 1, &mut sources);
    }

    DeltaPlan {
        block_size: manifest.block_size,
        total_len: manifest.total_len,
        sources,
    }
}

/// Rolling scan of `base` at one window length, resolving the given block
/// index range.
fn match_window(
    manifest: &BlockManifest,
    base: &[u8],
    window: usize,
    indices: std::ops::Range<usize>,
    sources: &mut [BlockSource],
) {
    if window == 0 || base.len() < window || indices.is_empty() {
        return;
    }

    let mut by_weak: HashMap<u32, Vec<usize>> = HashMap::new();
    for i in indices {
        by_weak.entry(manifest.blocks[i].weak).or_default().push(i);
    }

    let strong_len = usize::from(manifest.strong_len);
    let mut unmatched = by_weak.values().map(Vec::len).sum::<usize>();
    let mut sum = RollingSum::new(&base[..window]);
    let mut offset = 0usize;
    loop {
        if let Some(candidates) = by_weak.get(&sum.value()) {
            let mut strong: Option<String> = None;
            for &i in candidates {
                if matches!(sources[i], BlockSource::Remote) {
                    let strong = strong.get_or_insert_with(|| {
                        hex_encode(&strong_block_hash(&base[offset..offset + window], strong_len))
                    });
                    if *strong == manifest.blocks[i].strong {
                        sources[i] = BlockSource::Local {
                            offset: offset as u64,
                        };
                        unmatched -= 1;
                    }
                }
            }
        }
        if unmatched == 0 || offset + window >= base.len() {
            break;
        }
        sum.roll(base[offset], base[offset + window]);
        offset += 1;
    }
}

// ============================================================================
// Application
// ============================================================================

/// Rebuild the target file from the base, the plan and the fetched literals.
///
/// Fails closed: out-of-bounds base references, literal ranges that do not
/// cover the planned remote blocks, and a final checksum mismatch are all
/// hard errors. On success the returned buffer is exactly the remote file.
pub fn apply_delta(
    base: &[u8],
    plan: &DeltaPlan,
    literals: &[LiteralChunk],
    expected: &Checksum,
) -> Result<Vec<u8>, CodecError> {
    let total = usize::try_from(plan.total_len)
        .map_err(|_| CodecError::RangeOutOfBounds("target length exceeds usize".to_string()))?;
    let mut out = vec![0u8; total];

    // Lay down literals first, tracking exactly which target bytes they cover.
    let mut covered: Vec<(u64, u64)> = Vec::new();
    for chunk in literals {
        let end = chunk.offset + chunk.data.len() as u64;
        if end > plan.total_len {
            return Err(CodecError::LiteralMismatch(format!(
                "literal at {} runs past target length {}",
                chunk.offset, plan.total_len
            )));
        }
        out[chunk.offset as usize..end as usize].copy_from_slice(&chunk.data);
        covered.push((chunk.offset, end));
    }
    covered.sort_unstable();

    let block_size = u64::from(plan.block_size);
    for (i, source) in plan.sources.iter().enumerate() {
        let offset = i as u64 * block_size;
        let len = (plan.total_len - offset).min(block_size);
        match source {
            BlockSource::Local { offset: base_off } => {
                let base_end = base_off + len;
                if base_end > base.len() as u64 {
                    return Err(CodecError::RangeOutOfBounds(format!(
                        "block {i} reads base bytes {base_off}..{base_end}, base is {} bytes",
                        base.len()
                    )));
                }
                out[offset as usize..(offset + len) as usize]
                    .copy_from_slice(&base[*base_off as usize..base_end as usize]);
            }
            BlockSource::Remote => {
                if !is_covered(&covered, offset, offset + len) {
                    return Err(CodecError::LiteralMismatch(format!(
                        "block {i} ({offset}..{}) not covered by fetched literals",
                        offset + len
                    )));
                }
            }
        }
    }

    let actual = compute_checksum(&out);
    if expected.same_algorithm(&actual) && expected.digest_hex() == actual.digest_hex() {
        Ok(out)
    } else {
        Err(CodecError::ChecksumMismatch {
            expected: expected.clone(),
            actual,
        })
    }
}

/// Whether `[start, end)` lies entirely inside the sorted covered ranges.
fn is_covered(covered: &[(u64, u64)], start: u64, end: u64) -> bool {
    let mut cursor = start;
    for &(range_start, range_end) in covered {
        if range_start > cursor {
            break;
        }
        if range_end > cursor {
            cursor = range_end;
            if cursor >= end {
                return true;
            }
        }
    }
    cursor >= end || start == end
}
