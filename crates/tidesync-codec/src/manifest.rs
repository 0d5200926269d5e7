//! Block-sum manifest
//!
//! A manifest describes one version of a file as a sequence of fixed-size
//! blocks (the final block may be short). Each block carries a weak rolling
//! sum for cheap candidate matching and a truncated strong hash for
//! confirmation. Manifests travel as JSON; parsing validates every internal
//! consistency rule before the delta planner is allowed to trust one.

use serde::{Deserialize, Serialize};

use crate::checksum::strong_block_hash;
use crate::rolling::weak_sum;
use crate::CodecError;

/// Default block size for manifests we build ourselves.
pub const DEFAULT_BLOCK_SIZE: u32 = 128 * 1024;

/// Bytes of SHA-256 kept per block.
pub const STRONG_LEN: usize = 16;

/// Weak and strong sums of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSum {
    /// Rolling weak checksum of the block
    pub weak: u32,
    /// Truncated SHA-256 of the block, lowercase hex
    pub strong: String,
}

/// Block-level description of one file version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockManifest {
    /// Size of every block except possibly the last
    pub block_size: u32,
    /// Total file length in bytes
    pub total_len: u64,
    /// Bytes of strong hash kept per block
    pub strong_len: u8,
    /// One entry per block, in file order
    pub blocks: Vec<BlockSum>,
}

impl BlockManifest {
    /// Build a manifest over `data` with the given block size.
    #[must_use]
    pub fn build(data: &[u8], block_size: u32) -> Self {
        let block_size = block_size.max(1);
        let blocks = data
            .chunks(block_size as usize)
            .map(|chunk| BlockSum {
                weak: weak_sum(chunk),
                strong: hex_encode(&strong_block_hash(chunk, STRONG_LEN)),
            })
            .collect();
        Self {
            block_size,
            total_len: data.len() as u64,
            strong_len: STRONG_LEN as u8,
            blocks,
        }
    }

    /// Parse and validate manifest bytes as fetched from the remote.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::MalformedManifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize for transport or storage.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Check internal consistency: block count must match the declared
    /// length, and every strong hash must have the declared width.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.block_size == 0 {
            return Err(CodecError::MalformedManifest(
                "block_size must be positive".to_string(),
            ));
        }
        if self.strong_len == 0 || usize::from(self.strong_len) > 32 {
            return Err(CodecError::MalformedManifest(format!(
                "strong_len {} outside 1..=32",
                self.strong_len
            )));
        }
        let expected_blocks = self.total_len.div_ceil(u64::from(self.block_size));
        if self.blocks.len() as u64 != expected_blocks {
            return Err(CodecError::MalformedManifest(format!(
                "{} blocks declared, {} expected for {} bytes at block size {}",
                self.blocks.len(),
                expected_blocks,
                self.total_len,
                self.block_size
            )));
        }
        let hex_len = usize::from(self.strong_len) * 2;
        for (i, block) in self.blocks.iter().enumerate() {
            if block.strong.len() != hex_len
                || !block.strong.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(CodecError::MalformedManifest(format!(
                    "block {i} strong hash is not {hex_len} hex chars"
                )));
            }
        }
        Ok(())
    }

    /// Length of block `index`, accounting for the short final block.
    #[must_use]
    pub fn block_len(&self, index: usize) -> u64 {
        let start = index as u64 * u64::from(self.block_size);
        (self.total_len - start).min(u64::from(self.block_size))
    }

    /// Byte offset of block `index` in the file.
    #[must_use]
    pub fn block_offset(&self, index: usize) -> u64 {
        index as u64 * u64::from(self.block_size)
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_block_count_and_tail() {
        let data = vec![7u8; 1000];
        let manifest = BlockManifest::build(&data, 256);
        assert_eq!(manifest.blocks.len(), 4);
        assert_eq!(manifest.block_len(0), 256);
        assert_eq!(manifest.block_len(3), 232);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_empty_file_has_no_blocks() {
        let manifest = BlockManifest::build(&[], 256);
        assert!(manifest.blocks.is_empty());
        assert_eq!(manifest.total_len, 0);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_parse_roundtrip() {
        let manifest = BlockManifest::build(b"some file content here", 8);
        let parsed = BlockManifest::parse(&manifest.encode()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = BlockManifest::parse(b"not json at all").unwrap_err();
        assert!(matches!(err, CodecError::MalformedManifest(_)));
    }

    #[test]
    fn test_validate_rejects_wrong_block_count() {
        let mut manifest = BlockManifest::build(&vec![1u8; 600], 256);
        manifest.blocks.pop();
        assert!(matches!(
            manifest.validate(),
            Err(CodecError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_strong_hash() {
        let mut manifest = BlockManifest::build(&vec![1u8; 100], 256);
        manifest.blocks[0].strong = "zzzz".to_string();
        assert!(matches!(
            manifest.validate(),
            Err(CodecError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_block_size() {
        let manifest = BlockManifest {
            block_size: 0,
            total_len: 0,
            strong_len: STRONG_LEN as u8,
            blocks: Vec::new(),
        };
        assert!(manifest.validate().is_err());
    }
}
