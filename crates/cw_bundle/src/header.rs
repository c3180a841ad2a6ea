//! Bundle header and block directory table.
//!
//! The header is the only part of a bundle that can be read without touching
//! block data. It lists every block with its declared sizes, which lets callers
//! estimate the decompressed footprint of a bundle before committing to a full
//! decode.

use binrw::{binrw, BinRead, BinWrite};
use std::io::{Cursor, Read, Seek};

use crate::error::BundleError;

/// Current on-disk format version written by [`Bundle::write`](crate::Bundle::write).
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Size of the fixed part of the header (magic, format version, block count).
pub const HEADER_PREFIX_LEN: usize = 12;

/// The compression type of a block.
#[binrw]
#[brw(big, repr = u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub enum BundleCompression {
    #[default]
    None = 0,
    Zstd = 1,
}

/// One entry of the block directory table.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub compression: BundleCompression,
}

/// Bundle header: magic, format version and the block directory table.
#[binrw]
#[brw(big, magic = b"CWBF")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub format_version: u32,

    #[br(temp)]
    #[bw(calc = blocks.len() as u32)]
    block_count: u32,

    #[br(count = block_count)]
    pub blocks: Vec<BlockInfo>,
}

impl BundleHeader {
    pub fn new(blocks: Vec<BlockInfo>) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            blocks,
        }
    }

    /// Read only the header from `reader`, leaving it positioned at the first block.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self, BundleError> {
        Ok(Self::read(reader)?)
    }

    /// Serialize the header into a standalone buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BundleError> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Sum of the uncompressed sizes declared by every block.
    pub fn declared_uncompressed_size(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| u64::from(b.uncompressed_size))
            .sum()
    }

    /// Sum of the on-disk sizes of every block.
    pub fn declared_compressed_size(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| u64::from(b.compressed_size))
            .sum()
    }

    /// Whether any block in the table is compressed.
    pub fn is_compressed(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| b.compression != BundleCompression::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BundleHeader {
        BundleHeader::new(vec![
            BlockInfo {
                uncompressed_size: 1024,
                compressed_size: 100,
                compression: BundleCompression::Zstd,
            },
            BlockInfo {
                uncompressed_size: 512,
                compressed_size: 512,
                compression: BundleCompression::None,
            },
        ])
    }

    #[test]
    fn test_declared_sizes() {
        let header = sample();
        assert_eq!(header.declared_uncompressed_size(), 1536);
        assert_eq!(header.declared_compressed_size(), 612);
        assert!(header.is_compressed());
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"CWBF");
        assert_eq!(&bytes[4..8], &BUNDLE_FORMAT_VERSION.to_be_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_be_bytes());
        assert_eq!(bytes.len(), HEADER_PREFIX_LEN + 2 * 9);
    }

    #[test]
    fn test_read_stops_after_table() {
        let mut bytes = sample().to_bytes().unwrap();
        let header_len = bytes.len();
        bytes.extend_from_slice(&[0xAA; 16]);

        let mut cursor = Cursor::new(bytes);
        let header = BundleHeader::read_from(&mut cursor).unwrap();
        assert_eq!(header, sample());
        assert_eq!(cursor.position() as usize, header_len);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(BundleHeader::read_from(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_truncated_table() {
        let bytes = sample().to_bytes().unwrap();
        let truncated = bytes[..bytes.len() - 3].to_vec();
        assert!(BundleHeader::read_from(&mut Cursor::new(truncated)).is_err());
    }
}
