use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use crate::error::BundleError;
use crate::header::{BlockInfo, BundleCompression, BundleHeader, BUNDLE_FORMAT_VERSION};
use crate::record::Record;

/// Uncompressed size of one block when writing with [`BundleCompression::Zstd`].
pub const BLOCK_SIZE: usize = 128 * 1024;

const ZSTD_LEVEL: i32 = 3;

/// A fully decoded bundle: its records in file order.
///
/// The block directory table is not kept after decoding. It is re-derived from
/// the records every time the bundle is written, so mutating records and then
/// calling [`write`](Self::write) always produces a consistent header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bundle {
    format_version: u32,
    records: Vec<Record>,
}

impl Bundle {
    pub fn new() -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            records: Vec::new(),
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Decode a bundle from a reader positioned at the header.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, BundleError> {
        let header = BundleHeader::read_from(reader)?;

        let mut payload = Vec::new();
        for (index, block) in header.blocks.iter().enumerate() {
            let mut raw = Vec::new();
            reader
                .by_ref()
                .take(u64::from(block.compressed_size))
                .read_to_end(&mut raw)?;
            if raw.len() != block.compressed_size as usize {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }

            let decoded = match block.compression {
                BundleCompression::None => raw,
                BundleCompression::Zstd => {
                    zstd::bulk::decompress(&raw, block.uncompressed_size as usize)?
                }
            };
            if decoded.len() != block.uncompressed_size as usize {
                return Err(BundleError::BlockSizeMismatch {
                    index,
                    declared: block.uncompressed_size,
                    actual: decoded.len(),
                });
            }
            payload.extend_from_slice(&decoded);
        }

        let records = decode_records(&payload)?;
        Ok(Self {
            format_version: header.format_version,
            records,
        })
    }

    /// Open and decode the bundle stored at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    /// Encode the bundle and write it to `writer`.
    ///
    /// The block table is rebuilt from the current records. Returns the header
    /// that was written.
    pub fn write<W: Write>(
        &self,
        writer: &mut W,
        compression: BundleCompression,
    ) -> Result<BundleHeader, BundleError> {
        let payload = self.encode_payload()?;

        let (blocks, data) = match compression {
            BundleCompression::None => {
                let size = u32::try_from(payload.len())
                    .map_err(|_| BundleError::PayloadTooLarge(payload.len()))?;
                let block = BlockInfo {
                    uncompressed_size: size,
                    compressed_size: size,
                    compression: BundleCompression::None,
                };
                (vec![block], vec![payload])
            }
            BundleCompression::Zstd => {
                let mut blocks = Vec::new();
                let mut data = Vec::new();
                for chunk in payload.chunks(BLOCK_SIZE) {
                    let compressed = zstd::bulk::compress(chunk, ZSTD_LEVEL)?;
                    blocks.push(BlockInfo {
                        uncompressed_size: chunk.len() as u32,
                        compressed_size: compressed.len() as u32,
                        compression: BundleCompression::Zstd,
                    });
                    data.push(compressed);
                }
                (blocks, data)
            }
        };

        let mut header = BundleHeader::new(blocks);
        header.format_version = self.format_version.max(BUNDLE_FORMAT_VERSION);
        writer.write_all(&header.to_bytes()?)?;
        for block in &data {
            writer.write_all(block)?;
        }
        writer.flush()?;

        Ok(header)
    }

    /// Encode the bundle into a new buffer.
    pub fn to_bytes(&self, compression: BundleCompression) -> Result<Vec<u8>, BundleError> {
        let mut out = Vec::new();
        self.write(&mut out, compression)?;
        Ok(out)
    }

    /// Decode a bundle from an in-memory buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BundleError> {
        Self::read(&mut Cursor::new(bytes))
    }

    /// Size of the decompressed record stream this bundle would produce.
    pub fn encoded_payload_len(&self) -> Result<u64, BundleError> {
        Ok(self.encode_payload()?.len() as u64)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// Iterate over all records of a given class.
    pub fn records_of_class(&self, class_id: u32) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.class_id == class_id)
    }

    pub fn record(&self, path_id: i64) -> Option<&Record> {
        self.records.iter().find(|r| r.path_id == path_id)
    }

    pub fn record_mut(&mut self, path_id: i64) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.path_id == path_id)
    }

    pub fn push_record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn remove_record(&mut self, path_id: i64) -> Option<Record> {
        let idx = self.records.iter().position(|r| r.path_id == path_id)?;
        Some(self.records.remove(idx))
    }

    /// Keep only the records matching `keep`. Returns how many were removed.
    pub fn retain_records<F: FnMut(&Record) -> bool>(&mut self, keep: F) -> usize {
        let before = self.records.len();
        self.records.retain(keep);
        before - self.records.len()
    }

    fn encode_payload(&self) -> Result<Vec<u8>, BundleError> {
        let mut payload = Vec::new();
        payload.write_u32::<BE>(self.records.len() as u32)?;
        for record in &self.records {
            record.write_to(&mut payload)?;
        }
        Ok(payload)
    }
}

fn decode_records(payload: &[u8]) -> Result<Vec<Record>, BundleError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = Cursor::new(payload);
    let count = cursor
        .read_u32::<BE>()
        .map_err(|_| BundleError::TruncatedRecords(0))? as usize;

    let mut records = Vec::new();
    for index in 0..count {
        records.push(Record::read_from(&mut cursor, index)?);
    }
    Ok(records)
}
