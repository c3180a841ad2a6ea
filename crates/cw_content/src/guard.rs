//! Header-level decompression ceiling.
//!
//! The guard reads only the bundle header and sums the uncompressed sizes
//! declared in its block table. Nothing past the header is read, so a hostile
//! bundle is rejected before any block is inflated.

use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use cw_bundle::BundleHeader;

use crate::error::{Error, Result};
use crate::settings::{self, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipBombGuard {
    ceiling_bytes: u64,
}

impl ZipBombGuard {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self { ceiling_bytes }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_decompressed_bytes())
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    /// Declared decompressed size of the bundle at `data_path`, in bytes.
    pub fn estimate(&self, data_path: &Utf8Path) -> Result<u64> {
        let mut reader = BufReader::new(File::open(data_path.as_std_path())?);
        let header = BundleHeader::read_from(&mut reader)?;
        Ok(header.declared_uncompressed_size())
    }

    /// Check the bundle at `data_path` against the ceiling.
    ///
    /// Returns the estimate on success and [`Error::Oversized`] when it exceeds
    /// the ceiling.
    pub fn check(&self, data_path: &Utf8Path) -> Result<u64> {
        let estimated = self.estimate(data_path)?;
        if estimated > self.ceiling_bytes {
            return Err(Error::Oversized {
                path: data_path.to_path_buf(),
                estimated_mb: settings::bytes_to_mb(estimated),
                limit_mb: settings::bytes_to_mb(self.ceiling_bytes),
            });
        }
        tracing::debug!("Guard passed for {} (estimated={} bytes)", data_path, estimated);
        Ok(estimated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use cw_bundle::{BlockInfo, BundleCompression};
    use std::fs;
    use tempfile::tempdir;

    /// A header that declares `sizes` followed by no block data at all.
    fn write_header_only(path: &Utf8Path, sizes: &[u32]) {
        let blocks = sizes
            .iter()
            .map(|&size| BlockInfo {
                uncompressed_size: size,
                compressed_size: 16,
                compression: BundleCompression::Zstd,
            })
            .collect();
        fs::write(path, BundleHeader::new(blocks).to_bytes().unwrap()).unwrap();
    }

    #[test]
    fn test_estimate_sums_declared_sizes() {
        let temp = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("__data")).unwrap();
        write_header_only(&path, &[1000, 2000, 3000]);

        let guard = ZipBombGuard::new(u64::MAX);
        assert_eq!(guard.estimate(&path).unwrap(), 6000);
    }

    #[test]
    fn test_rejects_without_reading_blocks() {
        let temp = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("__data")).unwrap();
        // Blocks are missing entirely; only the header can be read.
        write_header_only(&path, &[u32::MAX, u32::MAX]);

        let guard = ZipBombGuard::new(1024 * 1024 * 1024);
        match guard.check(&path) {
            Err(Error::Oversized {
                estimated_mb,
                limit_mb,
                ..
            }) => {
                assert_eq!(limit_mb, 1024);
                assert_eq!(estimated_mb, 8192);
            }
            other => panic!("expected Oversized, got {other:?}"),
        }
    }

    #[test]
    fn test_accepts_at_ceiling() {
        let temp = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("__data")).unwrap();
        write_header_only(&path, &[4096]);

        assert_eq!(ZipBombGuard::new(4096).check(&path).unwrap(), 4096);
    }
}
