use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Largest uncompressed payload that may ever be staged in memory, whatever
/// `memory_staging_mb` says. Just below `i32::MAX` so a staged buffer always
/// fits the signed-length APIs of the codec.
pub const HARD_MEMORY_CEILING: u64 = i32::MAX as u64 - 64 * MIB;

/// Patch pipeline settings, passed explicitly to every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run plugins and the blocklist pass but never write to disk or the index.
    pub dry_run: bool,
    /// Repack rewritten bundles with block compression.
    pub recompress: bool,
    /// Keep the pre-patch data file as `__data.bak`.
    pub keep_backups: bool,
    /// Bundles declaring a larger decompressed size are rejected unread.
    pub max_decompressed_mb: u64,
    /// Rewrites estimated above this size stage through a temporary file.
    pub memory_staging_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dry_run: false,
            recompress: true,
            keep_backups: true,
            max_decompressed_mb: 1024,
            memory_staging_mb: 512,
        }
    }
}

impl Settings {
    pub fn max_decompressed_bytes(&self) -> u64 {
        self.max_decompressed_mb.saturating_mul(MIB)
    }

    /// Memory staging limit in bytes, capped at [`HARD_MEMORY_CEILING`].
    pub fn memory_staging_bytes(&self) -> u64 {
        self.memory_staging_mb
            .saturating_mul(MIB)
            .min(HARD_MEMORY_CEILING)
    }
}

/// Bytes to whole megabytes, rounding up.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes.div_ceil(MIB)
}
