//! Crash-safe replacement of a bundle data file.
//!
//! The patched bundle is written to `__data.clean` first. Only after every
//! handle on it is closed does `__data` move aside to `__data.bak` and the
//! clean file take its place, so an interruption leaves either the original
//! or the finished rewrite in place.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cw_bundle::{Bundle, BundleCompression};

use crate::error::Result;
use crate::layout;
use crate::settings::Settings;

/// Where the uncompressed form was staged before repacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMedium {
    /// Recompression is off; the bundle was written uncompressed directly.
    Direct,
    Memory,
    TempFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteStats {
    pub bytes_written: u64,
    pub staging: StagingMedium,
    /// Location of the retained original, if backups are enabled.
    pub backup: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BundleRewriter {
    recompress: bool,
    keep_backups: bool,
    memory_limit: u64,
}

impl BundleRewriter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            recompress: settings.recompress,
            keep_backups: settings.keep_backups,
            memory_limit: settings.memory_staging_bytes(),
        }
    }

    /// Serialize `bundle` and atomically replace the data file at `data_path`.
    pub fn rewrite(&self, bundle: &Bundle, data_path: &Utf8Path) -> Result<RewriteStats> {
        let clean = layout::sibling(data_path, layout::CLEAN_SUFFIX);

        let staging = match self.write_clean(bundle, data_path, &clean) {
            Ok(staging) => staging,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(clean.as_std_path()) {
                    tracing::debug!("Could not remove partial {}: {}", clean, cleanup);
                }
                return Err(e);
            }
        };
        let bytes_written = fs::metadata(clean.as_std_path())?.len();

        let backup = self
            .keep_backups
            .then(|| layout::sibling(data_path, layout::BACKUP_SUFFIX));
        replace_with_backup(&clean, data_path, backup.as_deref())?;

        tracing::info!(
            "Rewrote {} (bytes={}, staging={:?}, backup={})",
            data_path,
            bytes_written,
            staging,
            backup.is_some()
        );

        Ok(RewriteStats {
            bytes_written,
            staging,
            backup,
        })
    }

    fn write_clean(
        &self,
        bundle: &Bundle,
        data_path: &Utf8Path,
        clean: &Utf8Path,
    ) -> Result<StagingMedium> {
        if !self.recompress {
            write_bundle(bundle, clean, BundleCompression::None)?;
            return Ok(StagingMedium::Direct);
        }

        let estimate = bundle.encoded_payload_len()?;
        let (staged, medium) = if estimate < self.memory_limit {
            let buffer = bundle.to_bytes(BundleCompression::None)?;
            (Bundle::from_bytes(&buffer)?, StagingMedium::Memory)
        } else {
            let dir = data_path.parent().unwrap_or_else(|| Utf8Path::new("."));
            (stage_in_file(bundle, dir)?, StagingMedium::TempFile)
        };

        tracing::debug!(
            "Staged {} bytes for {} in {:?}",
            estimate,
            data_path,
            medium
        );
        write_bundle(&staged, clean, BundleCompression::Zstd)?;
        Ok(medium)
    }
}

/// Write the uncompressed form to a temporary file next to the data file and
/// read it back. The file is deleted when it goes out of scope.
fn stage_in_file(bundle: &Bundle, dir: &Utf8Path) -> Result<Bundle> {
    let mut staging = tempfile::Builder::new()
        .prefix("__data.")
        .suffix(".stage")
        .tempfile_in(dir.as_std_path())?;

    {
        let mut writer = BufWriter::new(staging.as_file_mut());
        bundle.write(&mut writer, BundleCompression::None)?;
        writer.flush()?;
    }

    let file = staging.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    let staged = Bundle::read(&mut BufReader::new(file))?;
    Ok(staged)
}

fn write_bundle(bundle: &Bundle, path: &Utf8Path, compression: BundleCompression) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_std_path())?);
    bundle.write(&mut writer, compression)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Move `clean` over `target`, first preserving `target` at `backup`.
///
/// An existing backup is replaced. Hard-linking is tried first so the
/// original never disappears from `target` before the rename.
pub fn replace_with_backup(
    clean: &Utf8Path,
    target: &Utf8Path,
    backup: Option<&Utf8Path>,
) -> Result<()> {
    if let Some(backup) = backup {
        if backup.as_std_path().exists() {
            fs::remove_file(backup.as_std_path())?;
        }
        if let Err(e) = fs::hard_link(target.as_std_path(), backup.as_std_path()) {
            tracing::debug!("Hard link to {} failed ({}), copying instead", backup, e);
            fs::copy(target.as_std_path(), backup.as_std_path())?;
        }
    }

    fs::rename(clean.as_std_path(), target.as_std_path())?;
    Ok(())
}
