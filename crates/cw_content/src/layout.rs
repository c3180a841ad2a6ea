//! Cache directory layout: `<cache root>/<stable name>/<hex version>/__data`.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};
use crate::version;

/// Name of the bundle data file inside a version directory.
pub const DATA_FILE: &str = "__data";

/// Name of the optional lock file the client keeps next to the data file.
pub const LOCK_FILE: &str = "__lock";

/// Suffix of the rewritten data file before it replaces the original.
pub const CLEAN_SUFFIX: &str = "clean";

/// Suffix of the retained pre-patch data file.
pub const BACKUP_SUFFIX: &str = "bak";

pub fn data_file(version_dir: &Utf8Path) -> Utf8PathBuf {
    version_dir.join(DATA_FILE)
}

/// A version directory is only valid if it holds a data file.
pub fn has_data_file(version_dir: &Utf8Path) -> bool {
    data_file(version_dir).as_std_path().is_file()
}

/// `__data` -> `__data.<suffix>`, in the same directory.
pub fn sibling(data_path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    let name = data_path.file_name().unwrap_or(DATA_FILE);
    data_path.with_file_name(format!("{name}.{suffix}"))
}

/// Accept either a version directory or a file inside it and return the directory.
pub fn normalize_version_dir(path: &Utf8Path) -> Utf8PathBuf {
    match path.file_name() {
        Some(DATA_FILE) | Some(LOCK_FILE) => path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Stable name of a version directory (its parent directory's name).
pub fn stable_name_of(version_dir: &Utf8Path) -> Option<&str> {
    version_dir.parent().and_then(Utf8Path::file_name)
}

/// List the subdirectories of `dir`, sorted by name.
///
/// Non-UTF-8 entries are skipped with a warning. Sorting keeps every walk of
/// the same filesystem snapshot deterministic.
pub fn list_dirs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir.as_std_path())? {
        let entry = entry?;
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(p) => p,
            Err(p) => {
                tracing::warn!("Skipping non-UTF-8 path: {}", p.display());
                continue;
            }
        };
        if entry.file_type()?.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Find the highest-versioned child directory of a stable-name directory.
///
/// Children whose names are not hex are ignored. A hex name that does not fit
/// in 32 bits is a fatal [`Error::VersionOutOfRange`]. When two names decode
/// to the same value the first one in sorted order is kept. The returned
/// directory is not checked for a data file.
pub fn highest_version_dir(stable_dir: &Utf8Path) -> Result<Option<(u32, Utf8PathBuf)>> {
    let mut best: Option<(u32, Utf8PathBuf)> = None;

    for dir in list_dirs(stable_dir)? {
        let Some(name) = dir.file_name() else {
            continue;
        };
        let version = match version::decode(name) {
            Ok(v) => v,
            Err(Error::InvalidVersionName(_)) => {
                tracing::debug!("Ignoring non-version directory {}", dir);
                continue;
            }
            Err(e) => return Err(e),
        };

        let replace = match &best {
            Some((best_version, _)) => version > *best_version,
            None => true,
        };
        if replace {
            best = Some((version, dir));
        }
    }

    Ok(best)
}
