use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::errors::CliError;

/// Wait for the cache directory to exist.
///
/// The client creates its cache lazily, so the directory may appear shortly
/// after start-up. The lookup is retried `attempts` times with a fixed
/// `backoff` in between; running out of attempts is fatal.
pub fn locate_cache_dir(
    path: &Utf8Path,
    attempts: u32,
    backoff: Duration,
) -> Result<Utf8PathBuf, CliError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if path.is_dir() {
            tracing::debug!("Found cache directory {} (attempt {})", path, attempt);
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Cache directory {} not found (attempt {}/{})",
            path,
            attempt,
            attempts
        );
        if attempt < attempts {
            thread::sleep(backoff);
        }
    }

    tracing::error!("Giving up on cache directory {}", path);
    Err(CliError::cache_dir_not_found(path.to_path_buf(), attempts))
}
