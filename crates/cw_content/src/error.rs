//! Error types for index and patch operations.
//!
//! All fallible functions in this crate return [`Result<T>`]. Plugin and
//! blocklist hooks are the exception: they return [`anyhow::Result`] and their
//! failures never surface here, because the pipeline isolates them.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while indexing or patching content.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize the index document or a rule set.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The bundle codec could not read or write a container.
    #[error("Bundle error: {0}")]
    Bundle(#[from] cw_bundle::BundleError),

    /// A directory name is not a hexadecimal version name.
    #[error("Not a version directory name: '{0}'")]
    InvalidVersionName(String),

    /// A hexadecimal version name does not fit in 32 bits.
    #[error("Version name '{0}' exceeds 8 hex digits")]
    VersionOutOfRange(String),

    /// A behaviour record carries an empty content identity.
    #[error("Empty blueprint id in {0}")]
    MissingIdentity(Utf8PathBuf),

    /// A behaviour record carries a content class this system does not index.
    #[error("Unknown content type {value} in {path}")]
    UnknownContentType { path: Utf8PathBuf, value: i64 },

    /// No manifest record exposes the engine version.
    #[error("Engine version could not be resolved from {0}")]
    EngineVersionUnresolved(Utf8PathBuf),

    /// The engine version string has no leading numeric component.
    #[error("Malformed engine version '{value}' in {path}")]
    MalformedEngineVersion { path: Utf8PathBuf, value: String },

    /// The declared decompressed size of a bundle exceeds the configured ceiling.
    #[error("Bundle {path} would decompress to ~{estimated_mb} MB (limit {limit_mb} MB)")]
    Oversized {
        path: Utf8PathBuf,
        estimated_mb: u64,
        limit_mb: u64,
    },

    /// Catch-all for errors from other sources.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error must terminate the process rather than skip one entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::VersionOutOfRange(_)
                | Error::EngineVersionUnresolved(_)
                | Error::MalformedEngineVersion { .. }
        )
    }
}
