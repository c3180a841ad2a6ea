use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("No cache directory configured")]
    #[diagnostic(
        code(cache::not_configured),
        help("Pass --cache-dir or set cache_dir in config.toml next to the executable")
    )]
    CacheDirNotConfigured,

    #[error("Cache directory not found after {attempts} attempts: {path}")]
    #[diagnostic(
        code(cache::not_found),
        help("Start the client once so it creates its cache, or fix cache_dir")
    )]
    CacheDirNotFound { path: Utf8PathBuf, attempts: u32 },

    #[error("Could not determine where to store the index")]
    #[diagnostic(
        code(index::path_unavailable),
        help("Pass --index or set index_path in config.toml")
    )]
    IndexPathUnavailable,

    #[error("No indexed content with id {id}")]
    #[diagnostic(
        code(index::unknown_content),
        help("Run `cachewarden list` to see indexed ids, or `cachewarden scan` to pick up new content")
    )]
    UnknownContent { id: String },

    #[error("Configuration file error: {path}")]
    #[diagnostic(
        code(config::parse_error),
        help("Check config.toml for syntax errors")
    )]
    ConfigParseError {
        path: Utf8PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cache is in a state the index cannot represent")]
    #[diagnostic(
        code(content::fatal),
        help("Fix or remove the directory named in the cause, then run the command again")
    )]
    Fatal {
        #[source]
        source: cw_content::Error,
    },

    #[error("Content operation failed")]
    #[diagnostic(code(content::failed))]
    Content {
        #[source]
        source: cw_content::Error,
    },

    #[error("Could not read bundle {path}")]
    #[diagnostic(
        code(bundle::unreadable),
        help("Make sure the path points at a version directory or its __data file")
    )]
    Bundle {
        path: Utf8PathBuf,
        #[source]
        source: cw_bundle::BundleError,
    },

    #[error("IO operation failed")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl From<cw_content::Error> for CliError {
    fn from(source: cw_content::Error) -> Self {
        if source.is_fatal() {
            Self::Fatal { source }
        } else {
            Self::Content { source }
        }
    }
}

impl CliError {
    pub fn cache_dir_not_found(path: Utf8PathBuf, attempts: u32) -> Self {
        Self::CacheDirNotFound { path, attempts }
    }

    pub fn unknown_content(id: impl Into<String>) -> Self {
        Self::UnknownContent { id: id.into() }
    }

    pub fn bundle(path: Utf8PathBuf, source: cw_bundle::BundleError) -> Self {
        Self::Bundle { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_content_errors_are_classified() {
        let fatal: CliError = cw_content::Error::VersionOutOfRange("123456789".into()).into();
        assert!(matches!(fatal, CliError::Fatal { .. }));

        let skipped: CliError = cw_content::Error::InvalidVersionName("zz".into()).into();
        assert!(matches!(skipped, CliError::Content { .. }));
    }
}
