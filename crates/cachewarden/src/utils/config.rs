//! Application configuration management utilities.

use camino::Utf8PathBuf;
use cw_content::Settings;
use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;

use crate::errors::CliError;

/// Application-wide configuration stored in config.toml.
///
/// ```toml
/// cache_dir = "C:/Users/me/AppData/LocalLow/Client/Cache-WindowsPlayer"
/// blocklist_path = "blocklist.json"
///
/// [pipeline]
/// recompress = true
/// max_decompressed_mb = 1024
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub cache_dir: Option<Utf8PathBuf>,
    pub index_path: Option<Utf8PathBuf>,
    pub blocklist_path: Option<Utf8PathBuf>,
    /// How many times to look for the cache directory before giving up.
    pub cache_lookup_attempts: u32,
    pub cache_lookup_backoff_ms: u64,
    pub pipeline: Settings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            index_path: None,
            blocklist_path: None,
            cache_lookup_attempts: 5,
            cache_lookup_backoff_ms: 2000,
            pipeline: Settings::default(),
        }
    }
}

/// Returns the directory where the current executable resides.
pub fn install_dir() -> Option<Utf8PathBuf> {
    let exe = env::current_exe().ok()?;
    let parent = exe.parent()?;
    Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok()
}

/// Returns the default configuration file path (config.toml next to the executable).
pub fn default_config_path() -> Option<Utf8PathBuf> {
    install_dir().map(|dir| dir.join("config.toml"))
}

/// Per-user data directory for the index and logs.
pub fn data_dir() -> Option<Utf8PathBuf> {
    let dirs = ProjectDirs::from("dev", "cachewarden", "cachewarden")?;
    Utf8PathBuf::from_path_buf(dirs.data_local_dir().to_path_buf()).ok()
}

pub fn default_index_path() -> Option<Utf8PathBuf> {
    data_dir().map(|dir| dir.join("index.json"))
}

pub fn default_log_dir() -> Option<Utf8PathBuf> {
    data_dir().map(|dir| dir.join("logs"))
}

/// Loads the application configuration from config.toml.
///
/// A missing file yields the defaults; a file that does not parse is an error.
pub fn load_config() -> Result<AppConfig, CliError> {
    match default_config_path() {
        Some(path) => load_config_from(&path),
        None => Ok(AppConfig::default()),
    }
}

pub fn load_config_from(path: &camino::Utf8Path) -> Result<AppConfig, CliError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(e) => return Err(e.into()),
    };
    toml::from_str(&content).map_err(|source| CliError::ConfigParseError {
        path: path.to_path_buf(),
        source,
    })
}
