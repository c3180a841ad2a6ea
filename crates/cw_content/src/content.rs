//! Indexed content records.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::layout;

/// Marker recorded in `patched_by` once the blocklist pass has been applied.
pub const BLOCKLIST_MARKER: &str = "blocklist";

/// The class of a piece of content.
///
/// The raw values are the integers stored in the `contentType` field of the
/// bundle's behaviour record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Avatar,
    World,
}

impl ContentType {
    /// Map a raw `contentType` value. `2` is a reserved slot and is not indexed.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(ContentType::Avatar),
            1 => Some(ContentType::World),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i64 {
        match self {
            ContentType::Avatar => 0,
            ContentType::World => 1,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Avatar => f.write_str("avatar"),
            ContentType::World => f.write_str("world"),
        }
    }
}

/// The currently selected version of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub version: u32,
    /// The version directory (`<cache>/<stable name>/<hex version>`).
    pub path: Utf8PathBuf,
    /// Actors (plugin names and [`BLOCKLIST_MARKER`]) that already patched this version.
    #[serde(default)]
    pub patched_by: BTreeSet<String>,
}

impl VersionMeta {
    pub fn new(version: u32, path: Utf8PathBuf) -> Self {
        Self {
            version,
            path,
            patched_by: BTreeSet::new(),
        }
    }

    pub fn is_patched_by(&self, actor: &str) -> bool {
        self.patched_by.contains(actor)
    }

    /// Point at a different version directory. A new version has not been patched yet.
    pub fn retarget(&mut self, version: u32, path: Utf8PathBuf) {
        self.version = version;
        self.path = path;
        self.patched_by.clear();
    }
}

/// One indexed piece of content, keyed by its embedded identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub stable_name: String,
    pub version_meta: VersionMeta,
}

impl Content {
    pub fn new(
        id: impl Into<String>,
        content_type: ContentType,
        stable_name: impl Into<String>,
        version: u32,
        path: Utf8PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            content_type,
            stable_name: stable_name.into(),
            version_meta: VersionMeta::new(version, path),
        }
    }

    pub fn version(&self) -> u32 {
        self.version_meta.version
    }

    pub fn path(&self) -> &Utf8Path {
        &self.version_meta.path
    }

    /// Path of the bundle data file inside the current version directory.
    pub fn data_path(&self) -> Utf8PathBuf {
        layout::data_file(&self.version_meta.path)
    }

    pub fn is_world(&self) -> bool {
        self.content_type == ContentType::World
    }
}
