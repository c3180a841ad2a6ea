//! Persistent content index.
//!
//! The [`ContentIndex`] holds exactly one [`Content`] record per identity and
//! is the single source of truth for what has been discovered and patched. It
//! is persisted as a JSON document (`index.json`):
//!
//! ```json
//! {
//!   "version": 1,
//!   "contents": [
//!     {
//!       "id": "wrld_...",
//!       "type": "World",
//!       "stableName": "abc123",
//!       "versionMeta": { "version": 1, "path": ".../abc123/01", "patchedBy": [] }
//!     }
//!   ]
//! }
//! ```
//!
//! All access goes through one mutex. [`ContentIndex::transaction`] runs a
//! closure with exclusive access to the [`IndexState`] and writes the document
//! back if the closure changed anything, so a read-modify-write sequence on one
//! identity can never interleave with another. The document is written to a
//! temporary sibling and renamed over the original, so a crash mid-write
//! leaves the previous document intact.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::content::Content;
use crate::error::Result;

/// Schema version of the persisted document.
const INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexDocument {
    version: u32,
    contents: Vec<Content>,
}

/// In-memory view of the index, only reachable through [`ContentIndex`].
#[derive(Debug, Default)]
pub struct IndexState {
    by_id: BTreeMap<String, Content>,
    /// Stable name -> id.
    by_stable_name: HashMap<String, String>,
    dirty: bool,
}

impl IndexState {
    fn from_contents(contents: Vec<Content>) -> Self {
        let mut state = Self::default();
        for content in contents {
            state.insert(content);
        }
        state.dirty = false;
        state
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&Content> {
        self.by_id.get(id)
    }

    pub fn lookup_by_stable_name(&self, stable_name: &str) -> Option<&Content> {
        self.by_stable_name
            .get(stable_name)
            .and_then(|id| self.by_id.get(id))
    }

    /// Insert a record, replacing any record with the same id.
    ///
    /// Returns the replaced record.
    pub fn insert(&mut self, content: Content) -> Option<Content> {
        let previous = self.remove(&content.id);
        self.by_stable_name
            .insert(content.stable_name.clone(), content.id.clone());
        self.by_id.insert(content.id.clone(), content);
        self.dirty = true;
        previous
    }

    /// Point a record at another version directory and clear its `patched_by`.
    ///
    /// Returns `false` if no record exists for `id`.
    pub fn update_version(&mut self, id: &str, version: u32, path: Utf8PathBuf) -> bool {
        let Some(content) = self.by_id.get_mut(id) else {
            return false;
        };
        content.version_meta.retarget(version, path);
        self.dirty = true;
        true
    }

    /// Move a record under a different stable name.
    pub fn rename_stable(&mut self, id: &str, stable_name: &str) -> bool {
        let Some(content) = self.by_id.get_mut(id) else {
            return false;
        };
        if content.stable_name == stable_name {
            return true;
        }
        if self.by_stable_name.get(&content.stable_name) == Some(&content.id) {
            self.by_stable_name.remove(&content.stable_name);
        }
        content.stable_name = stable_name.to_string();
        self.by_stable_name
            .insert(stable_name.to_string(), id.to_string());
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Content> {
        let content = self.by_id.remove(id)?;
        if self.by_stable_name.get(&content.stable_name) == Some(&content.id) {
            self.by_stable_name.remove(&content.stable_name);
        }
        self.dirty = true;
        Some(content)
    }

    /// Record actors that patched the version at `path`.
    ///
    /// Ignored (returns `false`) if the record has since moved to another
    /// version, since the actors patched a version that is no longer tracked.
    pub fn record_patched<I, S>(&mut self, id: &str, path: &Utf8Path, actors: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(content) = self.by_id.get_mut(id) else {
            return false;
        };
        if content.version_meta.path.as_path() != path {
            return false;
        }
        for actor in actors {
            if content.version_meta.patched_by.insert(actor.into()) {
                self.dirty = true;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Content> {
        self.by_id.values()
    }

    pub fn stable_names(&self) -> HashSet<String> {
        self.by_stable_name.keys().cloned().collect()
    }
}

/// Durable, mutex-guarded content index.
pub struct ContentIndex {
    path: Option<Utf8PathBuf>,
    state: Mutex<IndexState>,
}

impl ContentIndex {
    /// Open the index stored at `path`, starting empty if the file doesn't exist.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.as_std_path().exists() {
            let contents = std::fs::read_to_string(path.as_std_path())?;
            let document: IndexDocument = serde_json::from_str(&contents)?;
            if document.version != INDEX_SCHEMA_VERSION {
                tracing::warn!(
                    "Index {} has schema version {} (expected {}), loading anyway",
                    path,
                    document.version,
                    INDEX_SCHEMA_VERSION
                );
            }
            IndexState::from_contents(document.contents)
        } else {
            IndexState::default()
        };

        tracing::debug!("Opened content index {} ({} records)", path, state.len());
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// An index that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(IndexState::default()),
        }
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the index and persist any change it made.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut IndexState) -> R) -> Result<R> {
        let mut state = self.lock();
        let result = f(&mut state);
        if state.dirty {
            self.persist(&state)?;
            state.dirty = false;
        }
        Ok(result)
    }

    /// Run `f` with shared access to the index.
    pub fn read<R>(&self, f: impl FnOnce(&IndexState) -> R) -> R {
        f(&self.lock())
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Content> {
        self.read(|s| s.lookup_by_id(id).cloned())
    }

    pub fn lookup_by_stable_name(&self, stable_name: &str) -> Option<Content> {
        self.read(|s| s.lookup_by_stable_name(stable_name).cloned())
    }

    pub fn insert(&self, content: Content) -> Result<Option<Content>> {
        self.transaction(|s| s.insert(content))
    }

    pub fn update_version(&self, id: &str, version: u32, path: Utf8PathBuf) -> Result<bool> {
        self.transaction(|s| s.update_version(id, version, path))
    }

    pub fn remove(&self, id: &str) -> Result<Option<Content>> {
        self.transaction(|s| s.remove(id))
    }

    pub fn record_patched<I, S>(&self, id: &str, path: &Utf8Path, actors: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transaction(|s| s.record_patched(id, path, actors))
    }

    pub fn stable_names(&self) -> HashSet<String> {
        self.read(IndexState::stable_names)
    }

    /// Clone every record, ordered by id.
    pub fn snapshot(&self) -> Vec<Content> {
        self.read(|s| s.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.read(IndexState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(IndexState::is_empty)
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        // Recover from poisoning; the closures passed to `transaction` never panic mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &IndexState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent.as_std_path())?;
            }
        }

        let document = IndexDocument {
            version: INDEX_SCHEMA_VERSION,
            contents: state.iter().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&document)?;

        let tmp_path = path.with_extension("json.partial");
        std::fs::write(tmp_path.as_std_path(), contents)?;
        std::fs::rename(tmp_path.as_std_path(), path.as_std_path())?;
        tracing::trace!("Persisted content index {} ({} records)", path, state.len());
        Ok(())
    }
}
