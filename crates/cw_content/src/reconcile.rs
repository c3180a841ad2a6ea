//! Startup repair of index drift against the cache directory.
//!
//! For every record the reconciler looks at the record's stable-name
//! directory on disk:
//!
//! - directory gone: the record is removed;
//! - no version directory inside: the record is kept and reported as stale,
//!   so its patch history survives if the directory reappears;
//! - highest version directory has no data file: the record is removed;
//! - highest version is newer than the stored one, or the stored version
//!   directory no longer exists: the record is retargeted and its
//!   `patched_by` cleared.
//!
//! Filesystem inspection happens outside the index lock; the resulting
//! actions are applied in a single transaction and skipped for any record
//! that changed in the meantime.

use camino::{Utf8Path, Utf8PathBuf};

use crate::content::Content;
use crate::error::Result;
use crate::index::ContentIndex;
use crate::layout;

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Number of records inspected.
    pub checked: usize,
    /// Ids removed from the index.
    pub removed: Vec<String>,
    /// Ids moved to another version directory.
    pub retargeted: Vec<String>,
    /// Ids whose stable-name directory holds no version directory.
    pub stale: Vec<String>,
}

#[derive(Debug)]
enum Action {
    Keep,
    Stale,
    Remove,
    Retarget { version: u32, path: Utf8PathBuf },
}

pub struct IndexReconciler<'a> {
    index: &'a ContentIndex,
}

impl<'a> IndexReconciler<'a> {
    pub fn new(index: &'a ContentIndex) -> Self {
        Self { index }
    }

    /// Repair every record against the filesystem.
    ///
    /// Only fatal conditions (an out-of-range version directory name) and
    /// index persistence failures are returned as errors.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let snapshot = self.index.snapshot();
        let mut planned = Vec::with_capacity(snapshot.len());
        for content in &snapshot {
            planned.push((content, plan(content)?));
        }

        let mut report = ReconcileReport {
            checked: snapshot.len(),
            ..Default::default()
        };

        self.index.transaction(|state| {
            for (content, action) in planned {
                let unchanged = state
                    .lookup_by_id(&content.id)
                    .is_some_and(|current| current.version_meta.path == content.version_meta.path);
                if !unchanged {
                    tracing::debug!("Record {} changed during reconciliation, skipping", content.id);
                    continue;
                }

                match action {
                    Action::Keep => {}
                    Action::Stale => report.stale.push(content.id.clone()),
                    Action::Remove => {
                        state.remove(&content.id);
                        report.removed.push(content.id.clone());
                    }
                    Action::Retarget { version, path } => {
                        state.update_version(&content.id, version, path);
                        report.retargeted.push(content.id.clone());
                    }
                }
            }
        })?;

        tracing::info!(
            "Reconciled {} records: removed={} retargeted={} stale={}",
            report.checked,
            report.removed.len(),
            report.retargeted.len(),
            report.stale.len()
        );
        Ok(report)
    }
}

fn plan(content: &Content) -> Result<Action> {
    let Some(stable_dir) = content.path().parent() else {
        tracing::warn!("Record {} has no stable-name directory in its path {}", content.id, content.path());
        return Ok(Action::Remove);
    };

    if !stable_dir.as_std_path().is_dir() {
        tracing::info!("Removing {}: directory {} is gone", content.id, stable_dir);
        return Ok(Action::Remove);
    }

    let Some((version, dir)) = layout::highest_version_dir(stable_dir)? else {
        tracing::warn!(
            "No version directory under {} for {}; keeping record for operator attention",
            stable_dir,
            content.id
        );
        return Ok(Action::Stale);
    };

    if !layout::has_data_file(&dir) {
        tracing::warn!(
            "Removing {}: highest version directory {} has no {}",
            content.id,
            dir,
            layout::DATA_FILE
        );
        return Ok(Action::Remove);
    }

    if version > content.version() {
        tracing::info!(
            "Advancing {} from version {} to {} ({})",
            content.id,
            content.version(),
            version,
            dir
        );
        return Ok(Action::Retarget { version, path: dir });
    }

    if !is_dir(content.path()) {
        tracing::warn!(
            "Version directory {} for {} is gone, falling back to {}",
            content.path(),
            content.id,
            dir
        );
        return Ok(Action::Retarget { version, path: dir });
    }

    Ok(Action::Keep)
}

fn is_dir(path: &Utf8Path) -> bool {
    path.as_std_path().is_dir()
}
