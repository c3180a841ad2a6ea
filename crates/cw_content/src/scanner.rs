//! Cache tree discovery and the two-stage insertion protocol.
//!
//! Stage 1 looks at a single version directory: it upgrades a record already
//! tracked under the same stable name, or identifies the bundle and produces
//! a candidate. Stage 1 runs for a whole batch on the rayon pool before any
//! candidate is applied.
//!
//! Stage 2 applies the candidates of one identity group to the index in
//! stage-1 order, consulting [`DuplicateResolutionPolicy`] when the identity
//! is already indexed. Groups are independent and also run in parallel. When a
//! [`PatchPipeline`] is attached, it runs once for every group that changed
//! the index.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;

use crate::content::{Content, ContentType};
use crate::error::{Error, Result};
use crate::identify;
use crate::index::ContentIndex;
use crate::layout;
use crate::pipeline::{PatchPipeline, PatchReport};
use crate::policy::{DuplicateResolutionPolicy, Resolution};
use crate::version;

/// Stage 2 attempts before a candidate whose record keeps changing is skipped.
const MAX_APPLY_ATTEMPTS: usize = 8;

/// Why Stage 1 dropped a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The stable name is tracked at the same or a higher version.
    NotAnUpgrade { stored: u32, found: u32 },
    /// The stable-name directory holds no version directory.
    NoVersionDir,
    MissingData,
    /// No behaviour record carries an identity.
    Unidentified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage1Outcome {
    /// The record tracked under this stable name now points at the directory.
    Upgraded(Content),
    Rejected(Rejection),
    Candidate(Content),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage2Outcome {
    Inserted(Content),
    /// Same stable name, higher version.
    Advanced(Content),
    /// Different stable name won the duplicate resolution.
    Replaced(Content),
    Discarded,
    /// Imposter avatar with no indexed counterpart.
    Excluded,
    /// Avatar duplicate under another stable name that no rule decides.
    Unresolved(String),
}

impl Stage2Outcome {
    /// The record as written to the index, if the index changed.
    pub fn changed(&self) -> Option<&Content> {
        match self {
            Stage2Outcome::Inserted(c) | Stage2Outcome::Advanced(c) | Stage2Outcome::Replaced(c) => {
                Some(c)
            }
            _ => None,
        }
    }
}

/// Result of [`Scanner::insert_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Rejected(Rejection),
    Applied(Stage2Outcome),
}

/// Stage 2 result for one identity group.
#[derive(Debug, Default)]
pub struct GroupOutcome {
    pub outcomes: Vec<Stage2Outcome>,
    /// Candidates that failed with a non-fatal error.
    pub errors: Vec<(Utf8PathBuf, String)>,
    pub patch: Option<PatchReport>,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Stable-name directories skipped because they are already indexed.
    pub known: usize,
    /// Stable-name directories that went through Stage 1.
    pub scanned: usize,
    pub inserted: Vec<String>,
    pub advanced: Vec<String>,
    pub replaced: Vec<String>,
    pub unresolved: Vec<String>,
    pub rejected: usize,
    pub discarded: usize,
    pub excluded: usize,
    pub errors: Vec<(Utf8PathBuf, String)>,
    pub patches: Vec<PatchReport>,
}

impl ScanReport {
    fn record_group(&mut self, group: GroupOutcome) {
        for outcome in group.outcomes {
            match outcome {
                Stage2Outcome::Inserted(c) => self.inserted.push(c.id),
                Stage2Outcome::Advanced(c) => self.advanced.push(c.id),
                Stage2Outcome::Replaced(c) => self.replaced.push(c.id),
                Stage2Outcome::Discarded => self.discarded += 1,
                Stage2Outcome::Excluded => self.excluded += 1,
                Stage2Outcome::Unresolved(id) => self.unresolved.push(id),
            }
        }
        self.errors.extend(group.errors);
        self.patches.extend(group.patch);
    }
}

pub struct Scanner<'a> {
    index: &'a ContentIndex,
    pipeline: Option<&'a PatchPipeline>,
}

impl<'a> Scanner<'a> {
    pub fn new(index: &'a ContentIndex) -> Self {
        Self {
            index,
            pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: &'a PatchPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Discover and index every stable-name directory under `cache_root`
    /// that is not indexed yet.
    ///
    /// Per-directory failures are collected in [`ScanReport::errors`]; only
    /// fatal errors abort the scan.
    pub fn scan(&self, cache_root: &Utf8Path) -> Result<ScanReport> {
        let known = self.index.stable_names();
        let mut report = ScanReport::default();

        let fresh: Vec<Utf8PathBuf> = layout::list_dirs(cache_root)?
            .into_iter()
            .filter(|dir| match dir.file_name() {
                Some(name) if known.contains(name) => {
                    report.known += 1;
                    false
                }
                Some(_) => true,
                None => false,
            })
            .collect();
        report.scanned = fresh.len();
        tracing::info!(
            "Scanning {}: new={} known={}",
            cache_root,
            report.scanned,
            report.known
        );

        let stage1: Vec<(Utf8PathBuf, Result<Stage1Outcome>)> = fresh
            .into_par_iter()
            .map(|stable_dir| {
                let outcome = self.prepare_stable_dir(&stable_dir);
                (stable_dir, outcome)
            })
            .collect();

        let mut groups: BTreeMap<String, Vec<Content>> = BTreeMap::new();
        for (dir, outcome) in stage1 {
            match outcome {
                Ok(Stage1Outcome::Candidate(content)) => {
                    groups.entry(content.id.clone()).or_default().push(content);
                }
                Ok(Stage1Outcome::Upgraded(content)) => {
                    // Another writer indexed this stable name since the listing.
                    let group = GroupOutcome {
                        patch: self.run_pipeline(&content),
                        outcomes: vec![Stage2Outcome::Advanced(content)],
                        ..Default::default()
                    };
                    report.record_group(group);
                }
                Ok(Stage1Outcome::Rejected(_)) => report.rejected += 1,
                Err(e) if e.is_fatal() => {
                    tracing::error!("Fatal error while scanning {}: {}", dir, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", dir, e);
                    report.errors.push((dir, e.to_string()));
                }
            }
        }

        let stage2: Vec<Result<GroupOutcome>> = groups
            .into_par_iter()
            .map(|(_, group)| self.apply_group(group))
            .collect();
        for group in stage2 {
            report.record_group(group?);
        }

        tracing::info!(
            "Scan complete: inserted={} advanced={} replaced={} rejected={} discarded={} excluded={} errors={}",
            report.inserted.len(),
            report.advanced.len(),
            report.replaced.len(),
            report.rejected,
            report.discarded,
            report.excluded,
            report.errors.len()
        );
        Ok(report)
    }

    /// Stage 1 followed by Stage 2 for a single version directory (or a
    /// file inside it).
    ///
    /// This is the entry point used when a directory is known to have
    /// changed, and it is how version drift under a tracked stable name is
    /// picked up.
    pub fn insert_directory(&self, path: &Utf8Path) -> Result<InsertOutcome> {
        match self.prepare(path)? {
            Stage1Outcome::Rejected(rejection) => Ok(InsertOutcome::Rejected(rejection)),
            Stage1Outcome::Upgraded(content) => {
                self.run_pipeline(&content);
                Ok(InsertOutcome::Applied(Stage2Outcome::Advanced(content)))
            }
            Stage1Outcome::Candidate(content) => {
                let path = content.path().to_path_buf();
                let mut group = self.apply_group(vec![content])?;
                if let Some((_, message)) = group.errors.pop() {
                    return Err(Error::Other(format!("{path}: {message}")));
                }
                let outcome = group.outcomes.pop().unwrap_or(Stage2Outcome::Discarded);
                Ok(InsertOutcome::Applied(outcome))
            }
        }
    }

    fn prepare_stable_dir(&self, stable_dir: &Utf8Path) -> Result<Stage1Outcome> {
        match layout::highest_version_dir(stable_dir)? {
            Some((_, version_dir)) => self.prepare(&version_dir),
            None => {
                tracing::debug!("No version directory under {}", stable_dir);
                Ok(Stage1Outcome::Rejected(Rejection::NoVersionDir))
            }
        }
    }

    /// Stage 1 for one version directory.
    pub fn prepare(&self, path: &Utf8Path) -> Result<Stage1Outcome> {
        let dir = layout::normalize_version_dir(path);
        let (Some(stable_name), Some(dir_name)) = (layout::stable_name_of(&dir), dir.file_name())
        else {
            return Err(Error::Other(format!("{dir} is not inside a stable-name directory")));
        };
        let found = version::decode(dir_name)?;
        let stable_name = stable_name.to_string();

        if let Some(existing) = self.index.lookup_by_stable_name(&stable_name) {
            return self.upgrade_in_place(existing, found, dir);
        }

        if !layout::has_data_file(&dir) {
            tracing::debug!("Rejecting {}: no {}", dir, layout::DATA_FILE);
            return Ok(Stage1Outcome::Rejected(Rejection::MissingData));
        }

        match identify::identify(&layout::data_file(&dir))? {
            Some((id, content_type)) => Ok(Stage1Outcome::Candidate(Content::new(
                id,
                content_type,
                stable_name,
                found,
                dir,
            ))),
            None => {
                tracing::debug!("Rejecting {}: no identity record", dir);
                Ok(Stage1Outcome::Rejected(Rejection::Unidentified))
            }
        }
    }

    fn upgrade_in_place(
        &self,
        existing: Content,
        found: u32,
        dir: Utf8PathBuf,
    ) -> Result<Stage1Outcome> {
        if found <= existing.version() {
            tracing::trace!(
                "{} is not an upgrade for {} (stored={} found={})",
                dir,
                existing.id,
                existing.version(),
                found
            );
            return Ok(Stage1Outcome::Rejected(Rejection::NotAnUpgrade {
                stored: existing.version(),
                found,
            }));
        }
        if !layout::has_data_file(&dir) {
            tracing::debug!("Rejecting upgrade {}: no {}", dir, layout::DATA_FILE);
            return Ok(Stage1Outcome::Rejected(Rejection::MissingData));
        }

        let upgraded = self.index.transaction(|state| {
            let current = state.lookup_by_id(&existing.id)?;
            if current.version() >= found {
                return None;
            }
            state.update_version(&existing.id, found, dir.clone());
            state.lookup_by_id(&existing.id).cloned()
        })?;

        match upgraded {
            Some(content) => {
                tracing::info!(
                    "Upgraded {} to version {} ({})",
                    content.id,
                    content.version(),
                    content.path()
                );
                Ok(Stage1Outcome::Upgraded(content))
            }
            None => Ok(Stage1Outcome::Rejected(Rejection::NotAnUpgrade {
                stored: existing.version(),
                found,
            })),
        }
    }

    /// Stage 2 for the candidates of one identity, in order.
    pub fn apply_group(&self, group: Vec<Content>) -> Result<GroupOutcome> {
        let mut outcome = GroupOutcome::default();
        let mut last_changed = None;

        for candidate in group {
            match self.apply_candidate(&candidate) {
                Ok(result) => {
                    if let Some(content) = result.changed() {
                        last_changed = Some(content.clone());
                    }
                    outcome.outcomes.push(result);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping candidate {}: {}", candidate.path(), e);
                    outcome.errors.push((candidate.path().to_path_buf(), e.to_string()));
                }
            }
        }

        if let Some(content) = last_changed {
            outcome.patch = self.run_pipeline(&content);
        }
        Ok(outcome)
    }

    /// Stage 2 for one candidate.
    ///
    /// The decision is made outside the index lock because it may read bundles
    /// from disk. It is committed only if the record it was based on is still
    /// current; otherwise the candidate is decided again.
    fn apply_candidate(&self, candidate: &Content) -> Result<Stage2Outcome> {
        for _ in 0..MAX_APPLY_ATTEMPTS {
            if let Some(outcome) = self.try_apply_candidate(candidate)? {
                return Ok(outcome);
            }
            tracing::debug!(
                "Record for {} changed while resolving {}, retrying",
                candidate.id,
                candidate.path()
            );
        }
        Err(Error::Other(format!(
            "record for {} kept changing while applying {}",
            candidate.id,
            candidate.path()
        )))
    }

    /// One attempt at Stage 2. `Ok(None)` means the record changed underneath.
    fn try_apply_candidate(&self, candidate: &Content) -> Result<Option<Stage2Outcome>> {
        let Some(existing) = self.index.lookup_by_id(&candidate.id) else {
            if candidate.content_type == ContentType::Avatar
                && identify::is_imposter(&candidate.data_path())?
            {
                tracing::debug!("Excluding imposter avatar {} at {}", candidate.id, candidate.path());
                return Ok(Some(Stage2Outcome::Excluded));
            }
            let inserted = self.index.transaction(|state| {
                if state.lookup_by_id(&candidate.id).is_some() {
                    return false;
                }
                state.insert(candidate.clone());
                true
            })?;
            if !inserted {
                return Ok(None);
            }
            tracing::info!(
                "Indexed {} {} (stable={} version={})",
                candidate.content_type,
                candidate.id,
                candidate.stable_name,
                candidate.version()
            );
            return Ok(Some(Stage2Outcome::Inserted(candidate.clone())));
        };

        match DuplicateResolutionPolicy::resolve(&existing, candidate)? {
            Resolution::Replace => {
                let same_stable = existing.stable_name == candidate.stable_name;
                let updated = self.index.transaction(|state| {
                    let current = state.lookup_by_id(&candidate.id)?;
                    if current.path() != existing.path() {
                        return None;
                    }
                    state.update_version(
                        &candidate.id,
                        candidate.version(),
                        candidate.path().to_path_buf(),
                    );
                    state.rename_stable(&candidate.id, &candidate.stable_name);
                    state.lookup_by_id(&candidate.id).cloned()
                })?;
                let Some(updated) = updated else {
                    return Ok(None);
                };
                Ok(Some(if same_stable {
                    Stage2Outcome::Advanced(updated)
                } else {
                    Stage2Outcome::Replaced(updated)
                }))
            }
            Resolution::Discard => Ok(Some(Stage2Outcome::Discarded)),
            Resolution::Unresolved => Ok(Some(Stage2Outcome::Unresolved(candidate.id.clone()))),
        }
    }

    fn run_pipeline(&self, content: &Content) -> Option<PatchReport> {
        let pipeline = self.pipeline?;
        if !content.is_world() {
            return None;
        }
        match pipeline.patch(self.index, content) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!("Patching {} failed: {}", content.id, e);
                None
            }
        }
    }
}
