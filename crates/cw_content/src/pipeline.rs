//! Plugin dispatch, the blocklist pass and the rewrite decision for one
//! World entry.
//!
//! The bundle is decoded once, after the [`ZipBombGuard`] has accepted its
//! header, and is then borrowed mutably by every plugin in registration order
//! and by the blocklist rules. Nothing touches the disk or the index unless
//! something mutated the bundle and the run is not a dry run. The `patched_by`
//! additions of a run are persisted only after the rewrite has succeeded.

use std::sync::Arc;

use cw_bundle::Bundle;

use crate::blocklist::Blocklist;
use crate::content::{Content, BLOCKLIST_MARKER};
use crate::error::{Error, Result};
use crate::guard::ZipBombGuard;
use crate::identify;
use crate::index::ContentIndex;
use crate::plugin::{self, PatchStatus, Plugin, PluginRegistry, Verification};
use crate::rewriter::{BundleRewriter, RewriteStats};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Only Worlds are patched.
    NotApplicable,
    /// The guard refused the bundle before it was decoded.
    Rejected { estimated_mb: u64, limit_mb: u64 },
    /// No plugin or rule mutated the bundle.
    Unchanged,
    /// Mutations happened but the run was a dry run.
    DryRun,
    Written(RewriteStats),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub content_id: String,
    pub outcome: PatchOutcome,
    /// Plugins whose `patch` hook mutated the bundle, in registration order.
    pub patched_by: Vec<String>,
    /// Plugins with at least one failed or panicked hook.
    pub failed: Vec<String>,
    pub blocklist_applied: bool,
    pub blocklist_overridden_by: Option<String>,
    /// Blocklist targets that matched nothing.
    pub unmatched_rules: Vec<String>,
}

impl PatchReport {
    fn new(content_id: &str, outcome: PatchOutcome) -> Self {
        Self {
            content_id: content_id.to_string(),
            outcome,
            patched_by: Vec::new(),
            failed: Vec::new(),
            blocklist_applied: false,
            blocklist_overridden_by: None,
            unmatched_rules: Vec::new(),
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self.outcome, PatchOutcome::Written(_))
    }
}

pub struct PatchPipeline {
    settings: Settings,
    plugins: PluginRegistry,
    blocklist: Option<Arc<dyn Blocklist>>,
    guard: ZipBombGuard,
    rewriter: BundleRewriter,
}

impl PatchPipeline {
    pub fn new(settings: Settings) -> Self {
        Self {
            guard: ZipBombGuard::from_settings(&settings),
            rewriter: BundleRewriter::new(&settings),
            plugins: PluginRegistry::new(),
            blocklist: None,
            settings,
        }
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_blocklist(mut self, blocklist: Arc<dyn Blocklist>) -> Self {
        self.blocklist = Some(blocklist);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Run the pipeline for `content`.
    ///
    /// The index record for the content id is preferred over the passed value
    /// so that `patched_by` reflects the latest committed state. Errors are
    /// limited to I/O, decoding and index persistence; plugin and rule
    /// failures are logged and reported in [`PatchReport::failed`].
    pub fn patch(&self, index: &ContentIndex, content: &Content) -> Result<PatchReport> {
        let content = index
            .lookup_by_id(&content.id)
            .unwrap_or_else(|| content.clone());

        if !content.is_world() {
            tracing::trace!("Skipping {} {}: not a world", content.content_type, content.id);
            return Ok(PatchReport::new(&content.id, PatchOutcome::NotApplicable));
        }

        let data_path = content.data_path();
        match self.guard.check(&data_path) {
            Ok(_) => {}
            Err(Error::Oversized {
                estimated_mb,
                limit_mb,
                ..
            }) => {
                tracing::error!(
                    "Refusing to patch {}: {} declares ~{} MB decompressed (limit {} MB)",
                    content.id,
                    data_path,
                    estimated_mb,
                    limit_mb
                );
                return Ok(PatchReport::new(
                    &content.id,
                    PatchOutcome::Rejected {
                        estimated_mb,
                        limit_mb,
                    },
                ));
            }
            Err(e) => return Err(e),
        }

        let mut bundle = identify::open_bundle(&data_path)?;
        let mut report = PatchReport::new(&content.id, PatchOutcome::Unchanged);
        let mut mutated = false;
        let mut tracked = Vec::new();
        let mut patched: Vec<&Arc<dyn Plugin>> = Vec::new();

        for plugin in self.plugins.iter() {
            let name = plugin.name();
            if plugin.wants_tracking() && content.version_meta.is_patched_by(name) {
                tracing::debug!("Plugin {} already patched {}, skipping", name, content.id);
                continue;
            }

            let run = self.run_plugin(plugin.as_ref(), &content, &mut bundle);
            if run.overrides_blocklist {
                report.blocklist_overridden_by = Some(name.to_string());
            }
            if run.failed {
                report.failed.push(name.to_string());
            }
            if run.mutated {
                mutated = true;
                report.patched_by.push(name.to_string());
                patched.push(plugin);
            }
            // Recorded regardless of the run's result; persisted only after a write.
            if plugin.wants_tracking() && !self.settings.dry_run {
                tracked.push(name.to_string());
            }
        }

        if self.run_blocklist(&content, &mut bundle, &mut report) {
            mutated = true;
        }

        if !mutated {
            tracing::debug!("Nothing to write for {}", content.id);
            return Ok(report);
        }
        if self.settings.dry_run {
            tracing::info!(
                "Dry run: {} would be rewritten (plugins={:?}, blocklist={})",
                content.id,
                report.patched_by,
                report.blocklist_applied
            );
            report.outcome = PatchOutcome::DryRun;
            return Ok(report);
        }

        let stats = self.rewriter.rewrite(&bundle, &data_path)?;

        tracked.push(BLOCKLIST_MARKER.to_string());
        if !index.record_patched(&content.id, content.path(), tracked)? {
            tracing::warn!(
                "Index record for {} moved during patching; patch history not recorded",
                content.id
            );
        }

        for plugin in patched {
            plugin::isolate(plugin.as_ref(), "post_disk_write", &content, || {
                plugin.post_disk_write(&content)
            });
        }

        report.outcome = PatchOutcome::Written(stats);
        Ok(report)
    }

    fn run_plugin(&self, plugin: &dyn Plugin, content: &Content, bundle: &mut Bundle) -> PluginRun {
        let mut applies = plugin.applicability().applies_to(&content.id);
        let mut run = PluginRun {
            overrides_blocklist: plugin::isolate(plugin, "overrides_blocklist", content, || {
                Ok(plugin.overrides_blocklist(content))
            })
            .unwrap_or(false),
            ..Default::default()
        };

        if plugin::isolate(plugin, "initialize", content, || plugin.initialize(content)).is_none() {
            run.failed = true;
            applies = false;
        }

        // Failed verification revokes applicability; post_patch still runs.
        match plugin::isolate(plugin, "verify", content, || plugin.verify(content, &*bundle)) {
            Some(Verification::Success) => {}
            Some(Verification::Failure) => {
                tracing::debug!("Plugin {} did not verify {}", plugin.name(), content.id);
                applies = false;
            }
            None => {
                run.failed = true;
                applies = false;
            }
        }

        if applies {
            // A failing hook may leave the bundle half edited; roll it back.
            let checkpoint = bundle.clone();
            match plugin::isolate(plugin, "patch", content, || plugin.patch(content, bundle)) {
                Some(PatchStatus::Success) => {
                    tracing::info!("Plugin {} patched {}", plugin.name(), content.id);
                    run.mutated = true;
                }
                Some(PatchStatus::NoOp) => {}
                None => {
                    *bundle = checkpoint;
                    run.failed = true;
                }
            }
        }

        if plugin::isolate(plugin, "post_patch", content, || plugin.post_patch(content)).is_none() {
            run.failed = true;
        }
        run
    }

    /// Apply every rule for `content`. Returns whether any rule mutated the bundle.
    fn run_blocklist(&self, content: &Content, bundle: &mut Bundle, report: &mut PatchReport) -> bool {
        let Some(blocklist) = &self.blocklist else {
            return false;
        };
        if let Some(by) = &report.blocklist_overridden_by {
            tracing::info!("Blocklist for {} overridden by plugin {}", content.id, by);
            return false;
        }
        if content.version_meta.is_patched_by(BLOCKLIST_MARKER) {
            tracing::debug!("Blocklist already applied to {}", content.id);
            return false;
        }

        let mut mutated = false;
        for rule in blocklist.rules_for(&content.id) {
            let checkpoint = bundle.clone();
            match plugin::catch(|| blocklist.apply(&rule, bundle)) {
                Ok(outcome) => {
                    mutated |= outcome.mutated;
                    if !outcome.unmatched.is_empty() {
                        tracing::warn!(
                            "Blocklist rule {} for {} matched nothing: {:?}",
                            rule.name,
                            content.id,
                            outcome.unmatched
                        );
                    }
                    report.unmatched_rules.extend(outcome.unmatched);
                }
                Err(message) => {
                    *bundle = checkpoint;
                    tracing::error!(
                        "Blocklist rule {} failed for {}: {}",
                        rule.name,
                        content.id,
                        message
                    );
                }
            }
        }
        report.blocklist_applied = true;
        mutated
    }
}

#[derive(Debug, Default)]
struct PluginRun {
    overrides_blocklist: bool,
    mutated: bool,
    failed: bool,
}
