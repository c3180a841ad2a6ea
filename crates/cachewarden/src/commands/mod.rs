use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use cw_content::{ContentIndex, PatchPipeline, PatchReport, RuleSet, Settings};

use crate::errors::CliError;
use crate::utils::cache_dir::locate_cache_dir;
use crate::utils::config::{default_index_path, AppConfig};

mod inspect;
mod list;
mod patch;
mod reconcile;
mod scan;

pub use inspect::{inspect_bundle, InspectBundleArgs};
pub use list::{list_contents, ListContentsArgs};
pub use patch::{patch_contents, PatchContentsArgs};
pub use reconcile::reconcile_index;
pub use scan::{scan_cache, ScanCacheArgs};

/// Configuration plus the global command line overrides.
pub struct Context {
    pub config: AppConfig,
    pub cache_dir: Option<Utf8PathBuf>,
    pub index_path: Option<Utf8PathBuf>,
    pub dry_run: bool,
}

impl Context {
    pub fn settings(&self) -> Settings {
        let mut settings = self.config.pipeline.clone();
        settings.dry_run |= self.dry_run;
        settings
    }

    pub fn index_path(&self) -> Result<Utf8PathBuf, CliError> {
        self.index_path
            .clone()
            .or_else(|| self.config.index_path.clone())
            .or_else(default_index_path)
            .ok_or(CliError::IndexPathUnavailable)
    }

    pub fn open_index(&self) -> Result<ContentIndex, CliError> {
        let path = self.index_path()?;
        tracing::debug!("Opening index at {}", path);
        Ok(ContentIndex::open(path)?)
    }

    /// The cache root, waiting for it to appear if the client has not created it yet.
    pub fn cache_dir(&self) -> Result<Utf8PathBuf, CliError> {
        let path = self
            .cache_dir
            .as_ref()
            .or(self.config.cache_dir.as_ref())
            .ok_or(CliError::CacheDirNotConfigured)?;
        locate_cache_dir(
            path,
            self.config.cache_lookup_attempts,
            Duration::from_millis(self.config.cache_lookup_backoff_ms),
        )
    }

    /// Build the patch pipeline. Plugins are registered by embedders of
    /// `cw_content`; the CLI only contributes the configured blocklist.
    pub fn pipeline(&self) -> Result<PatchPipeline, CliError> {
        let pipeline = PatchPipeline::new(self.settings());
        match &self.config.blocklist_path {
            Some(path) => {
                let rules = RuleSet::load(path)?;
                tracing::info!("Loaded {} blocklist rules from {}", rules.rule_count(), path);
                Ok(pipeline.with_blocklist(Arc::new(rules)))
            }
            None => Ok(pipeline),
        }
    }
}

/// One-line summary of a pipeline run.
pub(crate) fn describe_patch(report: &PatchReport) -> String {
    use cw_content::PatchOutcome;

    let mut line = match &report.outcome {
        PatchOutcome::NotApplicable => "not a world".to_string(),
        PatchOutcome::Rejected {
            estimated_mb,
            limit_mb,
        } => format!("rejected, ~{} MB exceeds {} MB", estimated_mb, limit_mb),
        PatchOutcome::Unchanged => "unchanged".to_string(),
        PatchOutcome::DryRun => "would be rewritten (dry run)".to_string(),
        PatchOutcome::Written(stats) => format!(
            "rewritten, {} via {:?} staging",
            crate::utils::format_bytes(stats.bytes_written),
            stats.staging
        ),
    };
    if !report.patched_by.is_empty() {
        line.push_str(&format!(", patched by {}", report.patched_by.join(", ")));
    }
    if let Some(plugin) = &report.blocklist_overridden_by {
        line.push_str(&format!(", blocklist overridden by {}", plugin));
    } else if report.blocklist_applied {
        line.push_str(", blocklist applied");
    }
    if !report.failed.is_empty() {
        line.push_str(&format!(", failed: {}", report.failed.join(", ")));
    }
    line
}
