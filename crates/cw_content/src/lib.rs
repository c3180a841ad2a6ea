//! Content index and patch pipeline for a versioned asset bundle cache.
//!
//! The cache is laid out as `<root>/<stable name>/<hex version>/__data`. This
//! crate keeps a durable index with one record per content identity (the id
//! embedded in the bundle, never the folder name), keeps that index in step
//! with the filesystem, and rewrites the newest version of every World
//! through an ordered set of plugins and a blocklist.
//!
//! - [`IndexReconciler`] repairs drift between the index and the disk.
//! - [`Scanner`] discovers new stable-name directories and applies the
//!   two-stage insertion protocol, resolving duplicates with
//!   [`DuplicateResolutionPolicy`].
//! - [`PatchPipeline`] dispatches to [`Plugin`]s and a [`Blocklist`], guarded
//!   by [`ZipBombGuard`], and hands the result to [`BundleRewriter`].
//!
//! # Example
//!
//! ```no_run
//! use cw_content::{ContentIndex, IndexReconciler, PatchPipeline, Scanner, Settings};
//! use camino::Utf8Path;
//!
//! # fn main() -> cw_content::Result<()> {
//! let index = ContentIndex::open("index.json")?;
//! IndexReconciler::new(&index).reconcile()?;
//!
//! let pipeline = PatchPipeline::new(Settings::default());
//! let report = Scanner::new(&index)
//!     .with_pipeline(&pipeline)
//!     .scan(Utf8Path::new("/path/to/Cache-WindowsPlayer"))?;
//! println!("indexed {} new entries", report.inserted.len());
//! # Ok(())
//! # }
//! ```

pub mod blocklist;
pub mod content;
pub mod error;
pub mod guard;
pub mod identify;
pub mod index;
pub mod layout;
pub mod pipeline;
pub mod plugin;
pub mod policy;
pub mod reconcile;
pub mod rewriter;
pub mod scanner;
pub mod settings;
pub mod version;

pub use blocklist::{BlockRule, Blocklist, RuleOutcome, RuleSet};
pub use content::{Content, ContentType, VersionMeta, BLOCKLIST_MARKER};
pub use error::{Error, Result};
pub use guard::ZipBombGuard;
pub use index::{ContentIndex, IndexState};
pub use pipeline::{PatchOutcome, PatchPipeline, PatchReport};
pub use plugin::{Applicability, PatchStatus, Plugin, PluginRegistry, Verification};
pub use policy::{DuplicateResolutionPolicy, Resolution};
pub use reconcile::{IndexReconciler, ReconcileReport};
pub use rewriter::{BundleRewriter, RewriteStats, StagingMedium};
pub use scanner::{
    GroupOutcome, InsertOutcome, Rejection, ScanReport, Scanner, Stage1Outcome, Stage2Outcome,
};
pub use settings::Settings;
