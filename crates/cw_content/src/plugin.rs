//! Plugin contract and the ordered registry the pipeline dispatches to.
//!
//! Hooks return [`anyhow::Result`] so a plugin can use whatever error type it
//! likes. The pipeline never lets a hook failure escape: every call goes
//! through [`isolate`], which turns both errors and panics into a logged,
//! skipped outcome.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cw_bundle::Bundle;

use crate::content::Content;

/// Which content a plugin wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    Global,
    ContentSpecific(HashSet<String>),
}

impl Applicability {
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Applicability::ContentSpecific(ids.into_iter().map(Into::into).collect())
    }

    pub fn applies_to(&self, content_id: &str) -> bool {
        match self {
            Applicability::Global => true,
            Applicability::ContentSpecific(ids) => ids.contains(content_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Success,
    /// The plugin does not recognize this content; it is treated as not applicable.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    /// The bundle was mutated.
    Success,
    NoOp,
}

/// A content-rewriting extension.
///
/// Hooks run in this order for every World: `initialize`, `verify`, `patch`,
/// `post_patch`. `patch` is skipped unless the plugin applies to the content
/// and verification succeeded; the other hooks always run. `post_disk_write`
/// runs only after the patched bundle has replaced the data file on disk.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn maintainer(&self) -> &str;
    fn version(&self) -> &str;

    fn applicability(&self) -> Applicability;

    /// Record this plugin in `patched_by` and skip content it already patched.
    fn wants_tracking(&self) -> bool {
        false
    }

    /// Suppress the blocklist pass for `content`.
    fn overrides_blocklist(&self, _content: &Content) -> bool {
        false
    }

    fn initialize(&self, _content: &Content) -> anyhow::Result<()> {
        Ok(())
    }

    fn verify(&self, _content: &Content, _bundle: &Bundle) -> anyhow::Result<Verification> {
        Ok(Verification::Success)
    }

    fn patch(&self, content: &Content, bundle: &mut Bundle) -> anyhow::Result<PatchStatus>;

    fn post_patch(&self, _content: &Content) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_disk_write(&self, _content: &Content) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Plugins in registration order.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) -> &mut Self {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        tracing::debug!(
            "Registered plugin {} v{} by {}",
            plugin.name(),
            plugin.version(),
            plugin.maintainer()
        );
        self.plugins.push(plugin);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}

/// Run `f`, converting an error or a panic into a message.
pub(crate) fn catch<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Run one plugin hook inside the isolation boundary.
///
/// Returns `None` if the hook failed or panicked; the failure is logged with
/// the plugin's identity and the content id.
pub(crate) fn isolate<T>(
    plugin: &dyn Plugin,
    hook: &str,
    content: &Content,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> Option<T> {
    match catch(f) {
        Ok(value) => Some(value),
        Err(message) => {
            tracing::error!(
                "Plugin {} v{} (maintainer={}) failed in {} for {}: {}",
                plugin.name(),
                plugin.version(),
                plugin.maintainer(),
                hook,
                content.id,
                message
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
