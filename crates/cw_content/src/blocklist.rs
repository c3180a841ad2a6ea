//! Per-content blocklist rules.
//!
//! A [`RuleSet`] is loaded from a JSON document keyed by content id:
//!
//! ```json
//! {
//!   "wrld_4f1c": [
//!     { "name": "strip-portals", "classId": 114, "fieldEquals": { "m_Name": "Portal" } },
//!     { "name": "drop-scripts", "classId": 115 }
//!   ]
//! }
//! ```
//!
//! A rule removes every record matching all of its criteria. A rule that
//! matches nothing is reported as unmatched rather than failing.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use anyhow::bail;
use camino::Utf8Path;
use cw_bundle::{Bundle, Record};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_equals: BTreeMap<String, String>,
}

impl BlockRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_id: None,
            field_equals: BTreeMap::new(),
        }
    }

    pub fn with_class(mut self, class_id: u32) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_equals.insert(name.into(), value.into());
        self
    }

    fn has_criteria(&self) -> bool {
        self.class_id.is_some() || !self.field_equals.is_empty()
    }

    fn matches(&self, record: &Record) -> bool {
        if self.class_id.is_some_and(|class_id| class_id != record.class_id) {
            return false;
        }
        self.field_equals
            .iter()
            .all(|(field, value)| record.str_field(field) == Some(value.as_str()))
    }
}

/// Result of applying one rule to a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub mutated: bool,
    /// Names of targets the rule could not find.
    pub unmatched: Vec<String>,
}

/// The blocklist contract the pipeline depends on.
pub trait Blocklist: Send + Sync {
    fn rules_for(&self, content_id: &str) -> Vec<BlockRule>;

    fn apply(&self, rule: &BlockRule, bundle: &mut Bundle) -> anyhow::Result<RuleOutcome>;
}

/// Rules keyed by content id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: HashMap<String, Vec<BlockRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = fs::read_to_string(path.as_std_path())?;
        let set: RuleSet = serde_json::from_str(&contents)?;
        tracing::info!(
            "Loaded blocklist from {} ({} content ids, {} rules)",
            path,
            set.rules.len(),
            set.rule_count()
        );
        Ok(set)
    }

    pub fn with_rules(mut self, content_id: impl Into<String>, rules: Vec<BlockRule>) -> Self {
        self.rules.entry(content_id.into()).or_default().extend(rules);
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Blocklist for RuleSet {
    fn rules_for(&self, content_id: &str) -> Vec<BlockRule> {
        self.rules.get(content_id).cloned().unwrap_or_default()
    }

    fn apply(&self, rule: &BlockRule, bundle: &mut Bundle) -> anyhow::Result<RuleOutcome> {
        if !rule.has_criteria() {
            bail!("rule '{}' has no match criteria", rule.name);
        }

        let removed = bundle.retain_records(|record| !rule.matches(record));
        let unmatched = if removed == 0 {
            vec![rule.name.clone()]
        } else {
            Vec::new()
        };

        tracing::debug!("Blocklist rule {} removed {} records", rule.name, removed);
        Ok(RuleOutcome {
            mutated: removed > 0,
            unmatched,
        })
    }
}
