use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::registry::CapabilityTag;
use crate::spec::{DeploymentTarget, Language, ModuleType, ValidatedSpec};

pub const DEFAULT_GROUP: &str = "base";

/// Selector deciding which specs a template applies to.
///
/// Every non-empty set is a filter; an empty set matches anything.
/// `capabilities` is all-of, the other sets are any-of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppliesTo {
    pub types: BTreeSet<ModuleType>,
    pub patterns: BTreeSet<String>,
    pub languages: BTreeSet<Language>,
    pub deployment_targets: BTreeSet<DeploymentTarget>,
    pub capabilities: BTreeSet<CapabilityTag>,
}

impl AppliesTo {
    pub fn matches(&self, spec: &ValidatedSpec) -> bool {
        if !self.types.is_empty() && !self.types.contains(&spec.module_type()) {
            return false;
        }
        if !self.languages.is_empty() && !self.languages.contains(&spec.language()) {
            return false;
        }
        if !self.patterns.is_empty()
            && !spec.patterns().iter().any(|p| self.patterns.contains(&p.name))
        {
            return false;
        }
        if !self.deployment_targets.is_empty() {
            match spec.deployment_target() {
                Some(target) if self.deployment_targets.contains(&target) => {}
                _ => return false,
            }
        }
        self.capabilities
            .iter()
            .all(|tag| spec.capabilities().contains(tag))
    }

    /// Overlays are templates contributed by patterns (selected by pattern,
    /// capability or deployment target). Everything else is a type default.
    pub fn is_overlay(&self) -> bool {
        !self.patterns.is_empty()
            || !self.capabilities.is_empty()
            || !self.deployment_targets.is_empty()
    }
}

/// A template: data describing one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub id: String,
    /// minijinja source for the output path (relative to the module root)
    pub output_path_template: String,
    /// minijinja source for the file content
    #[serde(skip)]
    pub content_template: String,
    pub applies_to: AppliesTo,
    pub priority: i32,
    /// Declared set this template belongs to; equal-priority ties are only
    /// resolvable inside one group
    pub group: String,
    /// The quality gate requires this file to exist
    pub required: bool,
    /// MERGE may overwrite this file when it is unedited
    pub regenerable: bool,
    /// Output depends on the clock (`generated_at` is in scope)
    pub time_varying: bool,
    /// Position in the catalog; later declarations win equal-priority ties
    #[serde(skip)]
    pub declaration_index: usize,
}

impl Template {
    pub fn is_overlay(&self) -> bool {
        self.applies_to.is_overlay()
    }
}

/// Catalog file entry as written in `catalog.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TemplateEntry {
    pub id: String,
    pub output: String,
    /// Template body file, relative to the catalog directory
    #[serde(default)]
    pub source: Option<String>,
    /// Inline template body
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub applies_to: AppliesTo,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub regenerable: bool,
    #[serde(default)]
    pub time_varying: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogFile {
    pub version: String,
    pub templates: Vec<TemplateEntry>,
}
