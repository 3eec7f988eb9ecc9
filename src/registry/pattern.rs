use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::spec::{DeploymentTarget, ModuleType};

/// A capability a pattern brings to a module (`container`, `http_server`,
/// `event_bus`, ...). Templates select on these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityTag(String);

impl CapabilityTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Container resource requests and limits for a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceProfile {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

/// An environment variable a pattern injects into generated manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A regex that must match inside one generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuralCheck {
    /// Output path relative to the module root
    pub path: String,
    /// Regular expression searched for in the file content (multi-line mode)
    pub pattern: String,
    pub description: String,
}

/// A named, reusable infrastructure profile.
///
/// Definitions are immutable once loaded; a reload builds a fresh
/// [`super::RegistrySnapshot`] instead of mutating existing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub includes: BTreeSet<CapabilityTag>,
    pub resource_profile: ResourceProfile,
    #[serde(default)]
    pub incompatible_types: BTreeSet<ModuleType>,
    #[serde(default)]
    pub incompatible_patterns: BTreeSet<String>,
    /// Supported targets; the first one is the default
    pub deployment_targets: Vec<DeploymentTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub structural_checks: Vec<StructuralCheck>,
}

/// Outcome of a pattern/type compatibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compatibility {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Compatibility {
    pub fn compatible() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn excluded(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

impl PatternDefinition {
    /// Compatibility is a denylist: every type is accepted unless the
    /// pattern explicitly excludes it.
    pub fn compatibility_with(&self, module_type: ModuleType) -> Compatibility {
        if self.incompatible_types.contains(&module_type) {
            Compatibility::excluded(format!(
                "pattern '{}' declares {} as an incompatible module type",
                self.name, module_type
            ))
        } else {
            Compatibility::compatible()
        }
    }

    /// True if either pattern excludes the other.
    pub fn conflicts_with(&self, other: &PatternDefinition) -> bool {
        self.incompatible_patterns.contains(&other.name)
            || other.incompatible_patterns.contains(&self.name)
    }

    pub fn supports_target(&self, target: DeploymentTarget) -> bool {
        self.deployment_targets.contains(&target)
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.includes.iter().any(|c| c.as_str() == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(name: &str) -> PatternDefinition {
        PatternDefinition {
            name: name.to_string(),
            description: String::new(),
            includes: BTreeSet::from([CapabilityTag::from("container")]),
            resource_profile: ResourceProfile {
                cpu_request: "100m".into(),
                cpu_limit: "200m".into(),
                memory_request: "64Mi".into(),
                memory_limit: "128Mi".into(),
                replicas: 1,
            },
            incompatible_types: BTreeSet::new(),
            incompatible_patterns: BTreeSet::new(),
            deployment_targets: vec![DeploymentTarget::Kubernetes],
            port: None,
            env: Vec::new(),
            structural_checks: Vec::new(),
        }
    }

    #[test]
    fn test_denylist_compatibility() {
        let mut p = pattern("batch_job");
        for t in ModuleType::ALL {
            assert!(p.compatibility_with(t).ok);
        }
        p.incompatible_types.insert(ModuleType::Core);
        let result = p.compatibility_with(ModuleType::Core);
        assert!(!result.ok);
        assert!(result.reason.unwrap().contains("CORE"));
        assert!(p.compatibility_with(ModuleType::Technical).ok);
    }

    #[test]
    fn test_conflicts_are_symmetric() {
        let mut a = pattern("a");
        let b = pattern("b");
        assert!(!a.conflicts_with(&b));
        a.incompatible_patterns.insert("b".into());
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }
}
