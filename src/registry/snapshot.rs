use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::pattern::{Compatibility, PatternDefinition};
use crate::checksum;
use crate::error::RegistryError;
use crate::spec::ModuleType;

const BUILTIN_PATTERNS: &str = include_str!("../../patterns/default.yaml");

#[allow(clippy::expect_used)]
static PATTERN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("pattern name regex is valid"));

/// Version identifier for a registry snapshot.
///
/// Combines a monotonic counter with the first 16 hex characters of the
/// SHA-256 of the source bytes, so two loads of identical content still get
/// distinct versions while the hash identifies the content itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryVersion {
    pub version: u64,
    pub hash: String,
}

impl RegistryVersion {
    pub fn new(version: u64, hash: impl Into<String>) -> Self {
        Self {
            version,
            hash: hash.into(),
        }
    }

    pub fn from_content(version: u64, content: &[u8]) -> Self {
        Self {
            version,
            hash: checksum::short_hash(content),
        }
    }
}

impl fmt::Display for RegistryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.hash)
    }
}

/// Where pattern definitions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSource {
    /// The pattern file embedded in the binary
    Builtin,
    /// A YAML or JSON file on disk
    File(PathBuf),
    /// In-memory content (tests, programmatic callers)
    Inline { label: String, content: String },
}

impl PatternSource {
    pub fn label(&self) -> String {
        match self {
            PatternSource::Builtin => "builtin patterns".to_string(),
            PatternSource::File(path) => path.display().to_string(),
            PatternSource::Inline { label, .. } => label.clone(),
        }
    }

    fn read(&self) -> Result<String, RegistryError> {
        match self {
            PatternSource::Builtin => Ok(BUILTIN_PATTERNS.to_string()),
            PatternSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
                    source_label: self.label(),
                    source,
                })
            }
            PatternSource::Inline { content, .. } => Ok(content.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternFile {
    patterns: Vec<PatternDefinition>,
}

/// An immutable set of pattern definitions.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    version: RegistryVersion,
    source: String,
    patterns: BTreeMap<String, Arc<PatternDefinition>>,
}

impl RegistrySnapshot {
    /// Read, parse and validate `source` into a snapshot numbered `version`.
    pub fn load(source: &PatternSource, version: u64) -> Result<Self, RegistryError> {
        let content = source.read()?;
        Self::parse(&content, &source.label(), version)
    }

    /// Parse pattern definitions from YAML (JSON is accepted as a YAML subset).
    pub fn parse(content: &str, label: &str, version: u64) -> Result<Self, RegistryError> {
        let file: PatternFile =
            serde_yaml::from_str(content).map_err(|e| RegistryError::Parse {
                source_label: label.to_string(),
                message: e.to_string(),
            })?;

        let mut patterns = BTreeMap::new();
        for pattern in file.patterns {
            check_definition(&pattern)?;
            if patterns.contains_key(&pattern.name) {
                return Err(RegistryError::InvalidPattern {
                    pattern: pattern.name.clone(),
                    message: "defined more than once".to_string(),
                });
            }
            patterns.insert(pattern.name.clone(), Arc::new(pattern));
        }

        for pattern in patterns.values() {
            if let Some(unknown) = pattern
                .incompatible_patterns
                .iter()
                .find(|other| !patterns.contains_key(*other))
            {
                return Err(RegistryError::InvalidPattern {
                    pattern: pattern.name.clone(),
                    message: format!("incompatible_patterns references unknown pattern '{unknown}'"),
                });
            }
        }

        Ok(Self {
            version: RegistryVersion::from_content(version, content.as_bytes()),
            source: label.to_string(),
            patterns,
        })
    }

    pub fn version(&self) -> &RegistryVersion {
        &self.version
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn get(&self, name: &str) -> Option<Arc<PatternDefinition>> {
        self.patterns.get(name).cloned()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<PatternDefinition>, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
            version: self.version.to_string(),
        })
    }

    pub fn compatibility_check(
        &self,
        pattern: &str,
        module_type: ModuleType,
    ) -> Result<Compatibility, RegistryError> {
        Ok(self.lookup(pattern)?.compatibility_with(module_type))
    }

    /// Pattern names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PatternDefinition>> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn check_definition(pattern: &PatternDefinition) -> Result<(), RegistryError> {
    let invalid = |message: String| RegistryError::InvalidPattern {
        pattern: pattern.name.clone(),
        message,
    };

    if !PATTERN_NAME_RE.is_match(&pattern.name) {
        return Err(invalid("name must match ^[a-z][a-z0-9_]{0,62}$".to_string()));
    }
    if pattern.incompatible_patterns.contains(&pattern.name) {
        return Err(invalid("lists itself in incompatible_patterns".to_string()));
    }
    if pattern.deployment_targets.is_empty() {
        return Err(invalid("declares no deployment_targets".to_string()));
    }
    let unique: BTreeSet<_> = pattern.deployment_targets.iter().collect();
    if unique.len() != pattern.deployment_targets.len() {
        return Err(invalid("repeats a deployment target".to_string()));
    }

    let profile = &pattern.resource_profile;
    for (field, value) in [
        ("cpu_request", &profile.cpu_request),
        ("cpu_limit", &profile.cpu_limit),
        ("memory_request", &profile.memory_request),
        ("memory_limit", &profile.memory_limit),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(format!("resource_profile.{field} is empty")));
        }
    }
    if profile.replicas == 0 {
        return Err(invalid("resource_profile.replicas must be at least 1".to_string()));
    }

    let mut env_names = BTreeSet::new();
    for var in &pattern.env {
        if var.name.trim().is_empty() || !env_names.insert(var.name.as_str()) {
            return Err(invalid(format!("env entry '{}' is empty or repeated", var.name)));
        }
    }

    for check in &pattern.structural_checks {
        if let Err(e) = Regex::new(&check.pattern) {
            return Err(invalid(format!(
                "structural check for '{}' has an invalid regex: {e}",
                check.path
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DeploymentTarget;

    #[test]
    fn test_builtin_patterns_load() {
        let snapshot = RegistrySnapshot::load(&PatternSource::Builtin, 1).unwrap();
        let names: Vec<_> = snapshot.names().collect();
        assert_eq!(
            names,
            vec!["batch_job", "event_processor", "ml_inference", "web_api"]
        );
        let web = snapshot.lookup("web_api").unwrap();
        assert_eq!(web.resource_profile.cpu_limit, "500m");
        assert_eq!(web.deployment_targets[0], DeploymentTarget::Kubernetes);
        assert_eq!(snapshot.version().version, 1);
        assert_eq!(snapshot.version().hash.len(), 16);
    }

    #[test]
    fn test_lookup_unknown_pattern() {
        let snapshot = RegistrySnapshot::load(&PatternSource::Builtin, 3).unwrap();
        let err = snapshot.lookup("grpc_gateway").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
        assert!(err.to_string().contains("3:"));
    }

    #[test]
    fn test_compatibility_check_via_snapshot() {
        let snapshot = RegistrySnapshot::load(&PatternSource::Builtin, 1).unwrap();
        assert!(!snapshot
            .compatibility_check("batch_job", ModuleType::Core)
            .unwrap()
            .ok);
        assert!(snapshot
            .compatibility_check("batch_job", ModuleType::Technical)
            .unwrap()
            .ok);
    }

    fn inline(yaml: &str) -> Result<RegistrySnapshot, RegistryError> {
        RegistrySnapshot::load(
            &PatternSource::Inline {
                label: "inline".into(),
                content: yaml.into(),
            },
            1,
        )
    }

    const PROFILE: &str = "resource_profile: {cpu_request: 100m, cpu_limit: 200m, memory_request: 64Mi, memory_limit: 128Mi}";

    #[test]
    fn test_rejects_self_incompatibility() {
        let yaml = format!(
            "patterns:\n  - name: loop\n    {PROFILE}\n    deployment_targets: [kubernetes]\n    incompatible_patterns: [loop]\n"
        );
        let err = inline(&yaml).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }

    #[test]
    fn test_rejects_duplicates_and_missing_targets() {
        let yaml = format!(
            "patterns:\n  - name: a\n    {PROFILE}\n    deployment_targets: [kubernetes]\n  - name: a\n    {PROFILE}\n    deployment_targets: [kubernetes]\n"
        );
        assert!(inline(&yaml).unwrap_err().to_string().contains("more than once"));

        let yaml = format!("patterns:\n  - name: a\n    {PROFILE}\n    deployment_targets: []\n");
        assert!(inline(&yaml).unwrap_err().to_string().contains("deployment_targets"));
    }

    #[test]
    fn test_rejects_bad_structural_regex_and_unknown_reference() {
        let yaml = format!(
            "patterns:\n  - name: a\n    {PROFILE}\n    deployment_targets: [kubernetes]\n    structural_checks:\n      - {{path: x.yaml, pattern: '(', description: broken}}\n"
        );
        assert!(inline(&yaml).unwrap_err().to_string().contains("invalid regex"));

        let yaml = format!(
            "patterns:\n  - name: a\n    {PROFILE}\n    deployment_targets: [kubernetes]\n    incompatible_patterns: [ghost]\n"
        );
        assert!(inline(&yaml).unwrap_err().to_string().contains("ghost"));
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = inline("patterns: [").unwrap_err();
        assert_eq!(err.code(), "REGISTRY_PARSE");
        assert!(err.to_string().contains("inline"));
    }
}
