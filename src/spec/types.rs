use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::registry::{CapabilityTag, PatternDefinition, RegistrySnapshot};

/// Architectural role of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleType {
    Core,
    Integration,
    Supporting,
    Technical,
}

impl ModuleType {
    pub const ALL: [ModuleType; 4] = [
        ModuleType::Core,
        ModuleType::Integration,
        ModuleType::Supporting,
        ModuleType::Technical,
    ];

    /// Parse a module type; matching ignores case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CORE" => Some(ModuleType::Core),
            "INTEGRATION" => Some(ModuleType::Integration),
            "SUPPORTING" => Some(ModuleType::Supporting),
            "TECHNICAL" => Some(ModuleType::Technical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Core => "CORE",
            ModuleType::Integration => "INTEGRATION",
            ModuleType::Supporting => "SUPPORTING",
            ModuleType::Technical => "TECHNICAL",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language of the generated module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Rust,
}

impl Language {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Language::Python),
            "rust" | "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the generated module is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTarget {
    Kubernetes,
    DockerCompose,
    Serverless,
}

impl DeploymentTarget {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "kubernetes" | "k8s" => Some(DeploymentTarget::Kubernetes),
            "docker_compose" | "compose" => Some(DeploymentTarget::DockerCompose),
            "serverless" => Some(DeploymentTarget::Serverless),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentTarget::Kubernetes => "kubernetes",
            DeploymentTarget::DockerCompose => "docker_compose",
            DeploymentTarget::Serverless => "serverless",
        }
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A module request as received from the caller.
///
/// Every field is kept as the caller wrote it; [`crate::spec::validate`] turns
/// it into a [`ValidatedSpec`] or a [`crate::error::ValidationError`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ModuleSpec {
    pub fn new(
        name: impl Into<String>,
        module_type: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            module_type: module_type.into(),
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_extra_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.extra_patterns.push(pattern.into());
        self
    }

    pub fn with_deployment_target(mut self, target: impl Into<String>) -> Self {
        self.deployment_target = Some(target.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A module request that passed validation against one registry snapshot.
///
/// Fields are private: a `ValidatedSpec` can only be obtained from
/// [`crate::spec::validate`], so holding one proves every invariant held.
#[derive(Debug, Clone)]
pub struct ValidatedSpec {
    pub(crate) name: String,
    pub(crate) module_type: ModuleType,
    pub(crate) domain: String,
    pub(crate) language: Language,
    pub(crate) patterns: Vec<Arc<PatternDefinition>>,
    pub(crate) deployment_target: Option<DeploymentTarget>,
    pub(crate) capabilities: BTreeSet<CapabilityTag>,
    pub(crate) registry: Arc<RegistrySnapshot>,
    pub(crate) spec_hash: String,
}

impl ValidatedSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// The primary pattern, if any.
    pub fn pattern(&self) -> Option<&Arc<PatternDefinition>> {
        self.patterns.first()
    }

    /// Primary pattern first, then extra patterns in request order.
    pub fn patterns(&self) -> &[Arc<PatternDefinition>] {
        &self.patterns
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    /// Effective deployment target (requested, or the primary pattern's default).
    pub fn deployment_target(&self) -> Option<DeploymentTarget> {
        self.deployment_target
    }

    /// Union of the capabilities of every requested pattern.
    pub fn capabilities(&self) -> &BTreeSet<CapabilityTag> {
        &self.capabilities
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == tag)
    }

    /// Registry snapshot this spec was validated against.
    pub fn registry(&self) -> &Arc<RegistrySnapshot> {
        &self.registry
    }

    /// SHA-256 over the normalized request, recorded in the manifest.
    pub fn spec_hash(&self) -> &str {
        &self.spec_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_type_parse() {
        assert_eq!(ModuleType::parse("CORE"), Some(ModuleType::Core));
        assert_eq!(ModuleType::parse(" integration "), Some(ModuleType::Integration));
        assert_eq!(ModuleType::parse("Technical"), Some(ModuleType::Technical));
        assert_eq!(ModuleType::parse("DOMAIN"), None);
        assert_eq!(ModuleType::parse(""), None);
    }

    #[test]
    fn test_deployment_target_aliases() {
        assert_eq!(
            DeploymentTarget::parse("docker-compose"),
            Some(DeploymentTarget::DockerCompose)
        );
        assert_eq!(DeploymentTarget::parse("k8s"), Some(DeploymentTarget::Kubernetes));
        assert_eq!(DeploymentTarget::parse("nomad"), None);
    }

    #[test]
    fn test_module_spec_deserialize_uses_type_key() {
        let spec: ModuleSpec = serde_json::from_str(
            r#"{"name":"user-api","type":"CORE","domain":"ecommerce","pattern":"web_api"}"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            ModuleSpec::new("user-api", "CORE", "ecommerce").with_pattern("web_api")
        );
    }

    #[test]
    fn test_module_spec_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<ModuleSpec>(
            r#"{"name":"a","type":"CORE","domain":"d","colour":"red"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&DeploymentTarget::DockerCompose).unwrap(),
            "\"docker_compose\""
        );
        assert_eq!(
            serde_json::to_string(&ModuleType::Supporting).unwrap(),
            "\"SUPPORTING\""
        );
        assert_eq!(serde_json::to_string(&Language::Rust).unwrap(), "\"rust\"");
    }
}
