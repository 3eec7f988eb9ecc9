use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::types::{DeploymentTarget, Language, ModuleSpec, ModuleType, ValidatedSpec};
use crate::checksum;
use crate::error::ValidationError;
use crate::registry::{PatternDefinition, RegistrySnapshot};

#[allow(clippy::expect_used)]
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,62}$").expect("module name regex is valid"));

/// True if `name` is a valid module name (filesystem and orchestrator safe).
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Validate a raw request against one registry snapshot.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. name format
/// 2. type membership
/// 3. non-empty domain
/// 4. language
/// 5. every requested pattern exists, is not repeated, is compatible with the
///    type and with every other requested pattern
/// 6. deployment target is known and supported by every requested pattern
///
/// Nothing here touches the filesystem.
pub fn validate(
    raw: &ModuleSpec,
    registry: &Arc<RegistrySnapshot>,
) -> Result<ValidatedSpec, ValidationError> {
    if !is_valid_name(&raw.name) {
        return Err(ValidationError::InvalidName {
            name: raw.name.clone(),
        });
    }

    let module_type =
        ModuleType::parse(&raw.module_type).ok_or_else(|| ValidationError::UnknownType {
            value: raw.module_type.clone(),
        })?;

    let domain = raw.domain.trim();
    if domain.is_empty() {
        return Err(ValidationError::EmptyDomain);
    }

    let language = match raw.language.as_deref() {
        None => Language::default(),
        Some(value) => Language::parse(value).ok_or_else(|| ValidationError::UnknownLanguage {
            value: value.to_string(),
        })?,
    };

    let patterns = resolve_patterns(raw, module_type, registry)?;
    let deployment_target = resolve_target(raw.deployment_target.as_deref(), &patterns)?;

    let capabilities = patterns
        .iter()
        .flat_map(|p| p.includes.iter().cloned())
        .collect::<BTreeSet<_>>();

    let spec_hash = spec_hash(
        &raw.name,
        module_type,
        domain,
        language,
        &patterns,
        deployment_target,
    );

    debug!(
        module = %raw.name,
        module_type = %module_type,
        patterns = ?patterns.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        registry_version = %registry.version(),
        "Module request validated"
    );

    Ok(ValidatedSpec {
        name: raw.name.clone(),
        module_type,
        domain: domain.to_string(),
        language,
        patterns,
        deployment_target,
        capabilities,
        registry: Arc::clone(registry),
        spec_hash,
    })
}

fn resolve_patterns(
    raw: &ModuleSpec,
    module_type: ModuleType,
    registry: &RegistrySnapshot,
) -> Result<Vec<Arc<PatternDefinition>>, ValidationError> {
    let requested: Vec<&str> = raw
        .pattern
        .iter()
        .chain(raw.extra_patterns.iter())
        .map(|p| p.trim())
        .collect();

    // Without a primary pattern the first extra pattern acts as primary.
    let mut resolved: Vec<Arc<PatternDefinition>> = Vec::with_capacity(requested.len());
    for name in requested {
        if resolved.iter().any(|p| p.name == name) {
            return Err(ValidationError::DuplicatePattern {
                pattern: name.to_string(),
            });
        }
        let pattern = registry
            .get(name)
            .ok_or_else(|| ValidationError::UnknownPattern {
                pattern: name.to_string(),
            })?;

        let compatibility = pattern.compatibility_with(module_type);
        if !compatibility.ok {
            return Err(ValidationError::IncompatiblePatternType {
                pattern: pattern.name.clone(),
                module_type: module_type.to_string(),
                reason: compatibility.reason.unwrap_or_default(),
            });
        }

        if let Some(other) = resolved.iter().find(|p| p.conflicts_with(&pattern)) {
            return Err(ValidationError::IncompatiblePatterns {
                pattern: pattern.name.clone(),
                other: other.name.clone(),
            });
        }
        resolved.push(pattern);
    }
    Ok(resolved)
}

fn resolve_target(
    requested: Option<&str>,
    patterns: &[Arc<PatternDefinition>],
) -> Result<Option<DeploymentTarget>, ValidationError> {
    let target = match requested {
        Some(value) => DeploymentTarget::parse(value).ok_or_else(|| {
            ValidationError::UnknownDeploymentTarget {
                target: value.to_string(),
            }
        })?,
        // the primary pattern's first target, held to the same check below
        None => match patterns.first().and_then(|p| p.deployment_targets.first()) {
            Some(target) => *target,
            None => return Ok(None),
        },
    };

    if patterns.is_empty() {
        return Err(ValidationError::DeploymentTargetWithoutPattern {
            target: target.to_string(),
        });
    }

    if let Some(unsupported) = patterns.iter().find(|p| !p.supports_target(target)) {
        return Err(ValidationError::UnsupportedDeploymentTarget {
            target: target.to_string(),
            pattern: unsupported.name.clone(),
        });
    }
    Ok(Some(target))
}

#[derive(Serialize)]
struct NormalizedSpec<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    module_type: ModuleType,
    domain: &'a str,
    language: Language,
    patterns: Vec<&'a str>,
    deployment_target: Option<DeploymentTarget>,
}

fn spec_hash(
    name: &str,
    module_type: ModuleType,
    domain: &str,
    language: Language,
    patterns: &[Arc<PatternDefinition>],
    deployment_target: Option<DeploymentTarget>,
) -> String {
    let normalized = NormalizedSpec {
        name,
        module_type,
        domain,
        language,
        patterns: patterns.iter().map(|p| p.name.as_str()).collect(),
        deployment_target,
    };
    // Serializing a struct of plain strings and enums cannot fail.
    let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
    checksum::sha256(&bytes)
}
