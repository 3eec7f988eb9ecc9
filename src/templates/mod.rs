//! # Template Catalog
//!
//! Templates are data: a catalog file (`catalog.yaml`) lists every template
//! with its output path, its selector ([`AppliesTo`]) and its priority, and
//! points at a body file rendered by [`crate::render::RenderEngine`].
//!
//! A catalog is built into the binary (the `templates/` directory of this
//! crate). An external catalog directory with the same layout replaces it
//! entirely:
//!
//! ```text
//! my-templates/
//! ├── catalog.yaml
//! └── python/service.py.j2
//! ```
//!
//! ```yaml
//! version: "2024.1"
//! templates:
//!   - id: python/service
//!     output: "src/{{ module_snake }}/service.py"
//!     source: python/service.py.j2
//!     applies_to: { languages: [python] }
//!     required: true
//! ```
//!
//! The catalog version label (`"{version}+{hash}"`) includes the first 16 hex
//! characters of a SHA-256 over the catalog and every body, so any template
//! edit changes the `template_version` recorded in generation manifests.

mod builtin;
mod model;

pub use model::{AppliesTo, Template, DEFAULT_GROUP};

use model::CatalogFile;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::debug;

use crate::error::RegistryError;
use crate::render;

pub const CATALOG_FILE: &str = "catalog.yaml";

/// An immutable, versioned set of templates.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    version: String,
    source: String,
    templates: Vec<Arc<Template>>,
}

impl TemplateCatalog {
    /// The catalog embedded in the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml_with(builtin::CATALOG, "builtin templates", |source| {
            builtin::source(source).map(str::to_string).ok_or_else(|| {
                RegistryError::InvalidTemplate {
                    template_id: source.to_string(),
                    message: "body file is not part of the built-in catalog".to_string(),
                }
            })
        })
    }

    /// Load `catalog.yaml` and its body files from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, RegistryError> {
        let catalog_path = dir.join(CATALOG_FILE);
        let label = catalog_path.display().to_string();
        let yaml = std::fs::read_to_string(&catalog_path).map_err(|source| RegistryError::Read {
            source_label: label.clone(),
            source,
        })?;

        Self::from_yaml_with(&yaml, &label, |relative| {
            if !is_plain_relative(relative) {
                return Err(RegistryError::InvalidTemplate {
                    template_id: relative.to_string(),
                    message: "source must be a relative path inside the catalog directory"
                        .to_string(),
                });
            }
            let path = dir.join(relative);
            std::fs::read_to_string(&path).map_err(|source| RegistryError::Read {
                source_label: path.display().to_string(),
                source,
            })
        })
    }

    /// Parse a catalog whose entries use inline `content` only.
    pub fn from_yaml_str(yaml: &str, label: &str) -> Result<Self, RegistryError> {
        Self::from_yaml_with(yaml, label, |source| {
            Err(RegistryError::InvalidTemplate {
                template_id: source.to_string(),
                message: "source files are not available for an in-memory catalog".to_string(),
            })
        })
    }

    fn from_yaml_with<F>(yaml: &str, label: &str, read_source: F) -> Result<Self, RegistryError>
    where
        F: Fn(&str) -> Result<String, RegistryError>,
    {
        let file: CatalogFile = serde_yaml::from_str(yaml).map_err(|e| RegistryError::Parse {
            source_label: label.to_string(),
            message: e.to_string(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());

        let mut ids = BTreeSet::new();
        let mut templates = Vec::with_capacity(file.templates.len());
        for (index, entry) in file.templates.into_iter().enumerate() {
            let invalid = |message: &str| RegistryError::InvalidTemplate {
                template_id: entry.id.clone(),
                message: message.to_string(),
            };

            if entry.id.trim().is_empty() {
                return Err(invalid("id must not be empty"));
            }
            if !ids.insert(entry.id.clone()) {
                return Err(invalid("id is declared more than once"));
            }
            if entry.output.trim().is_empty() {
                return Err(invalid("output path must not be empty"));
            }

            let body = match (&entry.source, &entry.content) {
                (Some(source), None) => read_source(source)?,
                (None, Some(content)) => content.clone(),
                _ => return Err(invalid("exactly one of `source` or `content` is required")),
            };

            for source in [&entry.output, &body] {
                render::check_source(&entry.id, source).map_err(|e| {
                    RegistryError::InvalidTemplate {
                        template_id: entry.id.clone(),
                        message: e.to_string(),
                    }
                })?;
            }

            hasher.update(entry.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(body.as_bytes());
            hasher.update([0u8]);

            templates.push(Arc::new(Template {
                id: entry.id,
                output_path_template: entry.output,
                content_template: body,
                applies_to: entry.applies_to,
                priority: entry.priority,
                group: entry.group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
                required: entry.required,
                regenerable: entry.regenerable,
                time_varying: entry.time_varying,
                declaration_index: index,
            }));
        }

        let hash: String = hasher
            .finalize()
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect();
        let version = format!("{}+{}", file.version.trim(), hash);

        debug!(
            source = %label,
            version = %version,
            templates = templates.len(),
            "Template catalog loaded"
        );

        Ok(Self {
            version,
            source: label.to_string(),
            templates,
        })
    }

    /// Version label recorded as `template_version` in manifests.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Templates in declaration order.
    pub fn templates(&self) -> &[Arc<Template>] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Template>> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// A copy of this catalog with `template` appended (or replacing the
    /// template with the same id). The version label changes accordingly.
    pub fn with_template(&self, template: Template) -> Self {
        let mut templates: Vec<Arc<Template>> = self
            .templates
            .iter()
            .filter(|t| t.id != template.id)
            .cloned()
            .collect();
        let mut template = template;
        template.declaration_index = templates
            .iter()
            .map(|t| t.declaration_index + 1)
            .max()
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        hasher.update(template.id.as_bytes());
        hasher.update(template.output_path_template.as_bytes());
        hasher.update(template.content_template.as_bytes());
        let suffix: String = hasher
            .finalize()
            .iter()
            .take(4)
            .map(|b| format!("{b:02x}"))
            .collect();

        templates.push(Arc::new(template));
        Self {
            version: format!("{}.{}", self.version, suffix),
            source: self.source.clone(),
            templates,
        }
    }
}

fn is_plain_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = TemplateCatalog::builtin().unwrap();
        assert!(catalog.len() >= 20);
        assert!(catalog.version().contains('+'));
        let service = catalog.get("python/service").unwrap();
        assert!(service.required);
        assert!(!service.is_overlay());
        let docker = catalog.get("infra/dockerfile-python").unwrap();
        assert!(docker.is_overlay());
    }

    #[test]
    fn test_builtin_version_is_stable() {
        let a = TemplateCatalog::builtin().unwrap();
        let b = TemplateCatalog::builtin().unwrap();
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn test_inline_catalog_rejects_disallowed_constructs() {
        let yaml = r#"
version: "1"
templates:
  - id: bad
    output: out.txt
    content: "{% include 'other' %}"
"#;
        let err = TemplateCatalog::from_yaml_str(yaml, "inline").unwrap_err();
        assert!(err.to_string().contains("include"));
    }

    #[test]
    fn test_inline_catalog_rejects_duplicate_ids_and_missing_body() {
        let yaml = r#"
version: "1"
templates:
  - { id: a, output: a.txt, content: "a" }
  - { id: a, output: b.txt, content: "b" }
"#;
        assert!(TemplateCatalog::from_yaml_str(yaml, "inline")
            .unwrap_err()
            .to_string()
            .contains("more than once"));

        let yaml = "version: \"1\"\ntemplates:\n  - { id: a, output: a.txt }\n";
        assert!(TemplateCatalog::from_yaml_str(yaml, "inline")
            .unwrap_err()
            .to_string()
            .contains("exactly one"));
    }

    #[test]
    fn test_from_dir_rejects_escaping_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CATALOG_FILE),
            "version: \"1\"\ntemplates:\n  - { id: a, output: a.txt, source: ../secret }\n",
        )
        .unwrap();
        let err = TemplateCatalog::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("relative path"));
    }

    #[test]
    fn test_with_template_replaces_and_changes_version() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let mut template = (**catalog.get("python/types").unwrap()).clone();
        template.content_template = "x = (\n".to_string();
        let patched = catalog.with_template(template);
        assert_eq!(patched.len(), catalog.len());
        assert_ne!(patched.version(), catalog.version());
        assert_eq!(
            patched.get("python/types").unwrap().content_template,
            "x = (\n"
        );
    }
}
