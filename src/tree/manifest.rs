use serde::{Deserialize, Serialize};
use std::path::Path;

use super::MANIFEST_FILE;
use crate::error::IoError;

/// One generated file as recorded in `.generation-manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    /// `sha256:<hex>` of the bytes written
    pub checksum: String,
    pub regenerable: bool,
}

/// Persisted record of a generation, read back by MERGE.
///
/// ```json
/// {
///   "template_version": "1.0.0+3f2a9c0d4e5b6a71",
///   "generator_version": "0.1.0",
///   "registry_version": "v1:9b1c2d3e4f5a6b7c",
///   "spec_hash": "sha256:...",
///   "files": [
///     { "path": "Dockerfile", "checksum": "sha256:...", "regenerable": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub template_version: String,
    #[serde(default)]
    pub generator_version: String,
    #[serde(default)]
    pub registry_version: String,
    pub spec_hash: String,
    pub files: Vec<ManifestEntry>,
}

impl GenerationManifest {
    pub fn new(
        template_version: impl Into<String>,
        registry_version: impl Into<String>,
        spec_hash: impl Into<String>,
    ) -> Self {
        Self {
            template_version: template_version.into(),
            generator_version: crate::GENERATOR_VERSION.to_string(),
            registry_version: registry_version.into(),
            spec_hash: spec_hash.into(),
            files: Vec::new(),
        }
    }

    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|e| e.path == path)
    }

    /// Sort entries by path and drop duplicates (last one wins).
    pub(crate) fn normalize(&mut self) {
        self.files.reverse();
        let mut seen = std::collections::BTreeSet::new();
        self.files.retain(|e| seen.insert(e.path.clone()));
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Read the manifest from a module root.
    ///
    /// `Ok(None)` when the root has no manifest. A manifest that exists but
    /// does not parse is an error; callers decide whether to tolerate it.
    pub fn read(root: &Path) -> Result<Option<Self>, IoError> {
        let path = root.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IoError::fs("read", path, e)),
        };
        serde_json::from_str(&content).map(Some).map_err(|e| {
            IoError::fs(
                "parse",
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    pub fn to_json(&self) -> Result<String, IoError> {
        serde_json::to_string_pretty(self)
            .map(|mut json| {
                json.push('\n');
                json
            })
            .map_err(|e| {
                IoError::fs(
                    "serialize",
                    MANIFEST_FILE,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            })
    }
}
