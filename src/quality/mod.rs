//! # Quality Gate
//!
//! Post-generation checks over a materialized module root. Failures are
//! reported, never hidden: the gate only reads, so a failing module stays on
//! disk for inspection.
//!
//! ## Checks Performed
//!
//! 1. **Required files** - every binding marked `required` exists
//! 2. **Syntax** - each generated file with a known type parses:
//!
//!    | File                     | Checker                                   |
//!    |--------------------------|-------------------------------------------|
//!    | `*.py`                   | `rustpython_parser`, parsed as a module   |
//!    | `*.rs`                   | `syn::parse_file`                         |
//!    | `*.json`                 | `serde_json`                              |
//!    | `*.yaml`, `*.yml`        | `serde_yaml`, every document              |
//!    | `*.toml`                 | `toml`                                    |
//!    | `Dockerfile`             | known instructions, `FROM`/`ARG` first    |
//!
//! 3. **Structural assertions** - each pattern's `structural_checks` regex
//!    must match inside its file, when that file is part of the module
//!
//! Only generated paths are inspected; unrelated files in the root are not
//! the generator's concern.

mod syntax;

pub use syntax::{FileKind, SyntaxIssue};

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{QualityError, ResolutionError};
use crate::render::RenderEngine;
use crate::resolver::{Resolution, TemplateResolver};
use crate::spec::ValidatedSpec;
use crate::templates::TemplateCatalog;
use crate::tree::normalize_relative;

/// Severity level for quality issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the gate
    Error,
    /// Reported only
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingFile,
    Syntax,
    Structure,
    Unreadable,
}

/// One finding, tied to the file it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    /// Path relative to the module root
    pub file: String,
    pub kind: IssueKind,
    pub message: String,
}

impl QualityIssue {
    pub fn new(
        severity: Severity,
        file: impl Into<String>,
        kind: IssueKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            file: file.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.file, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityReport {
    pub passed: bool,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    fn from_issues(mut issues: Vec<QualityIssue>) -> Self {
        issues.sort_by(|a, b| (a.severity, &a.file).cmp(&(b.severity, &b.file)));
        Self {
            passed: !issues.iter().any(|i| i.severity == Severity::Error),
            issues,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Files with at least one error, sorted and deduplicated.
    pub fn failed_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.errors().map(|i| i.file.as_str()).collect();
        files.dedup();
        files
    }

    /// `None` when the gate passed.
    pub fn to_error(&self) -> Option<QualityError> {
        if self.passed {
            return None;
        }
        let errors: Vec<String> = self.errors().map(ToString::to_string).collect();
        Some(QualityError {
            errors: errors.len(),
            summary: errors.join("; "),
        })
    }
}

/// Checks a module root against the bindings it was generated from.
pub struct QualityGate<'a> {
    catalog: &'a TemplateCatalog,
    engine: &'a RenderEngine,
}

impl<'a> QualityGate<'a> {
    pub fn new(catalog: &'a TemplateCatalog, engine: &'a RenderEngine) -> Self {
        Self { catalog, engine }
    }

    /// Resolve `spec` and check `root` against the result.
    pub fn validate(&self, root: &Path, spec: &ValidatedSpec) -> Result<QualityReport, ResolutionError> {
        let resolution = TemplateResolver::new(self.catalog, self.engine).resolve(spec)?;
        Ok(validate_resolution(root, spec, &resolution))
    }
}

/// Check `root` against an existing resolution.
pub fn validate_resolution(root: &Path, spec: &ValidatedSpec, resolution: &Resolution) -> QualityReport {
    let mut issues = Vec::new();

    for binding in &resolution.bindings {
        let relative = &binding.resolved_output_path;
        let path = root.join(relative);
        let content = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let severity = if binding.required() {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                issues.push(QualityIssue::new(
                    severity,
                    relative.clone(),
                    IssueKind::MissingFile,
                    format!("generated file from template '{}' is missing", binding.template_id),
                ));
                continue;
            }
            Err(e) => {
                issues.push(QualityIssue::new(
                    Severity::Error,
                    relative.clone(),
                    IssueKind::Unreadable,
                    e.to_string(),
                ));
                continue;
            }
        };

        let Some(kind) = FileKind::detect(relative) else {
            continue;
        };
        let text = match String::from_utf8(content) {
            Ok(text) => text,
            Err(_) => {
                issues.push(QualityIssue::new(
                    Severity::Error,
                    relative.clone(),
                    IssueKind::Syntax,
                    "file is not valid UTF-8",
                ));
                continue;
            }
        };
        if let Err(issue) = kind.check(&text) {
            issues.push(QualityIssue::new(
                Severity::Error,
                relative.clone(),
                IssueKind::Syntax,
                format!("{kind:?} syntax error: {issue}"),
            ));
        }
    }

    let generated = resolution.paths();
    for pattern in spec.patterns() {
        for check in &pattern.structural_checks {
            let Some(relative) = normalize_relative(&check.path) else {
                continue;
            };
            if !generated.contains(&relative) {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(root.join(&relative)) else {
                // missing or unreadable files were reported above
                continue;
            };
            let regex = match RegexBuilder::new(&check.pattern).multi_line(true).build() {
                Ok(regex) => regex,
                Err(e) => {
                    warn!(pattern = %pattern.name, error = %e, "Structural check does not compile");
                    continue;
                }
            };
            if !regex.is_match(&text) {
                issues.push(QualityIssue::new(
                    Severity::Error,
                    relative.clone(),
                    IssueKind::Structure,
                    format!(
                        "pattern '{}' requires {} (/{}/)",
                        pattern.name, check.description, check.pattern
                    ),
                ));
            }
        }
    }

    let report = QualityReport::from_issues(issues);
    debug!(
        root = %root.display(),
        passed = report.passed,
        issues = report.issues.len(),
        "Quality gate finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_passes_with_warnings_only() {
        let report = QualityReport::from_issues(vec![QualityIssue::new(
            Severity::Warning,
            "pytest.ini",
            IssueKind::MissingFile,
            "missing",
        )]);
        assert!(report.passed);
        assert!(report.to_error().is_none());
    }

    #[test]
    fn test_report_names_failed_files() {
        let report = QualityReport::from_issues(vec![
            QualityIssue::new(Severity::Error, "b.py", IssueKind::Syntax, "x"),
            QualityIssue::new(Severity::Warning, "c.py", IssueKind::MissingFile, "y"),
            QualityIssue::new(Severity::Error, "a.py", IssueKind::Syntax, "z"),
            QualityIssue::new(Severity::Error, "a.py", IssueKind::Structure, "w"),
        ]);
        assert!(!report.passed);
        assert_eq!(report.failed_files(), vec!["a.py", "b.py"]);
        let err = report.to_error().unwrap();
        assert_eq!(err.errors, 3);
        assert!(err.summary.contains("[error] a.py"));
    }
}
