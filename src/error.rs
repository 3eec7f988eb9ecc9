//! # Error Taxonomy
//!
//! Every stage of the generation pipeline fails with its own typed error. Each
//! error carries a stable machine-readable code (e.g. `INVALID_NAME`) so the
//! CLI and other callers can branch on it without parsing messages.
//!
//! | Error              | Raised by            | Side effects on failure            |
//! |--------------------|----------------------|------------------------------------|
//! | [`ValidationError`]| spec validation      | none (zero I/O)                    |
//! | [`RegistryError`]  | pattern/catalog load | none                               |
//! | [`ResolutionError`]| template resolution  | none                               |
//! | [`RenderError`]    | render engine        | staging discarded                  |
//! | [`CollisionError`] | file tree builder    | target untouched                   |
//! | [`IoError`]        | file tree builder    | staging discarded, target restored |
//! | [`QualityError`]   | quality gate         | files kept on disk                 |
//!
//! The engine never retries internally; retry policy belongs to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed or inconsistent module request. Always raised before any
/// filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request could not be parsed: {message}")]
    MalformedRequest { message: String },

    #[error("invalid module name '{name}': must match ^[a-z][a-z0-9-]{{0,62}}$")]
    InvalidName { name: String },

    #[error("unknown module type '{value}' (expected CORE, INTEGRATION, SUPPORTING or TECHNICAL)")]
    UnknownType { value: String },

    #[error("domain must not be empty")]
    EmptyDomain,

    #[error("unknown language '{value}' (expected python or rust)")]
    UnknownLanguage { value: String },

    #[error("unknown pattern '{pattern}'")]
    UnknownPattern { pattern: String },

    #[error("pattern '{pattern}' is listed more than once")]
    DuplicatePattern { pattern: String },

    #[error("pattern '{pattern}' cannot be used with module type {module_type}: {reason}")]
    IncompatiblePatternType {
        pattern: String,
        module_type: String,
        reason: String,
    },

    #[error("pattern '{pattern}' cannot be combined with pattern '{other}'")]
    IncompatiblePatterns { pattern: String, other: String },

    #[error("deployment target '{target}' is not supported by pattern '{pattern}'")]
    UnsupportedDeploymentTarget { target: String, pattern: String },

    #[error("unknown deployment target '{target}' (expected kubernetes, docker_compose or serverless)")]
    UnknownDeploymentTarget { target: String },

    #[error("deployment target '{target}' requires a pattern")]
    DeploymentTargetWithoutPattern { target: String },
}

impl ValidationError {
    /// Stable error code for this validation failure
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            ValidationError::InvalidName { .. } => "INVALID_NAME",
            ValidationError::UnknownType { .. } => "UNKNOWN_TYPE",
            ValidationError::EmptyDomain => "EMPTY_DOMAIN",
            ValidationError::UnknownLanguage { .. } => "UNKNOWN_LANGUAGE",
            ValidationError::UnknownPattern { .. } => "UNKNOWN_PATTERN",
            ValidationError::DuplicatePattern { .. } => "DUPLICATE_PATTERN",
            ValidationError::IncompatiblePatternType { .. } => "INCOMPATIBLE_PATTERN_TYPE",
            ValidationError::IncompatiblePatterns { .. } => "INCOMPATIBLE_PATTERNS",
            ValidationError::UnsupportedDeploymentTarget { .. }
            | ValidationError::UnknownDeploymentTarget { .. }
            | ValidationError::DeploymentTargetWithoutPattern { .. } => {
                "UNSUPPORTED_DEPLOYMENT_TARGET"
            }
        }
    }
}

/// Problems loading or querying pattern definitions and template catalogs.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("pattern '{name}' not found in registry version {version}")]
    NotFound { name: String, version: String },

    #[error("failed to read {source_label}: {source}")]
    Read {
        source_label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {source_label}: {message}")]
    Parse {
        source_label: String,
        message: String,
    },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid template '{template_id}': {message}")]
    InvalidTemplate {
        template_id: String,
        message: String,
    },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "UNKNOWN_PATTERN",
            RegistryError::Read { .. } => "REGISTRY_READ",
            RegistryError::Parse { .. } => "REGISTRY_PARSE",
            RegistryError::InvalidPattern { .. } => "INVALID_PATTERN",
            RegistryError::InvalidTemplate { .. } => "INVALID_TEMPLATE",
        }
    }
}

/// The template set for a spec could not be turned into an unambiguous list
/// of bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("ambiguous template set for '{path}': {candidates:?} share layer and priority")]
    Ambiguous {
        path: String,
        candidates: Vec<String>,
    },

    #[error("template '{template_id}' resolves to unsafe output path '{path}'")]
    UnsafeOutputPath { template_id: String, path: String },

    #[error("output path of template '{template_id}' failed to render: {source}")]
    PathRender {
        template_id: String,
        #[source]
        source: RenderError,
    },

    #[error("no templates apply to a {module_type} module in {language}")]
    EmptyTemplateSet {
        module_type: String,
        language: String,
    },
}

impl ResolutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionError::Ambiguous { .. } => "AMBIGUOUS_TEMPLATE_SET",
            ResolutionError::UnsafeOutputPath { .. } => "UNSAFE_OUTPUT_PATH",
            ResolutionError::PathRender { .. } => "PATH_RENDER_FAILED",
            ResolutionError::EmptyTemplateSet { .. } => "EMPTY_TEMPLATE_SET",
        }
    }
}

/// A template could not be rendered against its context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("template '{template_id}' references an undefined variable: {detail}")]
    UndefinedVariable { template_id: String, detail: String },

    #[error("template '{template_id}' has a syntax error: {detail}")]
    Syntax { template_id: String, detail: String },

    #[error("template '{template_id}' uses disallowed construct '{construct}'")]
    Disallowed {
        template_id: String,
        construct: String,
    },

    #[error("rendering '{template_id}' exceeded its budget: {detail}")]
    Timeout { template_id: String, detail: String },

    #[error("template '{template_id}' failed to render: {detail}")]
    Failed { template_id: String, detail: String },
}

impl RenderError {
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::UndefinedVariable { .. } => "UNDEFINED_VARIABLE",
            RenderError::Syntax { .. } => "TEMPLATE_SYNTAX",
            RenderError::Disallowed { .. } => "DISALLOWED_CONSTRUCT",
            RenderError::Timeout { .. } => "RENDER_TIMEOUT",
            RenderError::Failed { .. } => "RENDER_FAILED",
        }
    }

    pub fn template_id(&self) -> &str {
        match self {
            RenderError::UndefinedVariable { template_id, .. }
            | RenderError::Syntax { template_id, .. }
            | RenderError::Disallowed { template_id, .. }
            | RenderError::Timeout { template_id, .. }
            | RenderError::Failed { template_id, .. } => template_id,
        }
    }
}

/// The module root is occupied, or another generation holds it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollisionError {
    #[error("module root {root} already contains files")]
    NonEmptyRoot { root: PathBuf },

    #[error("module root {root} is locked by another generation ({lock})")]
    Locked { root: PathBuf, lock: PathBuf },

    #[error("module root {root} exists and is not a directory")]
    NotADirectory { root: PathBuf },
}

impl CollisionError {
    pub fn code(&self) -> &'static str {
        match self {
            CollisionError::NonEmptyRoot { .. } => "TARGET_EXISTS",
            CollisionError::Locked { .. } => "TARGET_LOCKED",
            CollisionError::NotADirectory { .. } => "TARGET_NOT_DIRECTORY",
        }
    }
}

/// Filesystem failures while staging or swapping a module tree.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("{op} {path}: {source}")]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output path '{path}' escapes the module root")]
    PathEscape { path: String },

    #[error("module root {root} has no usable parent directory")]
    InvalidRoot { root: PathBuf },

    #[error("{stage} exceeded its time budget of {limit_ms}ms")]
    Timeout { stage: &'static str, limit_ms: u64 },
}

impl IoError {
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IoError::Fs {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            IoError::Fs { .. } => "IO_ERROR",
            IoError::PathEscape { .. } => "PATH_ESCAPE",
            IoError::InvalidRoot { .. } => "INVALID_ROOT",
            IoError::Timeout { .. } => "IO_TIMEOUT",
        }
    }
}

/// The generated tree failed post-generation checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("quality gate failed with {errors} error(s): {summary}")]
pub struct QualityError {
    pub errors: usize,
    pub summary: String,
}

/// Any failure of a generation request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Collision(#[from] CollisionError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Quality(#[from] QualityError),

    #[error("generation cancelled")]
    Cancelled,

    /// Several independent failures collected by a fail-complete stage.
    #[error("{} errors, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Multiple(Vec<GenerationError>),
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Validation(e) => e.code(),
            GenerationError::Registry(e) => e.code(),
            GenerationError::Resolution(e) => e.code(),
            GenerationError::Render(e) => e.code(),
            GenerationError::Collision(e) => e.code(),
            GenerationError::Io(e) => e.code(),
            GenerationError::Quality(_) => "QUALITY_FAILED",
            GenerationError::Cancelled => "CANCELLED",
            GenerationError::Multiple(errors) => {
                errors.first().map(|e| e.code()).unwrap_or("MULTIPLE")
            }
        }
    }

    /// True when the request was rejected before any side effect
    /// (exit code 1 on the CLI).
    pub fn is_rejection(&self) -> bool {
        match self {
            GenerationError::Validation(_) | GenerationError::Registry(_) => true,
            GenerationError::Multiple(errors) => errors.iter().all(|e| e.is_rejection()),
            _ => false,
        }
    }

    /// Wrap a list of collected errors, unwrapping the single-error case.
    pub fn collect(mut errors: Vec<GenerationError>) -> Self {
        if errors.len() == 1 {
            if let Some(only) = errors.pop() {
                return only;
            }
        }
        GenerationError::Multiple(errors)
    }

    /// Flatten nested [`GenerationError::Multiple`] into individual errors.
    pub fn flatten(self) -> Vec<GenerationError> {
        match self {
            GenerationError::Multiple(errors) => {
                errors.into_iter().flat_map(GenerationError::flatten).collect()
            }
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes_are_stable() {
        assert_eq!(
            ValidationError::InvalidName { name: "X".into() }.code(),
            "INVALID_NAME"
        );
        assert_eq!(
            ValidationError::UnknownType { value: "x".into() }.code(),
            "UNKNOWN_TYPE"
        );
        assert_eq!(
            ValidationError::IncompatiblePatternType {
                pattern: "batch_job".into(),
                module_type: "CORE".into(),
                reason: "excluded".into(),
            }
            .code(),
            "INCOMPATIBLE_PATTERN_TYPE"
        );
        assert_eq!(
            ValidationError::DeploymentTargetWithoutPattern {
                target: "kubernetes".into()
            }
            .code(),
            "UNSUPPORTED_DEPLOYMENT_TARGET"
        );
    }

    #[test]
    fn test_collect_unwraps_single_error() {
        let err = GenerationError::collect(vec![GenerationError::Cancelled]);
        assert!(matches!(err, GenerationError::Cancelled));

        let err = GenerationError::collect(vec![
            GenerationError::Cancelled,
            RenderError::Failed {
                template_id: "a".into(),
                detail: "boom".into(),
            }
            .into(),
        ]);
        assert_eq!(err.code(), "CANCELLED");
        assert_eq!(err.flatten().len(), 2);
    }

    #[test]
    fn test_rejection_classification() {
        let err: GenerationError = ValidationError::EmptyDomain.into();
        assert!(err.is_rejection());

        let err: GenerationError = CollisionError::NonEmptyRoot {
            root: PathBuf::from("/tmp/x"),
        }
        .into();
        assert!(!err.is_rejection());
    }
}
