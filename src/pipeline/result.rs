use serde::Serialize;
use std::path::Path;

use super::request::{GenerationRequest, RequestId};
use super::state::GenerationState;
use crate::error::GenerationError;
use crate::quality::QualityReport;
use crate::tree::{FileOutcome, FileStatus};

/// One generated file in a [`GenerationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub bytes: u64,
    pub checksum: String,
    pub status: FileStatus,
}

impl From<&FileOutcome> for FileReport {
    fn from(outcome: &FileOutcome) -> Self {
        Self {
            path: outcome.path.clone(),
            bytes: outcome.bytes,
            checksum: outcome.checksum.clone(),
            status: outcome.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}

impl From<&GenerationError> for ErrorReport {
    fn from(err: &GenerationError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Structured outcome of one generation request, serialized as the CLI's
/// JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub request_id: RequestId,
    pub success: bool,
    pub module_path: String,
    pub state: GenerationState,
    pub files: Vec<FileReport>,
    pub protected: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<ErrorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    #[serde(skip)]
    rejected: bool,
}

impl GenerationResult {
    pub(crate) fn new(request_id: RequestId, module_path: &Path) -> Self {
        Self {
            request_id,
            success: false,
            module_path: module_path.display().to_string(),
            state: GenerationState::Received,
            files: Vec::new(),
            protected: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            quality: None,
            rejected: false,
        }
    }

    fn failed_with(request_id: RequestId, module_path: &Path, code: &str, message: String) -> Self {
        let mut result = Self::new(request_id, module_path);
        result.state = GenerationState::Failed;
        result.errors.push(ErrorReport {
            code: code.to_string(),
            message,
        });
        result
    }

    /// Result for a request whose generation panicked in a worker.
    pub(crate) fn panicked(request: &GenerationRequest, message: &str) -> Self {
        Self::failed_with(
            request.id,
            &request.module_root,
            "WORKER_PANIC",
            format!("generation of '{}' panicked: {message}", request.spec.name),
        )
    }

    /// Result for a request no worker answered.
    pub(crate) fn lost(request_id: RequestId, module_path: &Path, name: &str) -> Self {
        Self::failed_with(
            request_id,
            module_path,
            "WORKER_LOST",
            format!("no worker produced a result for '{name}'"),
        )
    }

    /// Record a failure, flattening collected errors into separate entries.
    pub(crate) fn push_error(&mut self, err: GenerationError) {
        let rejection = err.is_rejection();
        if self.errors.is_empty() {
            self.rejected = rejection;
        } else {
            self.rejected &= rejection;
        }
        self.errors
            .extend(err.flatten().iter().map(ErrorReport::from));
    }

    /// `0` success, `1` rejected before any side effect, `2` generation or
    /// quality failure.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else if self.rejected {
            1
        } else {
            2
        }
    }

    pub fn error_codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }

    pub fn file(&self, path: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollisionError, ValidationError};

    #[test]
    fn test_exit_codes() {
        let mut result = GenerationResult::new(RequestId::new(), Path::new("/out/a"));
        result.push_error(ValidationError::EmptyDomain.into());
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.error_codes(), vec!["EMPTY_DOMAIN"]);

        let mut result = GenerationResult::new(RequestId::new(), Path::new("/out/a"));
        result.push_error(
            CollisionError::NonEmptyRoot {
                root: "/out/a".into(),
            }
            .into(),
        );
        assert_eq!(result.exit_code(), 2);

        let mut result = GenerationResult::new(RequestId::new(), Path::new("/out/a"));
        result.success = true;
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_serializes_without_internal_fields() {
        let result = GenerationResult::new(RequestId::new(), Path::new("/out/a"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["state"], "RECEIVED");
        assert_eq!(json["success"], false);
        assert!(json.get("rejected").is_none());
        assert!(json.get("quality").is_none());
    }
}
