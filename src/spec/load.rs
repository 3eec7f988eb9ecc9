use std::path::Path;

use serde::Deserialize;

use super::types::ModuleSpec;
use crate::error::ValidationError;

/// Request document formats accepted by [`parse_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFormat {
    Json,
    Yaml,
}

impl RequestFormat {
    /// `.json` files are JSON; anything else is treated as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RequestFormat::Json,
            _ => RequestFormat::Yaml,
        }
    }
}

/// Parse one module request.
pub fn parse_request(content: &str, format: RequestFormat) -> Result<ModuleSpec, ValidationError> {
    let parsed = match format {
        RequestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        RequestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ValidationError::MalformedRequest { message })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WaveDocument {
    List(Vec<ModuleSpec>),
    Keyed { modules: Vec<ModuleSpec> },
}

/// Parse a wave document: either a bare list of requests or `{modules: [...]}`.
pub fn parse_wave(content: &str, format: RequestFormat) -> Result<Vec<ModuleSpec>, ValidationError> {
    let parsed: Result<WaveDocument, String> = match format {
        RequestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        RequestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
    };
    match parsed {
        Ok(WaveDocument::List(specs)) | Ok(WaveDocument::Keyed { modules: specs }) => Ok(specs),
        Err(message) => Err(ValidationError::MalformedRequest { message }),
    }
}

/// Read and parse a request file. Read failures are reported as malformed
/// requests so the caller sees a single error family for bad input.
pub fn load_request(path: &Path) -> Result<ModuleSpec, ValidationError> {
    let content = read(path)?;
    parse_request(&content, RequestFormat::from_path(path))
}

pub fn load_wave(path: &Path) -> Result<Vec<ModuleSpec>, ValidationError> {
    let content = read(path)?;
    parse_wave(&content, RequestFormat::from_path(path))
}

fn read(path: &Path) -> Result<String, ValidationError> {
    std::fs::read_to_string(path).map_err(|e| ValidationError::MalformedRequest {
        message: format!("cannot read {}: {e}", path.display()),
    })
}
