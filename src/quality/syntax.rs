use rustpython_parser::{ast, Parse};
use serde::Deserialize;
use std::fmt;

/// A syntax problem found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based line, 0 when the checker cannot tell
    pub line: usize,
    pub message: String,
}

impl SyntaxIssue {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// File kinds with a syntax check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Python,
    Rust,
    Json,
    Yaml,
    Toml,
    Dockerfile,
}

impl FileKind {
    /// Pick a checker from the file name; `None` means the file is not
    /// checked.
    pub fn detect(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name == "Dockerfile" || name.starts_with("Dockerfile.") {
            return Some(FileKind::Dockerfile);
        }
        let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;
        match extension {
            "py" => Some(FileKind::Python),
            "rs" => Some(FileKind::Rust),
            "json" => Some(FileKind::Json),
            "yaml" | "yml" => Some(FileKind::Yaml),
            "toml" => Some(FileKind::Toml),
            _ => None,
        }
    }

    pub fn check(&self, source: &str) -> Result<(), SyntaxIssue> {
        match self {
            FileKind::Python => check_python(source),
            FileKind::Rust => syn::parse_file(source)
                .map(|_| ())
                .map_err(|e| SyntaxIssue::new(0, e.to_string())),
            FileKind::Json => serde_json::from_str::<serde_json::Value>(source)
                .map(|_| ())
                .map_err(|e| SyntaxIssue::new(e.line(), e.to_string())),
            FileKind::Yaml => check_yaml(source),
            FileKind::Toml => toml::from_str::<toml::Table>(source)
                .map(|_| ())
                .map_err(|e| SyntaxIssue::new(0, e.message().to_string())),
            FileKind::Dockerfile => check_dockerfile(source),
        }
    }
}

fn check_python(source: &str) -> Result<(), SyntaxIssue> {
    ast::Suite::parse(source, "<module>")
        .map(|_| ())
        .map_err(|e| {
            let offset: usize = e.offset.into();
            SyntaxIssue::new(line_of_offset(source, offset), e.error.to_string())
        })
}

/// 1-based line holding byte `offset`; offsets past the end land on the last line.
fn line_of_offset(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

fn check_yaml(source: &str) -> Result<(), SyntaxIssue> {
    for document in serde_yaml::Deserializer::from_str(source) {
        serde_yaml::Value::deserialize(document).map_err(|e| {
            let line = e.location().map(|l| l.line()).unwrap_or(0);
            SyntaxIssue::new(line, e.to_string())
        })?;
    }
    Ok(())
}

const DOCKER_INSTRUCTIONS: &[&str] = &[
    "ADD", "ARG", "CMD", "COPY", "ENTRYPOINT", "ENV", "EXPOSE", "FROM", "HEALTHCHECK", "LABEL",
    "MAINTAINER", "ONBUILD", "RUN", "SHELL", "STOPSIGNAL", "USER", "VOLUME", "WORKDIR",
];

fn check_dockerfile(source: &str) -> Result<(), SyntaxIssue> {
    let mut seen_instruction = false;
    let mut continued = false;
    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        let number = index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if continued {
            continued = line.ends_with('\\');
            continue;
        }
        continued = line.ends_with('\\');

        let instruction = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if !DOCKER_INSTRUCTIONS.contains(&instruction.as_str()) {
            return Err(SyntaxIssue::new(
                number,
                format!("unknown instruction '{instruction}'"),
            ));
        }
        if !seen_instruction && instruction != "FROM" && instruction != "ARG" {
            return Err(SyntaxIssue::new(
                number,
                "the first instruction must be FROM or ARG",
            ));
        }
        seen_instruction = true;
    }
    if !seen_instruction {
        return Err(SyntaxIssue::new(0, "no instructions"));
    }
    if continued {
        return Err(SyntaxIssue::new(0, "file ends with a line continuation"));
    }
    Ok(())
}
