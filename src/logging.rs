//! Structured logging setup
//!
//! All pipeline stages emit `tracing` events; this module installs the
//! subscriber. Output goes to stderr (stdout is reserved for the JSON
//! `GenerationResult`) or, when `MODFORGE_LOG_FILE` is set, to a file through
//! `tracing-appender`'s non-blocking writer.
//!
//! | Variable                | Values                        | Default  |
//! |-------------------------|-------------------------------|----------|
//! | `MODFORGE_LOG_LEVEL`    | trace/debug/info/warn/error   | `warn`   |
//! | `MODFORGE_LOG_FORMAT`   | json/pretty                   | `pretty` |
//! | `MODFORGE_LOG_FILE`     | path of a log file            | unset    |
//! | `MODFORGE_LOG_LOCATION` | `true` to include file:line   | `false`  |
//!
//! `RUST_LOG` still takes precedence over `MODFORGE_LOG_LEVEL` when set.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for machines, pretty-print for terminals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Write logs to this file instead of stderr
    pub file: Option<PathBuf>,
    /// Include file:line location
    pub include_location: bool,
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("MODFORGE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
            format: LogFormat::parse(
                &env::var("MODFORGE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            ),
            file: env::var("MODFORGE_LOG_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            include_location: env::var("MODFORGE_LOG_LOCATION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Raise verbosity for `--verbose` on the CLI.
    pub fn verbose(mut self) -> Self {
        self.log_level = "debug".to_string();
        self
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            format: LogFormat::Pretty,
            file: None,
            include_location: false,
        }
    }
}

/// Install the global subscriber.
///
/// Returns the appender guard when logging to a file; keep it alive until
/// exit so buffered lines are flushed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level().as_str()));

    let (writer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file path {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (non_blocking, Some(guard))
        }
        None => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
            (non_blocking, Some(guard))
        }
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_level_mapping() {
        let mut config = LogConfig::default();
        assert_eq!(config.level(), Level::WARN);
        config.log_level = "TRACE".into();
        assert_eq!(config.level(), Level::TRACE);
        assert_eq!(config.verbose().level(), Level::DEBUG);
    }
}
