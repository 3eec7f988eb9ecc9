//! # Generator Configuration
//!
//! Environment-driven settings for the generation engine. Every value has a
//! default, so `GeneratorConfig::from_env()` never fails; unparsable values
//! fall back to the default.
//!
//! ## Environment Variables
//!
//! | Variable                    | Meaning                                  | Default         |
//! |-----------------------------|------------------------------------------|-----------------|
//! | `MODFORGE_PATTERNS`         | pattern definition file (YAML/JSON)      | built-in        |
//! | `MODFORGE_TEMPLATES`        | template catalog directory               | built-in        |
//! | `MODFORGE_WORKERS`          | worker coroutines for wave generation    | `4`             |
//! | `MODFORGE_STAGE_TIMEOUT_MS` | per-stage time budget                    | `10000`         |
//! | `MODFORGE_RENDER_FUEL`      | minijinja fuel per template              | `50000`         |
//! | `MODFORGE_STACK_SIZE`       | coroutine stack size (decimal or `0x..`) | `0x40000`       |
//!
//! ```bash
//! export MODFORGE_WORKERS=8
//! export MODFORGE_STACK_SIZE=0x80000
//! modforge wave --requests wave.yaml
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RENDER_FUEL: u64 = 50_000;
/// Rendering and syntax checks recurse; 256 KB keeps `syn` comfortable.
pub const DEFAULT_STACK_SIZE: usize = 0x40000;

/// Runtime configuration for the generator and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// External pattern file; `None` uses the built-in patterns
    pub patterns_path: Option<PathBuf>,
    /// External template catalog directory; `None` uses the built-in catalog
    pub templates_dir: Option<PathBuf>,
    pub workers: usize,
    pub stage_timeout: Duration,
    pub render_fuel: u64,
    pub stack_size: usize,
}

impl GeneratorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup (used by tests so
    /// they never mutate the process environment).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let workers = non_empty("MODFORGE_WORKERS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WORKERS);

        let stage_timeout_ms = non_empty("MODFORGE_STAGE_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_STAGE_TIMEOUT_MS);

        let render_fuel = non_empty("MODFORGE_RENDER_FUEL")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RENDER_FUEL);

        let stack_size = non_empty("MODFORGE_STACK_SIZE")
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);

        Self {
            patterns_path: non_empty("MODFORGE_PATTERNS").map(PathBuf::from),
            templates_dir: non_empty("MODFORGE_TEMPLATES").map(PathBuf::from),
            workers,
            stage_timeout: Duration::from_millis(stage_timeout_ms),
            render_fuel,
            stack_size,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            patterns_path: None,
            templates_dir: None,
            workers: DEFAULT_WORKERS,
            stage_timeout: Duration::from_millis(DEFAULT_STAGE_TIMEOUT_MS),
            render_fuel: DEFAULT_RENDER_FUEL,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Parse a byte size given in decimal or `0x` hexadecimal.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GeneratorConfig::from_lookup(lookup(&[]));
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_values_from_environment() {
        let config = GeneratorConfig::from_lookup(lookup(&[
            ("MODFORGE_PATTERNS", "/etc/modforge/patterns.yaml"),
            ("MODFORGE_WORKERS", "8"),
            ("MODFORGE_STAGE_TIMEOUT_MS", "250"),
            ("MODFORGE_RENDER_FUEL", "1000"),
            ("MODFORGE_STACK_SIZE", "0x8000"),
        ]));
        assert_eq!(
            config.patterns_path,
            Some(PathBuf::from("/etc/modforge/patterns.yaml"))
        );
        assert_eq!(config.templates_dir, None);
        assert_eq!(config.workers, 8);
        assert_eq!(config.stage_timeout, Duration::from_millis(250));
        assert_eq!(config.render_fuel, 1000);
        assert_eq!(config.stack_size, 0x8000);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = GeneratorConfig::from_lookup(lookup(&[
            ("MODFORGE_WORKERS", "0"),
            ("MODFORGE_STAGE_TIMEOUT_MS", "soon"),
            ("MODFORGE_STACK_SIZE", "0xZZ"),
            ("MODFORGE_TEMPLATES", "  "),
        ]));
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(
            config.stage_timeout,
            Duration::from_millis(DEFAULT_STAGE_TIMEOUT_MS)
        );
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.templates_dir, None);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("0x4000"), Some(0x4000));
        assert_eq!(parse_size("0X10"), Some(16));
        assert_eq!(parse_size("lots"), None);
    }
}
