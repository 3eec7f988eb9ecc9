//! # Render Engine
//!
//! Deterministic rendering of template bodies and output paths with
//! [minijinja](https://docs.rs/minijinja).
//!
//! ## Sandbox
//!
//! Templates may substitute variables, branch with `if` and iterate with
//! `for` over collections already present in the context. Everything that
//! could reach outside the template or loop without bound is rejected by
//! [`check_source`] before minijinja ever sees the source:
//!
//! | Construct                              | Why it is rejected               |
//! |----------------------------------------|----------------------------------|
//! | `include`, `import`, `from`, `extends` | loads other templates            |
//! | `macro`, `call`, `block`               | user-defined callables/layouts   |
//! | `for ... recursive`, `loop(...)`       | recursion                        |
//! | `range(...)`                           | open-ended iteration             |
//!
//! On top of that every render runs with a fuel budget
//! ([`crate::config::DEFAULT_RENDER_FUEL`]); running out of fuel is reported
//! as [`RenderError::Timeout`].
//!
//! ## Strictness
//!
//! The environment uses [`UndefinedBehavior::Strict`]: referencing a variable
//! that is not in the [`RenderContext`] fails with
//! [`RenderError::UndefinedVariable`] instead of rendering an empty string.
//!
//! ## Filters
//!
//! Built-in `upper`, `lower`, `join` and `length`, plus:
//!
//! | Filter       | Example                                 |
//! |--------------|-----------------------------------------|
//! | `snake`      | `user-api` → `user_api`                 |
//! | `pascal`     | `user-api` → `UserApi`                  |
//! | `kebab`      | `User Api` → `user-api`                 |
//! | `yaml_quote` | `500m` → `"500m"`                       |

mod context;

pub use context::{quote, to_kebab, to_pascal, to_snake, to_title, RenderContext};

use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DEFAULT_RENDER_FUEL;
use crate::error::RenderError;
use crate::templates::Template;
use context::normalize_newlines;

/// Source of `generated_at` for time-varying templates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant, for reproducible output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Parse an RFC 3339 timestamp such as `2024-01-01T00:00:00Z`.
    pub fn parse(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self(DateTime::parse_from_rfc3339(rfc3339)?.with_timezone(&Utc)))
    }

    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Format a clock reading the way templates see it.
pub fn timestamp(clock: &dyn Clock) -> String {
    clock.now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

const DISALLOWED_TAGS: &[&str] = &[
    "include", "import", "from", "extends", "macro", "call", "block",
];

#[allow(clippy::expect_used)]
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{%[-+]?\s*([A-Za-z_]+)(.*?)[-+]?%\}|\{\{[-+]?(.*?)[-+]?\}\}")
        .expect("tag regex is valid")
});

#[allow(clippy::expect_used)]
static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(range|loop)\s*\(").expect("call regex is valid")
});

#[allow(clippy::expect_used)]
static RECURSIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\brecursive\b").expect("recursive regex is valid"));

/// Reject sources that use constructs outside the sandbox.
///
/// Only the inside of `{% %}` and `{{ }}` tags is inspected, so literal text
/// such as Python's `range(10)` in a generated file is fine.
pub fn check_source(template_id: &str, source: &str) -> Result<(), RenderError> {
    let disallowed = |construct: &str| RenderError::Disallowed {
        template_id: template_id.to_string(),
        construct: construct.to_string(),
    };

    for caps in TAG_RE.captures_iter(source) {
        if let Some(keyword) = caps.get(1) {
            let keyword = keyword.as_str();
            if DISALLOWED_TAGS.contains(&keyword) {
                return Err(disallowed(keyword));
            }
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if keyword == "for" && RECURSIVE_RE.is_match(rest) {
                return Err(disallowed("recursive"));
            }
            if let Some(call) = CALL_RE.captures(rest).and_then(|c| c.get(1)) {
                return Err(disallowed(call.as_str()));
            }
        } else if let Some(expr) = caps.get(3) {
            if let Some(call) = CALL_RE.captures(expr.as_str()).and_then(|c| c.get(1)) {
                return Err(disallowed(call.as_str()));
            }
        }
    }
    Ok(())
}

/// Renders template bodies and output paths.
///
/// The engine is immutable after construction and can be shared across
/// worker coroutines behind an `Arc`.
pub struct RenderEngine {
    env: Environment<'static>,
    fuel: u64,
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine").field("fuel", &self.fuel).finish()
    }
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_FUEL)
    }
}

impl RenderEngine {
    pub fn new(fuel: u64) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_fuel(Some(fuel));
        env.add_filter("snake", |value: String| to_snake(&value));
        env.add_filter("pascal", |value: String| to_pascal(&value));
        env.add_filter("kebab", |value: String| to_kebab(&value));
        env.add_filter("yaml_quote", |value: Value| {
            match value.as_str() {
                Some(s) => quote(s),
                None => quote(&value.to_string()),
            }
        });
        Self { env, fuel }
    }

    pub fn fuel(&self) -> u64 {
        self.fuel
    }

    /// Render a template body.
    ///
    /// `generated_at` is added to the context only when the template is
    /// marked time-varying.
    pub fn render(
        &self,
        template: &Template,
        context: &RenderContext,
        clock: &dyn Clock,
    ) -> Result<String, RenderError> {
        if template.time_varying {
            let stamped = context.with_generated_at(&timestamp(clock));
            self.render_str(&template.id, &template.content_template, &stamped)
        } else {
            self.render_str(&template.id, &template.content_template, context)
        }
    }

    /// Render a template's output path (relative to the module root).
    pub fn render_path(
        &self,
        template: &Template,
        context: &RenderContext,
    ) -> Result<String, RenderError> {
        let rendered = self.render_str(&template.id, &template.output_path_template, context)?;
        Ok(rendered.trim().to_string())
    }

    /// Render an arbitrary source string under the sandbox.
    pub fn render_str(
        &self,
        template_id: &str,
        source: &str,
        context: &RenderContext,
    ) -> Result<String, RenderError> {
        check_source(template_id, source)?;
        let rendered = self
            .env
            .render_named_str(template_id, source, context.value())
            .map_err(|e| map_error(template_id, &e))?;
        Ok(normalize_newlines(&rendered))
    }
}

fn map_error(template_id: &str, err: &minijinja::Error) -> RenderError {
    let detail = match err.line() {
        Some(line) => format!("{} (line {line})", err.kind()),
        None => err.kind().to_string(),
    };
    let detail = match err.detail() {
        Some(extra) => format!("{detail}: {extra}"),
        None => detail,
    };
    let template_id = template_id.to_string();
    match err.kind() {
        ErrorKind::UndefinedError => RenderError::UndefinedVariable {
            template_id,
            detail,
        },
        ErrorKind::SyntaxError => RenderError::Syntax {
            template_id,
            detail,
        },
        ErrorKind::OutOfFuel => RenderError::Timeout {
            template_id,
            detail,
        },
        _ => RenderError::Failed {
            template_id,
            detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RenderContext {
        RenderContext::from_value(json!({
            "module_name": "user-api",
            "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}],
            "cpu": "500m",
            "port": null,
        }))
    }

    #[test]
    fn test_render_substitutes_and_filters() {
        let engine = RenderEngine::default();
        let out = engine
            .render_str(
                "t",
                "{{ module_name | snake }} {{ module_name | pascal }} {{ cpu | yaml_quote }}",
                &ctx(),
            )
            .unwrap();
        assert_eq!(out, "user_api UserApi \"500m\"");
    }

    #[test]
    fn test_render_iterates_finite_collections() {
        let engine = RenderEngine::default();
        let out = engine
            .render_str(
                "t",
                "{% for var in env %}\n{{ var.name }}={{ var.value }}\n{% endfor %}\n",
                &ctx(),
            )
            .unwrap();
        assert_eq!(out, "A=1\nB=2\n");
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let engine = RenderEngine::default();
        let err = engine.render_str("t", "{{ missing }}", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::UndefinedVariable { .. }), "{err:?}");
        assert_eq!(err.template_id(), "t");
    }

    #[test]
    fn test_syntax_error() {
        let engine = RenderEngine::default();
        let err = engine.render_str("t", "{% if %}", &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { .. }), "{err:?}");
    }

    #[test]
    fn test_disallowed_constructs() {
        for (source, construct) in [
            ("{% include 'x' %}", "include"),
            ("{% import 'x' as y %}", "import"),
            ("{% extends 'base' %}", "extends"),
            ("{% macro m() %}{% endmacro %}", "macro"),
            ("{% for i in range(3) %}{% endfor %}", "range"),
            ("{{ range(3) | length }}", "range"),
            ("{% for x in env recursive %}{{ loop(x) }}{% endfor %}", "recursive"),
            ("{%+ include 'x' %}", "include"),
            ("{%- extends 'base' +%}", "extends"),
            ("{%+ for i in range(9999999) %}{% endfor %}", "range"),
            ("{{+ range(3) | length +}}", "range"),
            ("{{- range(3) | length -}}", "range"),
        ] {
            match check_source("t", source) {
                Err(RenderError::Disallowed { construct: c, .. }) => assert_eq!(c, construct),
                other => panic!("{source}: expected Disallowed, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_literal_text_is_not_scanned() {
        assert!(check_source("t", "for i in range(10):\n    import os\n").is_ok());
    }

    #[test]
    fn test_fuel_exhaustion_is_timeout() {
        let engine = RenderEngine::new(20);
        let ctx = RenderContext::from_value(json!({ "items": (0..500).collect::<Vec<_>>() }));
        let err = engine
            .render_str("t", "{% for i in items %}{{ i }}{% endfor %}", &ctx)
            .unwrap_err();
        assert!(matches!(err, RenderError::Timeout { .. }), "{err:?}");
    }

    #[test]
    fn test_time_varying_templates_see_the_clock() {
        let engine = RenderEngine::default();
        let clock = FixedClock::parse("2024-05-01T12:00:00Z").unwrap();
        let mut template = Template {
            id: "guide".into(),
            output_path_template: "GUIDE.md".into(),
            content_template: "at {{ generated_at }}".into(),
            applies_to: Default::default(),
            priority: 0,
            group: "base".into(),
            required: false,
            regenerable: true,
            time_varying: true,
            declaration_index: 0,
        };
        assert_eq!(
            engine.render(&template, &ctx(), &clock).unwrap(),
            "at 2024-05-01T12:00:00Z"
        );

        template.time_varying = false;
        assert!(matches!(
            engine.render(&template, &ctx(), &clock),
            Err(RenderError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_crlf_normalized() {
        let engine = RenderEngine::default();
        let out = engine.render_str("t", "a\r\nb\r\n", &ctx()).unwrap();
        assert_eq!(out, "a\nb\n");
    }
}
