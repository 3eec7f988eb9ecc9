use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::spec::ValidatedSpec;

/// Canonicalized variables available to a template.
///
/// Objects are key-sorted, strings use `\n` line endings and set-like lists
/// are sorted and deduplicated, so logically equal specs serialize to the
/// same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    value: Value,
}

impl RenderContext {
    /// Build the context for one validated spec.
    ///
    /// | Key                 | Value                                           |
    /// |---------------------|-------------------------------------------------|
    /// | `module_name`       | `user-api`                                      |
    /// | `module_snake`      | `user_api`                                      |
    /// | `module_pascal`     | `UserApi`                                       |
    /// | `module_title`      | `User Api`                                      |
    /// | `module_type`       | `CORE` (`module_type_lower`: `core`)            |
    /// | `domain`            | request domain                                  |
    /// | `language`          | `python` / `rust`                               |
    /// | `pattern`           | primary pattern name or none                    |
    /// | `patterns`          | sorted pattern names                            |
    /// | `capabilities`      | sorted capability tags                          |
    /// | `deployment_target` | effective target or none                        |
    /// | `resources`         | primary pattern's resource profile or none      |
    /// | `port`              | first declared pattern port or none             |
    /// | `env` / `env_map`   | merged pattern env vars (list sorted by name)   |
    /// | `template_version`  | catalog version label                           |
    /// | `generator_version` | crate version                                   |
    ///
    /// `generated_at` is added only for time-varying templates.
    pub fn for_spec(spec: &ValidatedSpec, template_version: &str) -> Self {
        let name = spec.name();

        let mut patterns: Vec<&str> = spec.pattern_names();
        patterns.sort_unstable();
        patterns.dedup();

        let capabilities: Vec<&str> = spec.capabilities().iter().map(|c| c.as_str()).collect();

        let mut env: BTreeMap<&str, &str> = BTreeMap::new();
        for pattern in spec.patterns() {
            for var in &pattern.env {
                env.entry(var.name.as_str()).or_insert(var.value.as_str());
            }
        }
        let env_list: Vec<Value> = env
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();

        let resources = spec
            .pattern()
            .map(|p| serde_json::to_value(&p.resource_profile).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);

        let port = spec
            .patterns()
            .iter()
            .find_map(|p| p.port)
            .map(Value::from)
            .unwrap_or(Value::Null);

        let value = json!({
            "module_name": name,
            "module_snake": to_snake(name),
            "module_pascal": to_pascal(name),
            "module_title": to_title(name),
            "module_type": spec.module_type().as_str(),
            "module_type_lower": spec.module_type().as_str().to_ascii_lowercase(),
            "domain": spec.domain(),
            "language": spec.language().as_str(),
            "pattern": spec.pattern().map(|p| p.name.as_str()),
            "patterns": patterns,
            "capabilities": capabilities,
            "deployment_target": spec.deployment_target().map(|t| t.as_str()),
            "resources": resources,
            "port": port,
            "env": env_list,
            "env_map": env,
            "template_version": template_version,
            "generator_version": crate::GENERATOR_VERSION,
        });
        Self::from_value(value)
    }

    /// Wrap an arbitrary JSON object, canonicalizing it.
    pub fn from_value(value: Value) -> Self {
        Self {
            value: canonicalize(value),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    /// A copy of this context with `generated_at` set.
    pub fn with_generated_at(&self, timestamp: &str) -> Self {
        let mut value = self.value.clone();
        if let Value::Object(map) = &mut value {
            map.insert("generated_at".to_string(), Value::from(timestamp));
        }
        Self::from_value(value)
    }
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_newlines(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            // Rebuild in sorted order so the result is key-sorted even when
            // serde_json keeps insertion order.
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        other => other,
    }
}

pub(crate) fn normalize_newlines(s: &str) -> String {
    if s.contains('\r') {
        s.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        s.to_string()
    }
}

/// Split an identifier into lowercase words on separators and camel-case
/// boundaries.
fn words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in input.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn to_snake(input: &str) -> String {
    words(input).join("_")
}

pub fn to_kebab(input: &str) -> String {
    words(input).join("-")
}

pub fn to_pascal(input: &str) -> String {
    words(input).iter().map(|w| capitalize(w)).collect()
}

pub fn to_title(input: &str) -> String {
    words(input)
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Double-quoted scalar that is valid in YAML, TOML and JSON.
pub fn quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
