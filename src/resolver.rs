//! # Template Resolution
//!
//! Turns a [`ValidatedSpec`] into the ordered list of [`TemplateBinding`]s to
//! render. Resolution is a pure function of the spec and the catalog.
//!
//! ## Algorithm
//!
//! 1. Every catalog template whose [`AppliesTo`](crate::templates::AppliesTo)
//!    matches the spec is a candidate. Type defaults (no pattern, capability
//!    or target selector) form the base layer; the rest are overlays.
//! 2. Each candidate's output path is rendered and checked: it must stay
//!    inside the module root.
//! 3. Candidates are merged by output path:
//!    - an overlay always beats a type default;
//!    - within a layer the higher `priority` wins;
//!    - an equal-priority tie inside one `group` goes to the later
//!      declaration and records a warning;
//!    - an equal-priority tie across groups is
//!      [`ResolutionError::Ambiguous`].
//! 4. Bindings are returned sorted by output path.
//!
//! ```text
//! python/service            base     p0   src/user_api/service.py ─┐
//! python/service-integration base    p10  src/user_api/service.py ─┴─> p10 wins
//! python/gitignore          base     p0   .gitignore ─┐
//! patterns/ml-gitignore     overlay  p0   .gitignore ─┴─> overlay wins
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::render::{RenderContext, RenderEngine};
use crate::spec::ValidatedSpec;
use crate::templates::{Template, TemplateCatalog};
use crate::tree::normalize_relative;

/// A template resolved to its output path, ready to render.
#[derive(Debug, Clone)]
pub struct TemplateBinding {
    pub template: Arc<Template>,
    pub template_id: String,
    /// Normalized, `/`-separated path relative to the module root
    pub resolved_output_path: String,
    pub render_context: Arc<RenderContext>,
}

impl TemplateBinding {
    pub fn required(&self) -> bool {
        self.template.required
    }

    pub fn regenerable(&self) -> bool {
        self.template.regenerable
    }
}

/// Output of [`TemplateResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Sorted by `resolved_output_path`
    pub bindings: Vec<TemplateBinding>,
    pub warnings: Vec<String>,
    /// Catalog version the bindings came from
    pub template_version: String,
}

impl Resolution {
    /// Paths the quality gate must find on disk.
    pub fn required_paths(&self) -> BTreeSet<String> {
        self.bindings
            .iter()
            .filter(|b| b.required())
            .map(|b| b.resolved_output_path.clone())
            .collect()
    }

    pub fn paths(&self) -> BTreeSet<String> {
        self.bindings
            .iter()
            .map(|b| b.resolved_output_path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Resolves specs against one catalog snapshot.
pub struct TemplateResolver<'a> {
    catalog: &'a TemplateCatalog,
    engine: &'a RenderEngine,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(catalog: &'a TemplateCatalog, engine: &'a RenderEngine) -> Self {
        Self { catalog, engine }
    }

    pub fn resolve(&self, spec: &ValidatedSpec) -> Result<Resolution, ResolutionError> {
        let context = Arc::new(RenderContext::for_spec(spec, self.catalog.version()));

        let mut by_path: BTreeMap<String, Vec<&Arc<Template>>> = BTreeMap::new();
        for template in self.catalog.templates() {
            if !template.applies_to.matches(spec) {
                continue;
            }
            let rendered = self.engine.render_path(template, &context).map_err(|source| {
                ResolutionError::PathRender {
                    template_id: template.id.clone(),
                    source,
                }
            })?;
            let path =
                normalize_relative(&rendered).ok_or_else(|| ResolutionError::UnsafeOutputPath {
                    template_id: template.id.clone(),
                    path: rendered.clone(),
                })?;
            by_path.entry(path).or_default().push(template);
        }

        if by_path.is_empty() {
            return Err(ResolutionError::EmptyTemplateSet {
                module_type: spec.module_type().to_string(),
                language: spec.language().to_string(),
            });
        }

        let mut warnings = Vec::new();
        let mut bindings = Vec::with_capacity(by_path.len());
        for (path, candidates) in by_path {
            let winner = pick(&path, &candidates, &mut warnings)?;
            bindings.push(TemplateBinding {
                template: Arc::clone(winner),
                template_id: winner.id.clone(),
                resolved_output_path: path,
                render_context: Arc::clone(&context),
            });
        }

        debug!(
            module = %spec.name(),
            bindings = bindings.len(),
            template_version = %self.catalog.version(),
            "Templates resolved"
        );

        Ok(Resolution {
            bindings,
            warnings,
            template_version: self.catalog.version().to_string(),
        })
    }

    /// Required output paths for `spec`.
    pub fn required_paths(&self, spec: &ValidatedSpec) -> Result<BTreeSet<String>, ResolutionError> {
        Ok(self.resolve(spec)?.required_paths())
    }
}

fn pick<'t>(
    path: &str,
    candidates: &[&'t Arc<Template>],
    warnings: &mut Vec<String>,
) -> Result<&'t Arc<Template>, ResolutionError> {
    let rank = |t: &Template| (t.is_overlay(), t.priority);
    let top = candidates.iter().map(|t| rank(t)).max();
    let tied: Vec<&'t Arc<Template>> = candidates
        .iter()
        .copied()
        .filter(|t| Some(rank(t)) == top)
        .collect();

    let Some(winner) = tied.iter().copied().max_by_key(|t| t.declaration_index) else {
        return Err(ResolutionError::Ambiguous {
            path: path.to_string(),
            candidates: Vec::new(),
        });
    };
    if tied.len() == 1 {
        return Ok(winner);
    }

    let mut ids: Vec<String> = tied.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    if tied.iter().any(|t| t.group != winner.group) {
        return Err(ResolutionError::Ambiguous {
            path: path.to_string(),
            candidates: ids,
        });
    }

    warn!(
        path = %path,
        winner = %winner.id,
        "Equal-priority templates resolved by declaration order"
    );
    warnings.push(format!(
        "templates {} tie on '{path}' in group '{}'; using later declaration '{}'",
        ids.join(", "),
        winner.group,
        winner.id
    ));
    Ok(winner)
}
