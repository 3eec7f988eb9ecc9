//! # Generation Pipeline
//!
//! [`Generator::generate`] drives one request through the state machine:
//!
//! ```mermaid
//! stateDiagram-v2
//!     [*] --> RECEIVED
//!     RECEIVED --> VALIDATED: spec::validate
//!     VALIDATED --> RESOLVED: TemplateResolver::resolve
//!     RESOLVED --> RENDERED: RenderEngine::render (all bindings)
//!     RENDERED --> MATERIALIZED: FileTreeBuilder::materialize
//!     MATERIALIZED --> QUALITY_CHECKED: quality::validate_resolution
//!     QUALITY_CHECKED --> COMPLETED: report passed
//!     QUALITY_CHECKED --> FAILED: report failed (files kept)
//!     RECEIVED --> FAILED
//!     VALIDATED --> FAILED
//!     RESOLVED --> FAILED
//!     RENDERED --> FAILED
//!     MATERIALIZED --> FAILED: cancelled (rolled back)
//!     QUALITY_CHECKED --> FAILED: cancelled before commit (rolled back)
//! ```
//!
//! ## Side Effects per Stage
//!
//! | Failure before / at | Module root                                     |
//! |---------------------|-------------------------------------------------|
//! | `RENDERED`          | never touched                                   |
//! | `MATERIALIZED`      | untouched (staging discarded)                   |
//! | cancellation after  | previous tree restored from the parked backup   |
//! | `QUALITY_CHECKED`   | new tree kept for inspection                    |
//!
//! ## Snapshots
//!
//! Each request pins the registry snapshot and template catalog that were
//! current when it started; [`PatternRegistry::publish`] and
//! [`Generator::publish_catalog`] only affect later requests.

mod request;
mod result;
mod state;

pub use request::{CancelToken, GenerationRequest, RequestId};
pub use result::{ErrorReport, FileReport, GenerationResult};
pub use state::{GenerationState, PipelineState};

use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, RegistryError, RenderError};
use crate::quality::{self, QualityReport};
use crate::registry::{PatternRegistry, PatternSource};
use crate::render::{Clock, RenderEngine, SystemClock};
use crate::resolver::{Resolution, TemplateResolver};
use crate::spec::{self, ModuleSpec, ValidatedSpec};
use crate::templates::TemplateCatalog;
use crate::tree::{FileTreeBuilder, ManifestHeader, RenderedFile};

/// The generation engine. Cheap to share behind an `Arc`.
pub struct Generator {
    registry: Arc<PatternRegistry>,
    catalog: ArcSwap<TemplateCatalog>,
    engine: RenderEngine,
    clock: Arc<dyn Clock>,
    observer: Option<StageObserver>,
    config: GeneratorConfig,
}

/// Called after every state transition of every request.
pub type StageObserver = Arc<dyn Fn(RequestId, GenerationState) + Send + Sync>;

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("registry", &self.registry)
            .field("catalog", &self.catalog.load().version())
            .field("config", &self.config)
            .finish()
    }
}

impl Generator {
    pub fn new(registry: Arc<PatternRegistry>, catalog: TemplateCatalog, config: GeneratorConfig) -> Self {
        Self {
            registry,
            catalog: ArcSwap::from_pointee(catalog),
            engine: RenderEngine::new(config.render_fuel),
            clock: Arc::new(SystemClock),
            observer: None,
            config,
        }
    }

    /// Load the pattern file and template catalog named by `config`, falling
    /// back to the built-in ones.
    pub fn from_config(config: GeneratorConfig) -> Result<Self, RegistryError> {
        let source = match &config.patterns_path {
            Some(path) => PatternSource::File(path.clone()),
            None => PatternSource::Builtin,
        };
        let registry = Arc::new(PatternRegistry::from_source(&source)?);
        let catalog = match &config.templates_dir {
            Some(dir) => TemplateCatalog::from_dir(dir)?,
            None => TemplateCatalog::builtin()?,
        };
        info!(
            patterns = %source.label(),
            registry_version = %registry.version(),
            template_version = %catalog.version(),
            "Generator initialized"
        );
        Ok(Self::new(registry, catalog, config))
    }

    /// Built-in patterns and templates with default configuration.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_config(GeneratorConfig::default())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Observe stage transitions, e.g. for progress reporting.
    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> Arc<TemplateCatalog> {
        self.catalog.load_full()
    }

    /// Swap in a new template catalog for subsequent requests.
    pub fn publish_catalog(&self, catalog: TemplateCatalog) {
        info!(template_version = %catalog.version(), "Template catalog published");
        self.catalog.store(Arc::new(catalog));
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Validate against the current registry snapshot. No filesystem access.
    pub fn validate(&self, raw: &ModuleSpec) -> Result<ValidatedSpec, GenerationError> {
        Ok(spec::validate(raw, &self.registry.current())?)
    }

    /// Resolve a spec against the current catalog.
    pub fn resolve(&self, spec: &ValidatedSpec) -> Result<Resolution, GenerationError> {
        let catalog = self.catalog.load_full();
        Ok(TemplateResolver::new(&catalog, &self.engine).resolve(spec)?)
    }

    /// Re-run the quality gate over an existing module root.
    pub fn check(&self, root: &Path, raw: &ModuleSpec) -> Result<QualityReport, GenerationError> {
        let spec = self.validate(raw)?;
        let resolution = self.resolve(&spec)?;
        Ok(quality::validate_resolution(root, &spec, &resolution))
    }

    /// Run one request to a terminal state.
    pub fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let span = info_span!(
            "generate",
            request_id = %request.id,
            module = %request.spec.name,
            policy = %request.policy,
        );
        let _enter = span.enter();

        let mut state = PipelineState::new();
        let mut result = GenerationResult::new(request.id, &request.module_root);
        let started = Instant::now();

        if let Err(err) = self.run(request, &mut state, &mut result) {
            warn!(code = err.code(), error = %err, state = %state.current(), "Generation failed");
            state.fail();
            result.push_error(err);
        }

        result.state = state.current();
        result.success = result.state == GenerationState::Completed;
        info!(
            success = result.success,
            state = %result.state,
            files = result.files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation finished"
        );
        result
    }

    fn run(
        &self,
        request: &GenerationRequest,
        state: &mut PipelineState,
        result: &mut GenerationResult,
    ) -> Result<(), GenerationError> {
        let registry = self.registry.current();
        let catalog = self.catalog.load_full();

        self.checkpoint(request)?;
        let spec = spec::validate(&request.spec, &registry)?;
        self.advance(request, state, GenerationState::Validated);
        debug!(spec_hash = %spec.spec_hash(), "Spec validated");

        self.checkpoint(request)?;
        let resolution = TemplateResolver::new(&catalog, &self.engine).resolve(&spec)?;
        result.warnings.extend(resolution.warnings.iter().cloned());
        self.advance(request, state, GenerationState::Resolved);

        self.checkpoint(request)?;
        let files = self.render_all(&resolution)?;
        self.advance(request, state, GenerationState::Rendered);

        self.checkpoint(request)?;
        let header = ManifestHeader {
            template_version: resolution.template_version.clone(),
            registry_version: spec.registry().version().to_string(),
            spec_hash: spec.spec_hash().to_string(),
        };
        let materialization = FileTreeBuilder::new()
            .with_stage_timeout(self.config.stage_timeout)
            .materialize(&request.module_root, &files, &header, request.policy)?;
        self.advance(request, state, GenerationState::Materialized);

        if request.cancel.is_cancelled() {
            materialization.rollback()?;
            return Err(GenerationError::Cancelled);
        }

        let report = quality::validate_resolution(&request.module_root, &spec, &resolution);
        self.advance(request, state, GenerationState::QualityChecked);

        result.files = materialization.files().iter().map(FileReport::from).collect();
        result.protected = materialization.protected();
        result.warnings.extend(materialization.warnings().iter().cloned());
        let quality_error = report.to_error();
        result.quality = Some(report);

        if request.cancel.is_cancelled() {
            result.files.clear();
            result.protected.clear();
            materialization.rollback()?;
            return Err(GenerationError::Cancelled);
        }
        if let Err(e) = materialization.commit() {
            result.warnings.push(format!("cleanup after commit failed: {e}"));
        }

        match quality_error {
            Some(err) => Err(err.into()),
            None => {
                self.advance(request, state, GenerationState::Completed);
                Ok(())
            }
        }
    }

    fn advance(&self, request: &GenerationRequest, state: &mut PipelineState, next: GenerationState) {
        state.transition(next);
        if let Some(observer) = &self.observer {
            observer(request.id, next);
        }
    }

    fn checkpoint(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        if request.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        Ok(())
    }

    /// Render every binding, collecting all failures.
    fn render_all(&self, resolution: &Resolution) -> Result<Vec<RenderedFile>, GenerationError> {
        let started = Instant::now();
        let limit = self.config.stage_timeout;
        let mut files = Vec::with_capacity(resolution.bindings.len());
        let mut errors: Vec<GenerationError> = Vec::new();

        for binding in &resolution.bindings {
            match self
                .engine
                .render(&binding.template, &binding.render_context, self.clock.as_ref())
            {
                Ok(content) => files.push(RenderedFile {
                    path: binding.resolved_output_path.clone(),
                    content,
                    regenerable: binding.regenerable(),
                }),
                Err(e) => errors.push(e.into()),
            }
            if started.elapsed() > limit {
                errors.push(
                    RenderError::Timeout {
                        template_id: binding.template_id.clone(),
                        detail: format!("render stage exceeded {}ms", limit.as_millis()),
                    }
                    .into(),
                );
                break;
            }
        }

        if errors.is_empty() {
            Ok(files)
        } else {
            Err(GenerationError::collect(errors))
        }
    }
}
