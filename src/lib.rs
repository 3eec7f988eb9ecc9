//! # modforge
//!
//! **modforge** generates module skeletons (source layout, tests, build files
//! and deployment manifests) from a small request: a name, a module type, a
//! business domain and an optional infrastructure pattern. Output is a pure
//! function of the request plus the pattern and template versions, so
//! regenerating a module reproduces it byte for byte.
//!
//! ## Architecture
//!
//! - **[`spec`]** - request model and validation against a registry snapshot
//! - **[`registry`]** - versioned, hot-swappable pattern definitions
//! - **[`templates`]** - the template catalog (built in or loaded from disk)
//! - **[`resolver`]** - picks exactly one template per output path
//! - **[`render`]** - sandboxed `minijinja` rendering with a fuel budget
//! - **[`tree`]** - staged, atomic materialization with collision policies
//! - **[`quality`]** - required files, syntax and structural checks
//! - **[`pipeline`]** - the per-request state machine tying it all together
//! - **[`worker_pool`]** - coroutine pool for wave generation
//! - **[`hot_reload`]** - republishes the registry when the pattern file changes
//! - **[`cli`]** - the `modforge` binary
//!
//! ### Generation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant CLI as modforge CLI
//!     participant Gen as pipeline::Generator
//!     participant Reg as registry::PatternRegistry
//!     participant Res as resolver::TemplateResolver
//!     participant Eng as render::RenderEngine
//!     participant Tree as tree::FileTreeBuilder
//!     participant QG as quality
//!     participant FS as File System
//!
//!     CLI->>Gen: generate(GenerationRequest)
//!     Gen->>Reg: current()
//!     Reg-->>Gen: Arc<RegistrySnapshot>
//!     Gen->>Gen: spec::validate
//!     Gen->>Res: resolve(ValidatedSpec)
//!     Res-->>Gen: Resolution (one binding per path)
//!     Gen->>Eng: render(binding) for every binding
//!     Eng-->>Gen: Vec<RenderedFile>
//!     Gen->>Tree: materialize(root, files, policy)
//!     Tree->>FS: lock, stage, swap
//!     Tree-->>Gen: Materialization
//!     Gen->>QG: validate_resolution(root)
//!     QG-->>Gen: QualityReport
//!     Gen->>Tree: commit()
//!     Gen-->>CLI: GenerationResult
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modforge::pipeline::{GenerationRequest, Generator};
//! use modforge::spec::ModuleSpec;
//!
//! let generator = Generator::builtin()?;
//! let spec = ModuleSpec::new("user-api", "SUPPORTING", "identity").with_pattern("web_api");
//! let result = generator.generate(&GenerationRequest::under(spec, "services"));
//! assert!(result.success);
//! # Ok::<(), modforge::error::RegistryError>(())
//! ```
//!
//! ## Guarantees
//!
//! - Validation and registry errors are reported before anything touches the
//!   filesystem.
//! - A generation either replaces the module root completely or leaves it as
//!   it was; staging happens in a sibling directory.
//! - `MERGE` never overwrites a file whose on-disk checksum differs from the
//!   one recorded in `.generation-manifest.json`.
//! - In-flight requests keep the registry and catalog snapshots they started
//!   with, even across a reload.

pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod hot_reload;
pub mod logging;
pub mod pipeline;
pub mod quality;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod spec;
pub mod templates;
pub mod tree;
pub mod worker_pool;

/// Version stamped into every generation manifest.
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::GeneratorConfig;
pub use error::GenerationError;
pub use pipeline::{CancelToken, GenerationRequest, GenerationResult, GenerationState, Generator};
pub use registry::{PatternRegistry, PatternSource};
pub use spec::{ModuleSpec, ValidatedSpec};
pub use tree::CollisionPolicy;
