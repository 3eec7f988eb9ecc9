use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::GeneratorConfig;
use crate::hot_reload::watch_patterns;
use crate::pipeline::{CancelToken, GenerationRequest, GenerationResult, Generator};
use crate::quality::QualityReport;
use crate::spec::{self, ModuleSpec};
use crate::tree::CollisionPolicy;
use crate::worker_pool::{GenerationPool, WorkerPoolConfig};

/// Command-line interface for modforge
///
/// Generates module skeletons from a name, a module type, a domain and an
/// optional infrastructure pattern.
#[derive(Parser, Debug)]
#[command(name = "modforge")]
#[command(about = "Deterministic module scaffolding", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Pattern definition file (YAML or JSON); built-in patterns when unset
    #[arg(long, global = true, env = "MODFORGE_PATTERNS")]
    pub patterns: Option<PathBuf>,

    /// Template catalog directory; built-in catalog when unset
    #[arg(long, global = true, env = "MODFORGE_TEMPLATES")]
    pub templates: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate one module from command-line fields
    CreateModule {
        /// Module name (lowercase letters, digits and `-`)
        name: String,

        /// Module type: CORE, INTEGRATION, SUPPORTING or TECHNICAL
        #[arg(long = "type")]
        module_type: String,

        /// Business domain the module belongs to
        #[arg(long)]
        domain: String,

        /// Primary infrastructure pattern
        #[arg(long)]
        pattern: Option<String>,

        /// Additional patterns layered on the primary one (repeatable)
        #[arg(long = "extra-pattern")]
        extra_patterns: Vec<String>,

        /// Deployment target; defaults to the pattern's first target
        #[arg(long)]
        deployment_target: Option<String>,

        /// Implementation language (default: python)
        #[arg(long)]
        language: Option<String>,

        /// Directory the module root `<output>/<name>` is created in
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// What to do when the module root already has content
        #[arg(long, default_value = "abort")]
        policy: CollisionPolicy,

        /// Print the GenerationResult as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate one module from a JSON or YAML request file
    Generate {
        /// Request file with `name`, `type`, `domain` and optional fields
        #[arg(short, long)]
        request: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[arg(long, default_value = "abort")]
        policy: CollisionPolicy,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate many modules concurrently from a request list
    ///
    /// SIGINT or SIGTERM cancels the wave: requests that have not committed
    /// their tree are abandoned or rolled back, finished modules stay.
    Wave {
        /// File holding a list of requests (or `{modules: [...]}`)
        #[arg(short, long)]
        requests: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[arg(long, default_value = "abort")]
        policy: CollisionPolicy,

        /// Worker coroutines; overrides MODFORGE_WORKERS
        #[arg(long)]
        workers: Option<usize>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Re-run the quality gate over an existing module root
    Check {
        /// Root of a previously generated module
        module_root: PathBuf,

        /// Request the module was generated from
        #[arg(short, long)]
        request: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List the registered patterns
    Patterns {
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Keep running and report every reload of the pattern file
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
}

/// Execute a parsed command line and return the process exit code.
///
/// `0` success, `1` validation or registry error (nothing written), `2`
/// generation or quality failure.
///
/// # Errors
///
/// Returns an error when the pattern file, template catalog or request file
/// cannot be loaded; callers map that to exit code `1`.
pub fn run_cli(cli: Cli) -> anyhow::Result<i32> {
    let config = config_for(&cli);

    match cli.command {
        Commands::CreateModule {
            name,
            module_type,
            domain,
            pattern,
            extra_patterns,
            deployment_target,
            language,
            output,
            policy,
            json,
        } => {
            let spec = ModuleSpec {
                name,
                module_type,
                domain,
                pattern,
                extra_patterns,
                deployment_target,
                language,
            };
            let generator = build_generator(config)?;
            let request = GenerationRequest::under(spec, output).with_policy(policy);
            let result = generator.generate(&request);
            emit_result(&result, json)?;
            Ok(result.exit_code())
        }
        Commands::Generate {
            request,
            output,
            policy,
            json,
        } => {
            let spec = spec::load_request(&request)
                .with_context(|| format!("failed to load request {}", request.display()))?;
            let generator = build_generator(config)?;
            let request = GenerationRequest::under(spec, output).with_policy(policy);
            let result = generator.generate(&request);
            emit_result(&result, json)?;
            Ok(result.exit_code())
        }
        Commands::Wave {
            requests,
            output,
            policy,
            workers,
            json,
        } => {
            let specs = spec::load_wave(&requests)
                .with_context(|| format!("failed to load requests {}", requests.display()))?;
            let mut config = config;
            if let Some(workers) = workers {
                config.workers = workers;
            }
            let pool_config = WorkerPoolConfig::from_config(&config);
            let generator = Arc::new(build_generator(config)?);

            let cancel = CancelToken::new();
            register_cancel_signals(&cancel)?;

            let batch: Vec<GenerationRequest> = specs
                .into_iter()
                .map(|spec| {
                    GenerationRequest::under(spec, &output)
                        .with_policy(policy)
                        .with_cancel(cancel.clone())
                })
                .collect();
            info!(requests = batch.len(), workers = pool_config.num_workers, "Starting wave");

            // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
            // Safe because: the runtime is initialized on first use and the
            // stack size comes from validated configuration.
            let pool = unsafe { GenerationPool::new(generator, pool_config) };
            let results = pool.generate_wave(batch);
            emit_wave(&results, json)?;
            Ok(results.iter().map(GenerationResult::exit_code).max().unwrap_or(0))
        }
        Commands::Check {
            module_root,
            request,
            json,
        } => {
            let spec = spec::load_request(&request)
                .with_context(|| format!("failed to load request {}", request.display()))?;
            let generator = build_generator(config)?;
            match generator.check(&module_root, &spec) {
                Ok(report) => {
                    emit_report(&module_root, &report, json)?;
                    Ok(if report.passed { 0 } else { 2 })
                }
                Err(e) => {
                    eprintln!("❌ {}: {e}", e.code());
                    Ok(if e.is_rejection() { 1 } else { 2 })
                }
            }
        }
        Commands::Patterns { json, watch } => {
            let patterns_path = config.patterns_path.clone();
            let generator = build_generator(config)?;
            list_patterns(&generator, json)?;
            if watch {
                let Some(path) = patterns_path else {
                    bail!("--watch needs a pattern file (--patterns or MODFORGE_PATTERNS)");
                };
                watch_until_signal(&path, &generator, json)?;
            }
            Ok(0)
        }
    }
}

fn config_for(cli: &Cli) -> GeneratorConfig {
    let mut config = GeneratorConfig::from_env();
    if cli.patterns.is_some() {
        config.patterns_path = cli.patterns.clone();
    }
    if cli.templates.is_some() {
        config.templates_dir = cli.templates.clone();
    }
    config
}

fn build_generator(config: GeneratorConfig) -> anyhow::Result<Generator> {
    Generator::from_config(config).context("failed to load patterns or templates")
}

fn emit_result(result: &GenerationResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    print_summary(result);
    Ok(())
}

fn emit_wave(results: &[GenerationResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    for result in results {
        print_summary(result);
    }
    let ok = results.iter().filter(|r| r.success).count();
    println!("{ok}/{} modules generated", results.len());
    Ok(())
}

fn print_summary(result: &GenerationResult) {
    if result.success {
        println!(
            "✅ {} ({} files, {} protected)",
            result.module_path,
            result.files.len(),
            result.protected.len()
        );
    } else {
        println!("❌ {} [{}]", result.module_path, result.state);
        for error in &result.errors {
            println!("   {}: {}", error.code, error.message);
        }
    }
    for warning in &result.warnings {
        println!("   ⚠️  {warning}");
    }
}

fn emit_report(root: &Path, report: &QualityReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.issues.is_empty() {
        println!("✅ {} passed", root.display());
    }
    for issue in &report.issues {
        println!("{issue}");
    }
    Ok(())
}

fn list_patterns(generator: &Generator, json: bool) -> anyhow::Result<()> {
    let snapshot = generator.registry().current();
    if json {
        let patterns: Vec<_> = snapshot.iter().map(|p| p.as_ref()).collect();
        let body = serde_json::json!({
            "version": snapshot.version().to_string(),
            "source": snapshot.source(),
            "patterns": patterns,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    println!("patterns {} ({})", snapshot.version(), snapshot.source());
    for pattern in snapshot.iter() {
        let targets: Vec<&str> = pattern.deployment_targets.iter().map(|t| t.as_str()).collect();
        let excluded: Vec<&str> = pattern.incompatible_types.iter().map(|t| t.as_str()).collect();
        println!(
            "  {:<16} targets={} cpu={}/{}{}",
            pattern.name,
            targets.join(","),
            pattern.resource_profile.cpu_request,
            pattern.resource_profile.cpu_limit,
            if excluded.is_empty() {
                String::new()
            } else {
                format!(" excludes={}", excluded.join(","))
            }
        );
    }
    Ok(())
}

fn watch_until_signal(path: &Path, generator: &Generator, json: bool) -> anyhow::Result<()> {
    let _watcher = watch_patterns(path, Arc::clone(generator.registry()), move |outcome| {
        match outcome {
            Ok(version) if json => println!("{}", serde_json::json!({ "reloaded": version.to_string() })),
            Ok(version) => println!("🔄 patterns reloaded: {version}"),
            Err(e) => eprintln!("⚠️  reload rejected ({}): {e}", e.code()),
        }
    })
    .with_context(|| format!("failed to watch {}", path.display()))?;
    info!(path = %path.display(), "Watching pattern file");
    wait_for_signal()
}

#[cfg(unix)]
fn register_cancel_signals(cancel: &CancelToken) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancel.flag())
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn register_cancel_signals(_cancel: &CancelToken) -> anyhow::Result<()> {
    tracing::warn!("signal cancellation is only supported on unix");
    Ok(())
}

#[cfg(unix)]
fn wait_for_signal() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handler")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Stopping pattern watch");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_signal() -> anyhow::Result<()> {
    tracing::warn!("no signal support; watching until the process is killed");
    loop {
        std::thread::park();
    }
}
