//! # Hot Reload Module
//!
//! Watches a pattern definition file and republishes the [`PatternRegistry`]
//! snapshot whenever the file changes, without restarting the process.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modforge::hot_reload::watch_patterns;
//!
//! let registry = Arc::new(PatternRegistry::from_source(&PatternSource::File(path.clone()))?);
//! let watcher = watch_patterns(&path, registry.clone(), |outcome| match outcome {
//!     Ok(version) => println!("patterns now at {version}"),
//!     Err(e) => eprintln!("reload rejected: {e}"),
//! })?;
//!
//! // Keep the watcher alive for as long as reloads should happen
//! ```
//!
//! ## Reload Process
//!
//! 1. **Detection** - a `Modify` or `Create` event fires for the file
//! 2. **Load** - a new snapshot is parsed and validated off to the side
//! 3. **Publish** - the snapshot is swapped in atomically
//! 4. **Hook** - the callback receives the new version or the load error
//!
//! A file that fails to parse leaves the previous snapshot active. Requests
//! already running keep the snapshot they started with either way.

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::registry::{PatternRegistry, PatternSource, RegistryVersion};

/// Watch a pattern file and reload `registry` when it changes.
///
/// `on_reload` receives the outcome of every reload attempt. The returned
/// watcher stops watching when dropped.
pub fn watch_patterns<P, F>(
    patterns_path: P,
    registry: Arc<PatternRegistry>,
    mut on_reload: F,
) -> notify::Result<RecommendedWatcher>
where
    P: AsRef<Path>,
    F: FnMut(Result<RegistryVersion, &RegistryError>) + Send + 'static,
{
    let path: PathBuf = patterns_path.as_ref().to_path_buf();
    let source = PatternSource::File(path.clone());

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    match registry.reload(&source) {
                        Ok(version) => {
                            info!(%version, source = %source.label(), "hot-reload: pattern registry updated");
                            on_reload(Ok(version));
                        }
                        Err(e) => {
                            warn!(code = e.code(), error = %e, "hot-reload: keeping previous pattern snapshot");
                            on_reload(Err(&e));
                        }
                    }
                }
            }
            Err(e) => warn!(error = ?e, "hot-reload: watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
