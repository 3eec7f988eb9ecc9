//! # File Tree Builder
//!
//! Materializes rendered files under a module root without ever leaving a
//! half-written tree behind.
//!
//! ## Materialization
//!
//! ```text
//! parent/
//! ├── .user-api.modforge.lock            advisory lock (held until commit/rollback)
//! ├── .user-api.staging-XXXX/            staging: previous tree copy + new files
//! ├── .user-api.modforge-backup-<ulid>/  previous tree, parked until commit
//! └── user-api/                          module root
//! ```
//!
//! 1. Every output path is checked to stay inside the root.
//! 2. The lock file is created (`create_new`); an existing lock is a
//!    [`CollisionError::Locked`].
//! 3. [`CollisionPolicy::AbortIfExists`] refuses a non-empty root without
//!    touching it.
//! 4. The previous tree (if any) is copied into a sibling staging directory
//!    with file mtimes and permissions preserved, then every generated file
//!    is written there. Errors are collected, not fail-fast; if any occur the
//!    staging directory is discarded and the root is untouched.
//! 5. The root is renamed to a backup and staging is renamed into place.
//!
//! The returned [`Materialization`] must be committed (backup removed) or
//! rolled back (previous tree restored). Dropping it without either rolls
//! back.
//!
//! ## Policies
//!
//! | Policy            | Existing generated file                          | Unrelated user file |
//! |-------------------|--------------------------------------------------|---------------------|
//! | `ABORT_IF_EXISTS` | n/a (non-empty root is rejected)                 | n/a                 |
//! | `OVERWRITE`       | replaced                                         | preserved           |
//! | `MERGE`           | replaced if its checksum matches the manifest,   | preserved           |
//! |                   | otherwise protected and reported                 |                     |
//!
//! Under MERGE a file that exists on disk but has no manifest entry is also
//! protected, as is any file recorded with `regenerable: false`.

mod lock;
mod manifest;
mod paths;

pub use lock::lock_path;
pub use manifest::{GenerationManifest, ManifestEntry};
pub use paths::normalize_relative;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::checksum;
use crate::error::{CollisionError, GenerationError, IoError};
use lock::RootLock;

pub const MANIFEST_FILE: &str = ".generation-manifest.json";

/// How to treat an existing module root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollisionPolicy {
    #[default]
    AbortIfExists,
    Overwrite,
    Merge,
}

impl CollisionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionPolicy::AbortIfExists => "ABORT_IF_EXISTS",
            CollisionPolicy::Overwrite => "OVERWRITE",
            CollisionPolicy::Merge => "MERGE",
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" | "abort_if_exists" => Ok(CollisionPolicy::AbortIfExists),
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "merge" => Ok(CollisionPolicy::Merge),
            other => Err(format!(
                "unknown policy '{other}' (expected abort, overwrite or merge)"
            )),
        }
    }
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered output for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: String,
    pub content: String,
    pub regenerable: bool,
}

/// What happened to a generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Created,
    Updated,
    Unchanged,
    /// Left as found on disk (MERGE only)
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: String,
    /// Size of the file now on disk
    pub bytes: u64,
    /// `sha256:<hex>` of the file now on disk
    pub checksum: String,
    pub status: FileStatus,
}

/// Manifest fields that describe the generation rather than its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHeader {
    pub template_version: String,
    pub registry_version: String,
    pub spec_hash: String,
}

#[derive(Debug)]
enum Undo {
    /// The root did not exist before; remove it
    RemoveRoot,
    /// The previous root was parked here
    RestoreBackup(PathBuf),
}

/// A swapped-in module tree awaiting [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
#[derive(Debug)]
pub struct Materialization {
    root: PathBuf,
    files: Vec<FileOutcome>,
    warnings: Vec<String>,
    manifest: GenerationManifest,
    undo: Option<Undo>,
    lock: Option<RootLock>,
}

impl Materialization {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Outcomes sorted by path.
    pub fn files(&self) -> &[FileOutcome] {
        &self.files
    }

    pub fn protected(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Protected)
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn manifest(&self) -> &GenerationManifest {
        &self.manifest
    }

    /// Keep the new tree: drop the parked backup and release the lock.
    pub fn commit(mut self) -> Result<(), IoError> {
        let undo = self.undo.take();
        let result = match undo {
            Some(Undo::RestoreBackup(backup)) => {
                fs::remove_dir_all(&backup).map_err(|e| IoError::fs("remove backup", backup, e))
            }
            _ => Ok(()),
        };
        self.lock.take();
        debug!(root = %self.root.display(), "Materialization committed");
        result
    }

    /// Restore the tree that existed before materialization.
    pub fn rollback(mut self) -> Result<(), IoError> {
        let result = self.undo();
        self.lock.take();
        result
    }

    fn undo(&mut self) -> Result<(), IoError> {
        let Some(undo) = self.undo.take() else {
            return Ok(());
        };
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .map_err(|e| IoError::fs("remove", self.root.clone(), e))?;
        }
        if let Undo::RestoreBackup(backup) = undo {
            fs::rename(&backup, &self.root)
                .map_err(|e| IoError::fs("restore backup", backup, e))?;
        }
        info!(root = %self.root.display(), "Materialization rolled back");
        Ok(())
    }
}

impl Drop for Materialization {
    fn drop(&mut self) {
        if self.undo.is_some() {
            if let Err(e) = self.undo() {
                warn!(root = %self.root.display(), error = %e, "Rollback on drop failed");
            }
        }
    }
}

/// Stages and swaps module trees.
#[derive(Debug, Clone, Default)]
pub struct FileTreeBuilder {
    stage_timeout: Option<Duration>,
}

impl FileTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail staging with [`IoError::Timeout`] once it runs longer than
    /// `limit`.
    pub fn with_stage_timeout(mut self, limit: Duration) -> Self {
        self.stage_timeout = Some(limit);
        self
    }

    pub fn materialize(
        &self,
        root: &Path,
        files: &[RenderedFile],
        header: &ManifestHeader,
        policy: CollisionPolicy,
    ) -> Result<Materialization, GenerationError> {
        let started = Instant::now();

        let mut errors: Vec<GenerationError> = Vec::new();
        for file in files {
            if normalize_relative(&file.path).as_deref() != Some(file.path.as_str()) {
                errors.push(
                    IoError::PathEscape {
                        path: file.path.clone(),
                    }
                    .into(),
                );
            }
        }
        if !errors.is_empty() {
            return Err(GenerationError::collect(errors));
        }

        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IoError::InvalidRoot {
                root: root.to_path_buf(),
            })?;
        let parent = match root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => {
                return Err(IoError::InvalidRoot {
                    root: root.to_path_buf(),
                }
                .into())
            }
        };

        if let Ok(meta) = fs::symlink_metadata(root) {
            if !meta.is_dir() {
                return Err(CollisionError::NotADirectory {
                    root: root.to_path_buf(),
                }
                .into());
            }
        }

        fs::create_dir_all(&parent).map_err(|e| IoError::fs("create", parent.clone(), e))?;
        let lock = RootLock::acquire(root)?;

        let existed = root.is_dir();
        let non_empty = existed
            && fs::read_dir(root)
                .map_err(|e| IoError::fs("read", root, e))?
                .next()
                .is_some();
        if policy == CollisionPolicy::AbortIfExists && non_empty {
            return Err(CollisionError::NonEmptyRoot {
                root: root.to_path_buf(),
            }
            .into());
        }

        let mut warnings = Vec::new();
        let previous = if policy == CollisionPolicy::Merge && existed {
            match GenerationManifest::read(root) {
                Ok(previous) => previous,
                Err(e) => {
                    warnings.push(format!(
                        "previous manifest is unreadable ({e}); existing files are protected"
                    ));
                    None
                }
            }
        } else {
            None
        };

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(&parent)
            .map_err(|e| IoError::fs("create staging", parent.clone(), e))?;

        if existed {
            copy_tree(root, staging.path(), &mut errors);
        }

        let mut outcomes = Vec::with_capacity(files.len());
        let mut manifest =
            GenerationManifest::new(&header.template_version, &header.registry_version, &header.spec_hash);

        let mut sorted: Vec<&RenderedFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        for file in sorted {
            if existed && paths::symlinked_component(root, &file.path).is_some() {
                errors.push(
                    IoError::PathEscape {
                        path: file.path.clone(),
                    }
                    .into(),
                );
                continue;
            }
            let on_disk = if existed {
                read_existing(&paths::join(root, &file.path), &mut errors)
            } else {
                None
            };
            let new_bytes = file.content.as_bytes();
            let new_checksum = checksum::sha256(new_bytes);

            let status = match (&on_disk, policy) {
                (None, _) => FileStatus::Created,
                (Some(disk), CollisionPolicy::Merge) => {
                    let disk_checksum = checksum::sha256(disk);
                    match previous.as_ref().and_then(|m| m.entry(&file.path)) {
                        None if disk.as_slice() == new_bytes => FileStatus::Unchanged,
                        None => {
                            warnings.push(format!(
                                "{} exists but was not generated; left untouched",
                                file.path
                            ));
                            FileStatus::Protected
                        }
                        Some(entry) if !entry.regenerable => FileStatus::Protected,
                        Some(entry) if entry.checksum != disk_checksum => {
                            warnings.push(format!(
                                "{} was edited since the last generation; left untouched",
                                file.path
                            ));
                            FileStatus::Protected
                        }
                        Some(_) if disk.as_slice() == new_bytes => FileStatus::Unchanged,
                        Some(_) => FileStatus::Updated,
                    }
                }
                (Some(disk), _) if disk.as_slice() == new_bytes => FileStatus::Unchanged,
                (Some(_), _) => FileStatus::Updated,
            };

            match status {
                FileStatus::Protected => {
                    let disk = on_disk.as_deref().unwrap_or_default();
                    outcomes.push(FileOutcome {
                        path: file.path.clone(),
                        bytes: disk.len() as u64,
                        checksum: checksum::sha256(disk),
                        status,
                    });
                    if let Some(entry) = previous.as_ref().and_then(|m| m.entry(&file.path)) {
                        manifest.files.push(entry.clone());
                    }
                    continue;
                }
                FileStatus::Created | FileStatus::Updated => {
                    write_file(staging.path(), &file.path, new_bytes, &mut errors);
                }
                FileStatus::Unchanged => {}
            }

            outcomes.push(FileOutcome {
                path: file.path.clone(),
                bytes: new_bytes.len() as u64,
                checksum: new_checksum.clone(),
                status,
            });
            manifest.files.push(ManifestEntry {
                path: file.path.clone(),
                checksum: new_checksum,
                regenerable: file.regenerable,
            });
        }

        if let Some(previous) = &previous {
            for stale in previous
                .files
                .iter()
                .filter(|e| !files.iter().any(|f| f.path == e.path))
            {
                warnings.push(format!(
                    "{} is no longer generated; dropped from the manifest",
                    stale.path
                ));
            }
        }

        manifest.normalize();
        match manifest.to_json() {
            Ok(json) => write_file(staging.path(), MANIFEST_FILE, json.as_bytes(), &mut errors),
            Err(e) => errors.push(e.into()),
        }

        if let Some(limit) = self.stage_timeout {
            if started.elapsed() > limit {
                errors.push(
                    IoError::Timeout {
                        stage: "materialize",
                        limit_ms: limit.as_millis() as u64,
                    }
                    .into(),
                );
            }
        }

        if !errors.is_empty() {
            warn!(
                root = %root.display(),
                errors = errors.len(),
                "Staging failed; module root left untouched"
            );
            return Err(GenerationError::collect(errors));
        }

        let undo = if existed {
            let backup = parent.join(format!(".{name}.modforge-backup-{}", ulid::Ulid::new()));
            fs::rename(root, &backup).map_err(|e| IoError::fs("park", root, e))?;
            if let Err(e) = fs::rename(staging.path(), root) {
                if let Err(restore) = fs::rename(&backup, root) {
                    warn!(backup = %backup.display(), error = %restore, "Failed to restore parked tree");
                }
                return Err(IoError::fs("swap", root, e).into());
            }
            Undo::RestoreBackup(backup)
        } else {
            fs::rename(staging.path(), root).map_err(|e| IoError::fs("swap", root, e))?;
            Undo::RemoveRoot
        };
        // The staging path no longer exists; dropping it is a no-op.
        drop(staging);

        info!(
            root = %root.display(),
            policy = %policy,
            files = outcomes.len(),
            "Module tree materialized"
        );

        Ok(Materialization {
            root: root.to_path_buf(),
            files: outcomes,
            warnings,
            manifest,
            undo: Some(undo),
            lock: Some(lock),
        })
    }
}

fn read_existing(path: &Path, errors: &mut Vec<GenerationError>) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            errors.push(IoError::fs("read", path, e).into());
            None
        }
    }
}

fn write_file(staging: &Path, relative: &str, bytes: &[u8], errors: &mut Vec<GenerationError>) {
    if paths::symlinked_component(staging, relative).is_some() {
        errors.push(
            IoError::PathEscape {
                path: relative.to_string(),
            }
            .into(),
        );
        return;
    }
    let path = paths::join(staging, relative);
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            errors.push(IoError::fs("create", dir, e).into());
            return;
        }
    }
    if let Err(e) = fs::write(&path, bytes) {
        errors.push(IoError::fs("write", path, e).into());
    }
}

/// Copy `from` into `to`, keeping file mtimes and permissions.
fn copy_tree(from: &Path, to: &Path, errors: &mut Vec<GenerationError>) {
    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
                errors.push(IoError::fs("walk", path, e.into()).into());
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        let file_type = entry.file_type();
        let result = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
        } else {
            copy_file(entry.path(), &target)
        };
        if let Err(e) = result {
            errors.push(IoError::fs("copy", entry.path(), e).into());
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> std::io::Result<()> {
    let meta = fs::metadata(from)?;
    let mut source = fs::File::open(from)?;
    let mut dest = fs::File::create(to)?;
    std::io::copy(&mut source, &mut dest)?;
    dest.set_modified(meta.modified()?)?;
    drop(dest);
    fs::set_permissions(to, meta.permissions())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    copy_file(from, to)
}
