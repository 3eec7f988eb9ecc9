use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{CollisionError, GenerationError, IoError};

/// Advisory lock file beside a module root: `<parent>/.<name>.modforge.lock`.
pub fn lock_path(root: &Path) -> Option<PathBuf> {
    let name = root.file_name()?.to_str()?;
    Some(root.parent()?.join(format!(".{name}.modforge.lock")))
}

/// Held while a module root is being materialized; removes the lock file on
/// drop.
#[derive(Debug)]
pub(crate) struct RootLock {
    path: PathBuf,
}

impl RootLock {
    /// Create the lock file, failing fast when another generation holds it.
    pub(crate) fn acquire(root: &Path) -> Result<Self, GenerationError> {
        let path = lock_path(root).ok_or_else(|| IoError::InvalidRoot {
            root: root.to_path_buf(),
        })?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CollisionError::Locked {
                    root: root.to_path_buf(),
                    lock: path,
                }
                .into());
            }
            Err(e) => return Err(IoError::fs("lock", path, e).into()),
        };
        // Holder identity for humans inspecting a stale lock
        if let Err(e) = writeln!(file, "pid={} lock={}", std::process::id(), ulid::Ulid::new()) {
            warn!(lock = %path.display(), error = %e, "Failed to write lock holder");
        }
        debug!(lock = %path.display(), "Module root locked");
        Ok(Self { path })
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(lock = %self.path.display(), "Module root unlocked"),
            Err(e) => warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("svc");

        let lock = RootLock::acquire(&root).unwrap();
        assert!(lock_path(&root).unwrap().exists());

        let err = RootLock::acquire(&root).unwrap_err();
        assert_eq!(err.code(), "TARGET_LOCKED");

        drop(lock);
        assert!(!lock_path(&root).unwrap().exists());
        assert!(RootLock::acquire(&root).is_ok());
    }

    #[test]
    fn test_lock_path_layout() {
        assert_eq!(
            lock_path(Path::new("/out/user-api")),
            Some(PathBuf::from("/out/.user-api.modforge.lock"))
        );
        assert_eq!(lock_path(Path::new("/")), None);
    }
}
