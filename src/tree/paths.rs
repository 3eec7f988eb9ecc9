use std::fs;
use std::path::{Component, Path, PathBuf};

use super::MANIFEST_FILE;

/// Normalize a template output path into a `/`-separated path that stays
/// inside the module root.
///
/// Returns `None` for absolute paths, `..` components, empty paths and the
/// reserved manifest file name.
pub fn normalize_relative(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains('\0') {
        return None;
    }
    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }

    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    // `C:` style prefixes only parse as Prefix on Windows
    if parts.first().is_some_and(|p| p.ends_with(':')) {
        return None;
    }
    if parts.is_empty() {
        return None;
    }
    let normalized = parts.join("/");
    if normalized == MANIFEST_FILE {
        return None;
    }
    Some(normalized)
}

/// Join a normalized relative path onto `root`.
pub(crate) fn join(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// The first existing entry between `root` and `root/relative` (inclusive)
/// that is a symlink. Writing or reading through it would leave the root.
pub(crate) fn symlinked_component(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    for part in relative.split('/') {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Some(current),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_paths() {
        assert_eq!(normalize_relative("src/a.py").as_deref(), Some("src/a.py"));
        assert_eq!(normalize_relative("./k8s//x.yaml").as_deref(), Some("k8s/x.yaml"));
        assert_eq!(normalize_relative("src\\b.rs").as_deref(), Some("src/b.rs"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for bad in ["", "  ", "/etc/passwd", "../x", "a/../../x", "a/..", ".", "C:/x"] {
            assert_eq!(normalize_relative(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn test_rejects_manifest_name() {
        assert_eq!(normalize_relative(MANIFEST_FILE), None);
        assert_eq!(normalize_relative("./.generation-manifest.json"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_component() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let root = dir.path().join("svc");
        fs::create_dir_all(root.join("src")).unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("tests")).unwrap();

        assert_eq!(symlinked_component(&root, "src/a.py"), None);
        assert_eq!(symlinked_component(&root, "missing/a.py"), None);
        assert_eq!(symlinked_component(&root, "tests/t.py"), Some(root.join("tests")));
        assert_eq!(symlinked_component(&root, "tests"), Some(root.join("tests")));
    }

    #[test]
    fn test_join() {
        assert_eq!(
            join(Path::new("/tmp/root"), "src/a.py"),
            PathBuf::from("/tmp/root/src/a.py")
        );
    }
}
