#![allow(dead_code)]

pub mod temp_files {
    use std::path::{Path, PathBuf};

    /// Write `content` to `dir/name` and return the path.
    pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Every regular file under `root` as `(relative path, bytes)`, sorted.
    pub fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                (rel, std::fs::read(e.path()).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    /// Relative paths and modification times of every file under `root`.
    pub fn mtimes(root: &Path) -> Vec<(String, std::time::SystemTime)> {
        let mut times: Vec<_> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
                (rel, e.metadata().unwrap().modified().unwrap())
            })
            .collect();
        times.sort();
        times
    }

    /// Number of entries in the parent of `root` (staging and backup leftovers
    /// show up here).
    pub fn sibling_count(root: &Path) -> usize {
        std::fs::read_dir(root.parent().unwrap()).unwrap().count()
    }
}

pub mod fixtures {
    use modforge::pipeline::Generator;
    use modforge::render::FixedClock;
    use modforge::spec::ModuleSpec;
    use std::sync::Arc;

    pub const FIXED_TIME: &str = "2024-05-01T12:00:00Z";

    /// Built-in generator with a frozen clock so output is reproducible.
    pub fn generator() -> Generator {
        Generator::builtin()
            .unwrap()
            .with_clock(Arc::new(FixedClock::parse(FIXED_TIME).unwrap()))
    }

    pub fn core_spec(name: &str) -> ModuleSpec {
        ModuleSpec::new(name, "CORE", "commerce")
    }

    pub fn web_api_spec() -> ModuleSpec {
        ModuleSpec::new("user-api", "CORE", "ecommerce").with_pattern("web_api")
    }

    /// A pattern file with one pattern, for reload tests.
    pub fn pattern_file(name: &str, cpu_limit: &str) -> String {
        format!(
            r#"patterns:
  - name: {name}
    description: test pattern
    includes: [container, http_server, long_running]
    resource_profile:
      cpu_request: 100m
      cpu_limit: {cpu_limit}
      memory_request: 128Mi
      memory_limit: 256Mi
    deployment_targets: [kubernetes]
    port: 9000
"#
        )
    }
}

pub mod may_runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(2);
        });
    }
}
