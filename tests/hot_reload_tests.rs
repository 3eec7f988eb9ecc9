use modforge::hot_reload::watch_patterns;
use modforge::registry::{PatternRegistry, PatternSource};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;
use common::fixtures::pattern_file;
use common::temp_files::write;

#[test]
fn test_watch_patterns_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "patterns.yaml", &pattern_file("edge_api", "750m"));
    let registry = Arc::new(PatternRegistry::from_source(&PatternSource::File(path.clone())).unwrap());

    let updates: Arc<Mutex<Vec<Result<u64, String>>>> = Arc::new(Mutex::new(Vec::new()));
    let updates_clone = Arc::clone(&updates);

    let watcher = watch_patterns(&path, Arc::clone(&registry), move |outcome| {
        let entry = match outcome {
            Ok(version) => Ok(version.version),
            Err(e) => Err(e.code().to_string()),
        };
        updates_clone.lock().unwrap().push(entry);
    })
    .expect("watch_patterns");

    // allow watcher thread to start
    std::thread::sleep(Duration::from_millis(100));

    std::fs::write(&path, pattern_file("edge_api", "1500m")).unwrap();

    let mut reloaded = false;
    for _ in 0..40 {
        if registry
            .lookup("edge_api")
            .map(|p| p.resource_profile.cpu_limit == "1500m")
            .unwrap_or(false)
        {
            reloaded = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(reloaded, "registry was not reloaded");
    assert!(registry.version().version >= 2);
    assert!(updates.lock().unwrap().iter().any(|u| u.is_ok()));

    drop(watcher);
}

#[test]
fn test_watch_keeps_previous_snapshot_on_bad_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "patterns.yaml", &pattern_file("edge_api", "750m"));
    let registry = Arc::new(PatternRegistry::from_source(&PatternSource::File(path.clone())).unwrap());

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = Arc::clone(&errors);
    let watcher = watch_patterns(&path, Arc::clone(&registry), move |outcome| {
        if let Err(e) = outcome {
            errors_clone.lock().unwrap().push(e.code().to_string());
        }
    })
    .expect("watch_patterns");

    std::thread::sleep(Duration::from_millis(100));
    std::fs::write(&path, "patterns: [").unwrap();

    for _ in 0..40 {
        if !errors.lock().unwrap().is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(errors.lock().unwrap().iter().any(|c| c == "REGISTRY_PARSE"));
    assert_eq!(
        registry.lookup("edge_api").unwrap().resource_profile.cpu_limit,
        "750m"
    );

    drop(watcher);
}

#[test]
fn test_watch_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(PatternRegistry::builtin().unwrap());
    let result = watch_patterns(dir.path().join("absent.yaml"), registry, |_| {});
    assert!(result.is_err());
}
