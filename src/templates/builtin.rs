//! Template sources embedded at compile time.

pub(super) const CATALOG: &str = include_str!("../../templates/catalog.yaml");

macro_rules! sources {
    ($($path:literal),* $(,)?) => {
        &[$(($path, include_str!(concat!("../../templates/", $path)))),*]
    };
}

static SOURCES: &[(&str, &str)] = sources![
    "python/service.py.j2",
    "python/service_integration.py.j2",
    "python/types.py.j2",
    "python/interface.py.j2",
    "python/init.py.j2",
    "python/pyproject.toml.j2",
    "python/test_service.py.j2",
    "python/test_types.py.j2",
    "python/gitignore.j2",
    "python/pytest.ini.j2",
    "python/api.py.j2",
    "python/handlers.py.j2",
    "python/job.py.j2",
    "python/model.py.j2",
    "rust/service.rs.j2",
    "rust/service_integration.rs.j2",
    "rust/types.rs.j2",
    "rust/interface.rs.j2",
    "rust/lib.rs.j2",
    "rust/Cargo.toml.j2",
    "rust/test_service.rs.j2",
    "rust/test_types.rs.j2",
    "rust/gitignore.j2",
    "rust/nextest.toml.j2",
    "rust/api.rs.j2",
    "rust/handlers.rs.j2",
    "rust/job.rs.j2",
    "rust/model.rs.j2",
    "infra/Dockerfile.python.j2",
    "infra/Dockerfile.rust.j2",
    "infra/dockerignore.j2",
    "infra/deployment.yaml.j2",
    "infra/service.yaml.j2",
    "infra/configmap.yaml.j2",
    "infra/cronjob.yaml.j2",
    "infra/docker-compose.yml.j2",
    "infra/serverless.yml.j2",
    "shared/IMPLEMENTATION_GUIDE.md.j2",
    "shared/event_bus.yaml.j2",
    "shared/ml_gitignore.j2",
];

pub(super) fn source(path: &str) -> Option<&'static str> {
    SOURCES
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, body)| *body)
}
