use modforge::error::ValidationError;
use modforge::registry::PatternRegistry;
use modforge::spec::{self, is_valid_name, DeploymentTarget, Language, ModuleSpec, ModuleType};
use proptest::prelude::*;

fn registry() -> PatternRegistry {
    PatternRegistry::builtin().unwrap()
}

fn code(raw: &ModuleSpec) -> &'static str {
    match spec::validate(raw, &registry().current()) {
        Ok(_) => "OK",
        Err(e) => e.code(),
    }
}

proptest! {
    #[test]
    fn prop_well_formed_names_are_accepted(name in "[a-z][a-z0-9-]{0,62}") {
        prop_assert!(is_valid_name(&name));
        let raw = ModuleSpec::new(name, "CORE", "commerce");
        prop_assert!(spec::validate(&raw, &registry().current()).is_ok());
    }

    #[test]
    fn prop_names_with_foreign_characters_are_rejected(
        prefix in "[a-z]{1,8}",
        bad in "[A-Z_ ./\\\\]",
        suffix in "[a-z]{0,8}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(!is_valid_name(&name));
        let raw = ModuleSpec::new(name, "CORE", "commerce");
        let is_invalid_name = matches!(
            spec::validate(&raw, &registry().current()),
            Err(ValidationError::InvalidName { .. })
        );
        prop_assert!(is_invalid_name);
    }

    #[test]
    fn prop_names_must_start_with_a_letter(first in "[0-9-]", rest in "[a-z0-9-]{0,10}") {
        let name = format!("{first}{rest}");
        prop_assert!(!is_valid_name(&name));
    }
}

#[test]
fn test_name_length_limit() {
    let longest = format!("a{}", "b".repeat(62));
    assert!(is_valid_name(&longest));
    assert!(!is_valid_name(&format!("{longest}c")));
    assert!(!is_valid_name(""));
}

#[test]
fn test_checks_run_in_order() {
    // an invalid name wins over every later problem
    let raw = ModuleSpec::new("Bad", "NOPE", "").with_pattern("missing");
    assert_eq!(code(&raw), "INVALID_NAME");

    let raw = ModuleSpec::new("orders", "NOPE", "").with_pattern("missing");
    assert_eq!(code(&raw), "UNKNOWN_TYPE");

    let raw = ModuleSpec::new("orders", "CORE", "  ").with_pattern("missing");
    assert_eq!(code(&raw), "EMPTY_DOMAIN");

    let raw = ModuleSpec::new("orders", "CORE", "commerce").with_language("cobol");
    assert_eq!(code(&raw), "UNKNOWN_LANGUAGE");

    let raw = ModuleSpec::new("orders", "CORE", "commerce").with_pattern("missing");
    assert_eq!(code(&raw), "UNKNOWN_PATTERN");
}

#[test]
fn test_pattern_combinations() {
    let raw = ModuleSpec::new("job", "SUPPORTING", "ops")
        .with_pattern("web_api")
        .with_extra_pattern("batch_job");
    assert_eq!(code(&raw), "INCOMPATIBLE_PATTERNS");

    let raw = ModuleSpec::new("job", "SUPPORTING", "ops")
        .with_pattern("web_api")
        .with_extra_pattern("web_api");
    assert_eq!(code(&raw), "DUPLICATE_PATTERN");

    let raw = ModuleSpec::new("infer", "INTEGRATION", "ml").with_pattern("ml_inference");
    assert_eq!(code(&raw), "INCOMPATIBLE_PATTERN_TYPE");

    let raw = ModuleSpec::new("api", "CORE", "shop")
        .with_pattern("web_api")
        .with_extra_pattern("event_processor");
    assert_eq!(code(&raw), "OK");
}

#[test]
fn test_deployment_targets() {
    let snapshot = registry().current();
    let check = |raw: ModuleSpec| spec::validate(&raw, &snapshot).unwrap_err();

    let err = check(
        ModuleSpec::new("infer", "CORE", "ml")
            .with_pattern("ml_inference")
            .with_deployment_target("serverless"),
    );
    assert!(matches!(err, ValidationError::UnsupportedDeploymentTarget { ref pattern, .. } if pattern == "ml_inference"));
    assert_eq!(err.code(), "UNSUPPORTED_DEPLOYMENT_TARGET");

    let err = check(
        ModuleSpec::new("api", "CORE", "shop")
            .with_pattern("web_api")
            .with_deployment_target("mainframe"),
    );
    assert!(matches!(err, ValidationError::UnknownDeploymentTarget { .. }));

    let err = check(ModuleSpec::new("api", "CORE", "shop").with_deployment_target("kubernetes"));
    assert!(matches!(err, ValidationError::DeploymentTargetWithoutPattern { .. }));
}

#[test]
fn test_validated_spec_defaults() {
    let snapshot = registry().current();
    let raw = ModuleSpec::new("user-api", "core", "ecommerce").with_pattern("web_api");
    let validated = spec::validate(&raw, &snapshot).unwrap();

    assert_eq!(validated.module_type(), ModuleType::Core);
    assert_eq!(validated.language(), Language::Python);
    assert_eq!(validated.deployment_target(), Some(DeploymentTarget::Kubernetes));
    assert_eq!(validated.pattern_names(), vec!["web_api"]);
    assert!(validated.has_capability("http_server"));
    assert!(validated.spec_hash().starts_with("sha256:"));

    // the hash identifies the normalized request, not its spelling
    let same = ModuleSpec::new("user-api", "CORE", "ecommerce").with_pattern("web_api");
    assert_eq!(
        spec::validate(&same, &snapshot).unwrap().spec_hash(),
        validated.spec_hash()
    );
}

#[test]
fn test_request_files_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("request.yaml");
    std::fs::write(
        &path,
        "name: user-api\ntype: CORE\ndomain: ecommerce\npattern: web_api\n",
    )
    .unwrap();
    let raw = spec::load_request(&path).unwrap();
    assert_eq!(raw, ModuleSpec::new("user-api", "CORE", "ecommerce").with_pattern("web_api"));

    let path = dir.path().join("wave.json");
    std::fs::write(
        &path,
        r#"[{"name": "a", "type": "CORE", "domain": "d"}, {"name": "b", "type": "SUPPORTING", "domain": "d"}]"#,
    )
    .unwrap();
    let wave = spec::load_wave(&path).unwrap();
    assert_eq!(wave.len(), 2);
    assert_eq!(wave[1].module_type, "SUPPORTING");

    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "name: a\ntype: CORE\ncolour: red\n").unwrap();
    assert_eq!(spec::load_request(&path).unwrap_err().code(), "MALFORMED_REQUEST");
}
