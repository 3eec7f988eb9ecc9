use criterion::{criterion_group, criterion_main, Criterion};
use modforge::pipeline::{GenerationRequest, Generator};
use modforge::render::FixedClock;
use modforge::spec::ModuleSpec;
use modforge::tree::CollisionPolicy;
use std::hint::black_box;

fn web_api_spec() -> ModuleSpec {
    ModuleSpec::new("user-api", "CORE", "ecommerce")
        .with_pattern("web_api")
        .with_extra_pattern("event_processor")
}

fn bench_resolve_and_render(c: &mut Criterion) {
    let generator = Generator::builtin().expect("built-in registry");
    let clock = FixedClock::epoch();
    let spec = generator.validate(&web_api_spec()).expect("valid spec");

    c.bench_function("validate", |b| {
        b.iter(|| black_box(generator.validate(&web_api_spec()).is_ok()))
    });

    c.bench_function("resolve", |b| {
        b.iter(|| black_box(generator.resolve(&spec).map(|r| r.len()).unwrap_or(0)))
    });

    let resolution = generator.resolve(&spec).expect("resolvable spec");
    c.bench_function("render_all", |b| {
        b.iter(|| {
            for binding in &resolution.bindings {
                let out = generator
                    .engine()
                    .render(&binding.template, &binding.render_context, &clock);
                black_box(&out);
            }
        })
    });
}

fn bench_generate(c: &mut Criterion) {
    let generator = Generator::builtin().expect("built-in registry");
    let dir = tempfile::tempdir().expect("tempdir");
    let request =
        GenerationRequest::under(web_api_spec(), dir.path()).with_policy(CollisionPolicy::Overwrite);

    c.bench_function("generate_overwrite", |b| {
        b.iter(|| black_box(generator.generate(&request).success))
    });
}

criterion_group!(benches, bench_resolve_and_render, bench_generate);
criterion_main!(benches);
