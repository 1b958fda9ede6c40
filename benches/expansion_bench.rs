use criterion::{Criterion, criterion_group, criterion_main};
use envmatrix::core::config::ConfigModel;
use envmatrix::core::expander::parse_pattern;
use envmatrix::core::planner::plan_execution;
use std::hint::black_box;

const CONFIG: &str = r#"
envlist = ["py{38,39,310,311,312}-django{32,42,50}-{sqlite,postgres,mysql}", "lint", "docs"]

[defaults]
isolate = false
commands = ["pytest -q"]

[[env]]
pattern = "py{38,39,310,311,312}-django{32,42,50}-postgres"
setenv = { DATABASE = "postgres" }

[ci.map]
"3.8" = ["py38-django32-sqlite", "py38-django42-sqlite"]
"3.12" = ["py312-django50-sqlite", "py312-django50-postgres", "py312-django50-mysql"]
"#;

fn bench_expand_pattern(c: &mut Criterion) {
    let pattern = "py{38,39,310,311,312}-django{32,42,50}-{sqlite,postgres,mysql}-{unit,integ}";

    c.bench_function("expand_pattern", |b| {
        b.iter(|| {
            let parsed = parse_pattern(black_box(pattern)).unwrap();
            black_box(parsed.expand_names())
        });
    });
}

fn bench_load_config(c: &mut Criterion) {
    c.bench_function("load_config", |b| {
        b.iter(|| black_box(CONFIG).parse::<ConfigModel>().unwrap());
    });
}

fn bench_plan(c: &mut Criterion) {
    let config: ConfigModel = CONFIG.parse().unwrap();
    let selectors = vec!["py{38,312}-django{42,50}-postgres".to_string()];

    c.bench_function("plan_selectors", |b| {
        b.iter(|| plan_execution(&config, Some(black_box(selectors.as_slice())), None).unwrap());
    });
    c.bench_function("plan_axis", |b| {
        b.iter(|| plan_execution(&config, None, Some(black_box("3.12"))).unwrap());
    });
}

criterion_group!(benches, bench_expand_pattern, bench_load_config, bench_plan);
criterion_main!(benches);
