//! # CI Bridge Unit Tests / CI 桥接单元测试
//!
//! Tests for mapping a CI axis value onto a subset of the matrix.
//!
//! 将 CI 维度值映射到矩阵子集的测试。

mod common;

use common::config_from;
use envmatrix::core::bridge::{CiAxisMapping, CiMatrixBridge};
use envmatrix::core::error::{ConfigError, RunError};
use std::collections::BTreeMap;

const CONFIG: &str = r#"
envlist = ["py{38,39}", "lint"]

[defaults]
commands = ["echo hello"]

[ci.map]
"3.8" = ["py38"]
"3.9" = ["py39", "docs"]
"3.10" = ["lint", "py38"]
"#;

#[test]
fn test_resolve_returns_exactly_the_mapped_set() {
    let config = config_from(CONFIG);
    let bridge = CiMatrixBridge::new(config.ci());

    assert_eq!(bridge.resolve("3.8").unwrap(), &["py38"]);
    assert_eq!(bridge.resolve("3.9").unwrap(), &["py39", "docs"]);
}

#[test]
fn test_unknown_axis_value_is_a_hard_error() {
    let config = config_from(CONFIG);
    let bridge = CiMatrixBridge::new(config.ci());

    match bridge.resolve("3.12") {
        Err(RunError::UnmappedAxisValue { value, known }) => {
            assert_eq!(value, "3.12");
            assert_eq!(known, vec!["3.10", "3.8", "3.9"]);
        }
        other => panic!("expected UnmappedAxisValue, got {other:?}"),
    }
}

#[test]
fn test_narrow_keeps_spec_order_and_skips_absent_names() {
    let config = config_from(CONFIG);
    let bridge = CiMatrixBridge::new(config.ci());

    let narrowed = bridge.narrow(config.specs(), "3.10").unwrap();
    let names: Vec<&str> = narrowed.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["py38", "lint"]);

    // `docs` is mapped but not part of the matrix.
    let narrowed = bridge.narrow(config.specs(), "3.9").unwrap();
    let names: Vec<&str> = narrowed.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["py39"]);
}

#[test]
fn test_narrow_to_nothing_is_no_environments_selected() {
    let config = config_from(CONFIG);
    let bridge = CiMatrixBridge::new(config.ci());
    let only_lint: Vec<_> = config
        .specs()
        .iter()
        .filter(|s| s.name() == "lint")
        .cloned()
        .collect();

    let result = bridge.narrow(&only_lint, "3.8");
    assert!(matches!(result, Err(RunError::NoEnvironmentsSelected { .. })));
}

#[test]
fn test_mapping_rejects_empty_lists() {
    let mut entries = BTreeMap::new();
    entries.insert("3.8".to_string(), vec!["py38".to_string()]);
    entries.insert("3.9".to_string(), vec![]);

    let result = CiAxisMapping::new(entries);
    assert!(matches!(result, Err(ConfigError::EmptyAxisMapping { value }) if value == "3.9"));
}
