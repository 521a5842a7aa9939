//! Integration tests for configuration parsing and handling.
//!
//! These tests verify that engine configuration loads from TOML and that
//! its limits reach the translator, the order builder and request plans.

mod common;

use std::io::Write;

use common::{Permission, ids, permissions};
use pretty_assertions::assert_eq;
use sift::prelude::*;
use sift::ErrorCode;

/// Test empty configuration
#[test]
fn test_config_empty_uses_defaults() {
    let config: EngineConfig = "".parse().expect("Failed to parse config");
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.paging.default_page_size, 50);
    assert_eq!(config.paging.max_page_size, 500);
    assert_eq!(config.filters.string_comparison, StringComparison::Ordinal);
}

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config: EngineConfig = r#"
        [filters]
        max_filters = 4
        string_comparison = "ignore_case"

        [ordering]
        max_sort_keys = 2

        [paging]
        default_page_size = 10
        max_page_size = 100
    "#
    .parse()
    .expect("Failed to parse config");

    assert_eq!(config.filters.max_filters, 4);
    assert_eq!(config.filters.string_comparison, StringComparison::IgnoreCase);
    assert_eq!(config.ordering.max_sort_keys, 2);
    assert_eq!(config.paging.default_page_size, 10);
    assert_eq!(config.paging.max_page_size, 100);
}

/// Test loading from a file on disk
#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "[paging]\ndefault_page_size = 2").expect("Failed to write config");

    let config = EngineConfig::from_file(file.path()).expect("Failed to load config");
    assert_eq!(config.paging.default_page_size, 2);

    let request = QueryRequest::new().sort(SortSpec::new().then(SortKey::desc("Id")));
    let plan = QueryPlan::<Permission>::from_request(&request, &config).unwrap();
    let page = plan.apply(MemorySource::new(permissions())).unwrap().into_vec();
    assert_eq!(ids(&page), vec![9, 8]);
}

/// Test a missing file
#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let err = EngineConfig::from_file(dir.path().join("sift.toml")).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    assert!(err.message.contains("sift.toml"));
}

/// Test that unset environment references are left as written
#[test]
fn test_config_unset_env_reference() {
    let err = r#"
        [filters]
        string_comparison = "${SIFT_TEST_SURELY_UNSET_VARIABLE}"
    "#
    .parse::<EngineConfig>()
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
}

/// Test unknown keys and sections
#[test]
fn test_config_rejects_unknown_keys() {
    assert!("[database]\nurl = \"postgres://localhost\"".parse::<EngineConfig>().is_err());
    assert!("[paging]\npage_size = 10".parse::<EngineConfig>().is_err());
}

/// Test inconsistent limits
#[test]
fn test_config_validation() {
    let err = "[paging]\ndefault_page_size = 600".parse::<EngineConfig>().unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    assert!(err.context.help.is_some());

    assert!("[ordering]\nmax_sort_keys = 0".parse::<EngineConfig>().is_err());
    assert!("[filters]\nmax_filters = 0".parse::<EngineConfig>().is_err());
}

/// Test that configured limits apply to requests
#[test]
fn test_config_limits_apply_to_plans() {
    let config: EngineConfig = "[filters]\nmax_filters = 1\n[ordering]\nmax_sort_keys = 1"
        .parse()
        .unwrap();

    let filter = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::GreaterThan).with_value("1");
    let too_many_filters = QueryRequest::new().filter(filter.clone()).filter(filter);
    let err = QueryPlan::<Permission>::from_request(&too_many_filters, &config).unwrap_err();
    assert!(err.is_invalid_arity());

    let too_many_keys = QueryRequest::new().sort(SortSpec::new().then(SortKey::asc("Id")).then(SortKey::asc("Name")));
    let err = QueryPlan::<Permission>::from_request(&too_many_keys, &config).unwrap_err();
    assert!(err.is_invalid_arity());
}
