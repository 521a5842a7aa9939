//! Integration tests for filter translation.
//!
//! These tests run request-shaped `FilterSpec`s against the nine-row
//! permission fixture through the public facade.

mod common;

use common::{Permission, ids, permissions};
use pretty_assertions::assert_eq;
use sift::prelude::*;
use sift::{ErrorCode, translate};

fn matching(filter: FilterSpec) -> Vec<i64> {
    let spec = translate::<Permission>(&filter).unwrap();
    let rows = permissions();
    ids(spec.filter_slice(&rows).unwrap())
}

fn name_filter(operator: FilterOperator, value: &str) -> FilterSpec {
    FilterSpec::new("Name", TypeFamily::String, operator).with_value(value)
}

#[test]
fn test_equals_returns_single_row() {
    let rows = permissions();
    let spec = translate::<Permission>(&name_filter(FilterOperator::Equals, "canEditUser")).unwrap();
    let matched = spec.filter_slice(&rows).unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].name, "canEditUser");
}

#[test]
fn test_not_equal_returns_complement() {
    assert_eq!(matching(name_filter(FilterOperator::NotEqual, "canEditUser")).len(), 8);
}

#[test]
fn test_contains_can() {
    assert_eq!(matching(name_filter(FilterOperator::Contains, "can")), vec![1, 2, 3, 4]);
}

#[test]
fn test_between_is_inclusive() {
    let filter = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Between).with_values(["4", "8"]);
    assert_eq!(matching(filter), vec![4, 5, 6, 7, 8]);
}

#[test]
fn test_string_prefix_and_suffix() {
    assert_eq!(matching(name_filter(FilterOperator::StartsWith, "can")), vec![1, 2, 3, 4]);
    assert_eq!(matching(name_filter(FilterOperator::EndsWith, "Reports")), vec![5, 6]);
}

#[test]
fn test_ordering_comparisons_skip_nulls() {
    let below = FilterSpec::new("Level", TypeFamily::Integer, FilterOperator::LessThan).with_value("2");
    assert_eq!(matching(below), vec![2, 5]);

    let above = FilterSpec::new("Level", TypeFamily::Integer, FilterOperator::GreaterThan).with_value("3");
    assert_eq!(matching(above), vec![3, 7, 9]);
}

#[test]
fn test_not_empty() {
    let level = FilterSpec::new("Level", TypeFamily::Integer, FilterOperator::NotEmpty);
    assert_eq!(matching(level), vec![1, 2, 3, 5, 6, 7, 8, 9]);

    let roles = FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::NotEmpty);
    assert_eq!(matching(roles), vec![1, 2, 3, 5, 6, 8, 9]);
}

#[test]
fn test_set_membership() {
    let any = FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::IncludeAny).with_values(["1", "4"]);
    assert_eq!(matching(any), vec![1, 2, 6, 8, 9]);

    let equals = FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::IncludeEquals).with_values(["2", "1"]);
    assert_eq!(matching(equals), vec![1]);

    let none = FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::IncludeNone).with_values(["1", "2"]);
    assert_eq!(matching(none), vec![4, 5, 6, 7, 8]);
}

#[test]
fn test_boolean_filter() {
    let inactive = FilterSpec::new("Active", TypeFamily::Boolean, FilterOperator::Equals).with_value("false");
    assert_eq!(matching(inactive), vec![7]);
}

#[test]
fn test_ignore_case_translator() {
    let translator = FilterTranslator::new().string_comparison(StringComparison::IgnoreCase);
    let spec = translator
        .translate::<Permission>(&name_filter(FilterOperator::Equals, "ADMINISTER"))
        .unwrap();
    let rows = permissions();
    assert_eq!(ids(spec.filter_slice(&rows).unwrap()), vec![9]);
}

#[test]
fn test_multiple_filters_combine_with_and() {
    let filters = vec![
        name_filter(FilterOperator::StartsWith, "can"),
        FilterSpec::new("Level", TypeFamily::Integer, FilterOperator::GreaterThan).with_value("2"),
    ];
    let spec = FilterTranslator::new().translate_all::<Permission>(&filters).unwrap();
    let rows = permissions();
    assert_eq!(ids(spec.filter_slice(&rows).unwrap()), vec![1, 3]);
}

#[test]
fn test_filter_from_json() {
    let filter: FilterSpec = serde_json::from_str(
        r#"{ "propertyName": "Id", "declaredType": "Integer", "operator": "Between", "values": ["2", "3"] }"#,
    )
    .unwrap();
    assert_eq!(matching(filter), vec![2, 3]);
}

#[test]
fn test_unknown_property() {
    let filter = FilterSpec::new("Nmae", TypeFamily::String, FilterOperator::Equals).with_value("x");
    let err = translate::<Permission>(&filter).unwrap_err();
    assert_eq!(err.code, ErrorCode::PropertyNotFound);
    assert!(err.context.suggestions.iter().any(|s| s.contains("'Name'")));

    // Skipped fields are not properties.
    let err = translate::<Permission>(&FilterSpec::new("Note", TypeFamily::String, FilterOperator::Equals).with_value("x"))
        .unwrap_err();
    assert!(err.is_property_not_found());
}

#[test]
fn test_between_with_one_value() {
    let filter = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Between).with_value("4");
    let err = translate::<Permission>(&filter).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArity);
}

#[test]
fn test_non_numeric_integer_value() {
    let filter = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Equals).with_value("four");
    let err = translate::<Permission>(&filter).unwrap_err();
    assert_eq!(err.code, ErrorCode::ValueParseError);
    assert!(err.message.contains("'four'"));
}

#[test]
fn test_declared_type_mismatch() {
    let filter = FilterSpec::new("Name", TypeFamily::Integer, FilterOperator::Equals).with_value("1");
    assert!(translate::<Permission>(&filter).unwrap_err().is_type_mismatch());
}

#[test]
fn test_operator_not_applicable() {
    let substring = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Contains).with_value("1");
    assert!(translate::<Permission>(&substring).unwrap_err().is_unsupported_operation());

    let ordering = name_filter(FilterOperator::LessThan, "m");
    assert!(translate::<Permission>(&ordering).unwrap_err().is_unsupported_operation());

    let scalar_op_on_set = FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::Equals).with_value("1");
    assert!(translate::<Permission>(&scalar_op_on_set).unwrap_err().is_unsupported_operation());
}

#[test]
fn test_too_many_filters() {
    let filters = vec![name_filter(FilterOperator::Contains, "a"); 3];
    let err = FilterTranslator::new()
        .max_filters(2)
        .translate_all::<Permission>(&filters)
        .unwrap_err();
    assert!(err.is_invalid_arity());
}

#[derive(Debug, Clone, Entity)]
struct Invoice {
    id: uuid::Uuid,
    issued: chrono::DateTime<chrono::Utc>,
    total: rust_decimal::Decimal,
}

fn invoices() -> Vec<Invoice> {
    let at = |day: u32| chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 1, day, 9, 30, 0).unwrap();
    vec![
        Invoice {
            id: uuid::Uuid::from_u128(1),
            issued: at(3),
            total: rust_decimal::Decimal::new(1250, 2),
        },
        Invoice {
            id: uuid::Uuid::from_u128(2),
            issued: at(15),
            total: rust_decimal::Decimal::new(9999, 2),
        },
        Invoice {
            id: uuid::Uuid::from_u128(3),
            issued: at(28),
            total: rust_decimal::Decimal::new(25000, 2),
        },
    ]
}

fn invoice_ids(filter: FilterSpec) -> Vec<u128> {
    let spec = translate::<Invoice>(&filter).unwrap();
    let rows = invoices();
    spec.filter_slice(&rows).unwrap().iter().map(|i| i.id.as_u128()).collect()
}

#[test]
fn test_date_decimal_and_uuid_literals() {
    let after = FilterSpec::new("Issued", TypeFamily::DateTime, FilterOperator::GreaterThan).with_value("2024-01-15");
    assert_eq!(invoice_ids(after), vec![2, 3]);

    let window = FilterSpec::new("Issued", TypeFamily::DateTime, FilterOperator::Between)
        .with_values(["2024-01-01T00:00:00Z", "2024-01-15T09:30:00+00:00"]);
    assert_eq!(invoice_ids(window), vec![1, 2]);

    let totals = FilterSpec::new("Total", TypeFamily::Decimal, FilterOperator::LessThan).with_value("99.99");
    assert_eq!(invoice_ids(totals), vec![1]);

    let by_id = FilterSpec::new("Id", TypeFamily::Uuid, FilterOperator::Equals)
        .with_value("00000000-0000-0000-0000-000000000003");
    assert_eq!(invoice_ids(by_id), vec![3]);

    let bad_date = FilterSpec::new("Issued", TypeFamily::DateTime, FilterOperator::Equals).with_value("yesterday");
    assert!(translate::<Invoice>(&bad_date).unwrap_err().is_value_parse());
}
