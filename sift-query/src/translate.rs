//! Declarative property filters.
//!
//! A [`FilterSpec`] is the request-level description of a single-property
//! condition. [`FilterTranslator`] resolves it against entity metadata,
//! validates it and turns it into a [`Specification`].
//!
//! Validation runs in a fixed order, so a request with several problems
//! always reports the same one: property resolution, declared type,
//! operator applicability, arity, then literal parsing.
//!
//! ```rust
//! use sift_query::translate::{FilterOperator, FilterSpec, FilterTranslator};
//! use sift_query::TypeFamily;
//! # use sift_query::entity::{Entity, EntityMetadata};
//! # use std::sync::OnceLock;
//! # struct Permission { id: i64 }
//! # impl Entity for Permission {
//! #     fn metadata() -> &'static EntityMetadata<Self> {
//! #         static M: OnceLock<EntityMetadata<Permission>> = OnceLock::new();
//! #         M.get_or_init(|| EntityMetadata::builder("Permission").field("Id", |p: &Permission| &p.id).build())
//! #     }
//! # }
//!
//! let filter = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Between).with_values(["4", "8"]);
//! let spec = FilterTranslator::new().translate::<Permission>(&filter).unwrap();
//! assert!(spec.is_satisfied_by(&Permission { id: 5 }).unwrap());
//! assert!(!spec.is_satisfied_by(&Permission { id: 9 }).unwrap());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::specification::Specification;
use crate::tree::{Condition, Operand};
use crate::value::{PropertyType, StringComparison, TypeFamily, Value};

/// Filter operators accepted in requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Exact equality.
    Equals,
    /// Negated equality.
    NotEqual,
    /// Substring.
    Contains,
    /// Prefix.
    StartsWith,
    /// Suffix.
    EndsWith,
    /// Neither null nor the family default.
    NotEmpty,
    /// Strictly less.
    LessThan,
    /// Strictly greater.
    GreaterThan,
    /// Inclusive range.
    Between,
    /// Value sets intersect.
    IncludeAny,
    /// Value sets are equal.
    IncludeEquals,
    /// Value sets are disjoint.
    IncludeNone,
}

/// Number of literals an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Literals are ignored.
    Ignored,
    /// Exactly this many.
    Exactly(usize),
    /// Any number.
    Any,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignored => f.write_str("no"),
            Self::Exactly(n) => write!(f, "exactly {}", n),
            Self::Any => f.write_str("any number of"),
        }
    }
}

impl FilterOperator {
    /// The operator name as written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "Equals",
            Self::NotEqual => "NotEqual",
            Self::Contains => "Contains",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::NotEmpty => "NotEmpty",
            Self::LessThan => "LessThan",
            Self::GreaterThan => "GreaterThan",
            Self::Between => "Between",
            Self::IncludeAny => "IncludeAny",
            Self::IncludeEquals => "IncludeEquals",
            Self::IncludeNone => "IncludeNone",
        }
    }

    /// Literals expected by the operator.
    pub fn arity(&self) -> Arity {
        match self {
            Self::NotEmpty => Arity::Ignored,
            Self::Between => Arity::Exactly(2),
            Self::IncludeAny | Self::IncludeEquals | Self::IncludeNone => Arity::Any,
            _ => Arity::Exactly(1),
        }
    }

    /// Whether the operator is a set-membership test.
    pub fn is_set_operator(&self) -> bool {
        matches!(self, Self::IncludeAny | Self::IncludeEquals | Self::IncludeNone)
    }

    /// Check the operator against a property type.
    fn check_applicable(&self, property: &str, ty: PropertyType) -> QueryResult<()> {
        let supported = if ty.is_collection() {
            self.is_set_operator() || *self == Self::NotEmpty
        } else {
            match self {
                Self::Contains | Self::StartsWith | Self::EndsWith => ty.family.is_textual(),
                Self::LessThan | Self::GreaterThan | Self::Between => ty.family.is_ordered(),
                _ => true,
            }
        };

        if supported {
            Ok(())
        } else {
            Err(QueryError::unsupported_operation(
                property,
                format!("{} is not supported on property '{}' of type {}", self, property, ty),
            ))
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-property filter as received in a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Property name, matched case-sensitively.
    pub property_name: String,
    /// Declared type of the literals.
    pub declared_type: TypeFamily,
    /// Operator.
    pub operator: FilterOperator,
    /// Single literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Multiple literals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl FilterSpec {
    /// A filter without literals.
    pub fn new(property_name: impl Into<String>, declared_type: TypeFamily, operator: FilterOperator) -> Self {
        Self {
            property_name: property_name.into(),
            declared_type,
            operator,
            value: None,
            values: Vec::new(),
        }
    }

    /// Set the single literal.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set the literal list.
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// All literals, `value` first.
    pub fn literals(&self) -> Vec<&str> {
        self.value
            .iter()
            .chain(self.values.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Default limit on filters per request.
pub const DEFAULT_MAX_FILTERS: usize = 32;

/// Turns [`FilterSpec`]s into specifications.
#[derive(Debug, Clone, Copy)]
pub struct FilterTranslator {
    string_comparison: StringComparison,
    max_filters: usize,
}

impl Default for FilterTranslator {
    fn default() -> Self {
        Self {
            string_comparison: StringComparison::Ordinal,
            max_filters: DEFAULT_MAX_FILTERS,
        }
    }
}

impl FilterTranslator {
    /// Ordinal string comparison, default filter limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translator configured from `config.filters`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            string_comparison: config.filters.string_comparison,
            max_filters: config.filters.max_filters,
        }
    }

    /// Set the string comparison mode.
    pub fn string_comparison(mut self, comparison: StringComparison) -> Self {
        self.string_comparison = comparison;
        self
    }

    /// Set the maximum number of filters accepted by `translate_all`.
    pub fn max_filters(mut self, max: usize) -> Self {
        self.max_filters = max;
        self
    }

    /// Translate one filter.
    pub fn translate<T: Entity>(&self, filter: &FilterSpec) -> QueryResult<Specification<T>> {
        let entity = T::metadata().name();
        self.translate_inner::<T>(filter).map_err(|err| {
            err.with_entity(entity)
                .with_context(format!("Translating {} filter on '{}'", filter.operator, filter.property_name))
        })
    }

    fn translate_inner<T: Entity>(&self, filter: &FilterSpec) -> QueryResult<Specification<T>> {
        let property = T::metadata().resolve_property(&filter.property_name)?;
        let name = property.name();
        let ty = property.ty();

        if filter.declared_type != ty.family {
            return Err(QueryError::type_mismatch(name, filter.declared_type, ty.family));
        }

        let operator = filter.operator;
        operator.check_applicable(name, ty)?;

        let literals = filter.literals();
        if let Arity::Exactly(expected) = operator.arity() {
            if literals.len() != expected {
                return Err(QueryError::invalid_arity(operator, expected, literals.len()).with_property(name));
            }
        }

        let values: Vec<Value> = match operator.arity() {
            Arity::Ignored => Vec::new(),
            _ => literals
                .iter()
                .map(|raw| ty.family.parse(raw).map_err(|err| err.with_property(name)))
                .collect::<QueryResult<_>>()?,
        };

        debug!(
            entity = T::metadata().name(),
            property = name,
            operator = operator.as_str(),
            values = values.len(),
            "translating filter"
        );

        let comparison = self.string_comparison;
        Specification::build(|x| {
            let operand = x.property(name)?.with_comparison(comparison);
            Ok(condition(&operand, operator, values))
        })
    }

    /// Translate several filters and combine them with AND.
    ///
    /// An empty list yields a specification satisfied by everything.
    pub fn translate_all<T: Entity>(&self, filters: &[FilterSpec]) -> QueryResult<Specification<T>> {
        if filters.len() > self.max_filters {
            return Err(QueryError::invalid_arity(
                "Filter list",
                format!("at most {}", self.max_filters),
                filters.len(),
            )
            .with_entity(T::metadata().name()));
        }

        let specs = filters
            .iter()
            .map(|filter| self.translate::<T>(filter))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Specification::all(&specs))
    }
}

fn condition(operand: &Operand, operator: FilterOperator, values: Vec<Value>) -> Condition {
    let mut values = values.into_iter();
    let mut next = || values.next().unwrap_or(Value::Null);

    match operator {
        FilterOperator::Equals => operand.eq(next()),
        FilterOperator::NotEqual => operand.ne(next()),
        FilterOperator::Contains => operand.contains(text(next())),
        FilterOperator::StartsWith => operand.starts_with(text(next())),
        FilterOperator::EndsWith => operand.ends_with(text(next())),
        FilterOperator::NotEmpty => operand.not_empty(),
        FilterOperator::LessThan => operand.lt(next()),
        FilterOperator::GreaterThan => operand.gt(next()),
        FilterOperator::Between => {
            let low = next();
            let high = next();
            operand.between(low, high)
        }
        FilterOperator::IncludeAny => operand.overlaps(values),
        FilterOperator::IncludeEquals => operand.set_equals(values),
        FilterOperator::IncludeNone => operand.overlaps(values).not(),
    }
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Translate one filter with the default translator.
pub fn translate<T: Entity>(filter: &FilterSpec) -> QueryResult<Specification<T>> {
    FilterTranslator::new().translate(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::fixtures::{Permission, permissions};
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    fn ids(filter: FilterSpec) -> Vec<i64> {
        let spec = translate::<Permission>(&filter).unwrap();
        spec.filter_slice(&permissions()).unwrap().iter().map(|p| p.id).collect()
    }

    fn code(filter: FilterSpec) -> ErrorCode {
        translate::<Permission>(&filter).unwrap_err().code
    }

    #[test]
    fn test_string_operators() {
        let name = |op| FilterSpec::new("Name", TypeFamily::String, op);
        assert_eq!(ids(name(FilterOperator::Equals).with_value("canEditUser")), vec![1]);
        assert_eq!(ids(name(FilterOperator::NotEqual).with_value("canEditUser")).len(), 8);
        assert_eq!(ids(name(FilterOperator::Contains).with_value("can")), vec![1, 2, 3, 4]);
        assert_eq!(ids(name(FilterOperator::StartsWith).with_value("view")), vec![8]);
        assert_eq!(ids(name(FilterOperator::EndsWith).with_value("Billing")), vec![7]);
    }

    #[test]
    fn test_ordering_operators() {
        let id = |op| FilterSpec::new("Id", TypeFamily::Integer, op);
        assert_eq!(ids(id(FilterOperator::Between).with_values(["4", "8"])), vec![4, 5, 6, 7, 8]);
        assert_eq!(ids(id(FilterOperator::LessThan).with_value("3")), vec![1, 2]);
        assert_eq!(ids(id(FilterOperator::GreaterThan).with_value("7")), vec![8, 9]);
        // `value` and `values` merge, value first.
        assert_eq!(ids(id(FilterOperator::Between).with_value("2").with_values(["3"])), vec![2, 3]);
    }

    #[test]
    fn test_not_empty_ignores_values() {
        let level = FilterSpec::new("Level", TypeFamily::Integer, FilterOperator::NotEmpty).with_value("junk");
        assert_eq!(ids(level), vec![1, 2, 3, 5, 6, 7, 8, 9]);
        let roles = FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::NotEmpty);
        assert_eq!(ids(roles), vec![1, 2, 3, 5, 6, 8, 9]);
    }

    #[test]
    fn test_set_operators() {
        let roles = |op| FilterSpec::new("Roles", TypeFamily::Integer, op);
        assert_eq!(ids(roles(FilterOperator::IncludeAny).with_values(["2", "4"])), vec![1, 3, 6, 8, 9]);
        assert_eq!(ids(roles(FilterOperator::IncludeEquals).with_values(["3", "4"])), vec![6]);
        assert_eq!(ids(roles(FilterOperator::IncludeNone).with_values(["1", "2"])), vec![4, 5, 6, 7, 8]);
        assert_eq!(ids(roles(FilterOperator::IncludeEquals)), vec![4, 7]);
    }

    #[test]
    fn test_set_operators_on_scalar() {
        let id = FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::IncludeAny).with_values(["2", "9", "42"]);
        assert_eq!(ids(id), vec![2, 9]);
        let level = FilterSpec::new("Level", TypeFamily::Integer, FilterOperator::IncludeNone).with_values(["5"]);
        assert_eq!(ids(level), vec![1, 2, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_ignore_case_translator() {
        let translator = FilterTranslator::new().string_comparison(StringComparison::IgnoreCase);
        let filter = FilterSpec::new("Name", TypeFamily::String, FilterOperator::Equals).with_value("CANEXPORT");
        let spec = translator.translate::<Permission>(&filter).unwrap();
        let matched: Vec<i64> = spec.filter_slice(&permissions()).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(matched, vec![4]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            code(FilterSpec::new("Nmae", TypeFamily::String, FilterOperator::Equals).with_value("x")),
            ErrorCode::PropertyNotFound
        );
        assert_eq!(
            code(FilterSpec::new("Name", TypeFamily::Integer, FilterOperator::Equals).with_value("1")),
            ErrorCode::TypeMismatch
        );
        assert_eq!(
            code(FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Contains).with_value("1")),
            ErrorCode::UnsupportedOperation
        );
        assert_eq!(
            code(FilterSpec::new("Name", TypeFamily::String, FilterOperator::LessThan).with_value("b")),
            ErrorCode::UnsupportedOperation
        );
        assert_eq!(
            code(FilterSpec::new("Roles", TypeFamily::Integer, FilterOperator::Equals).with_value("1")),
            ErrorCode::UnsupportedOperation
        );
        assert_eq!(
            code(FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Between).with_value("4")),
            ErrorCode::InvalidArity
        );
        assert_eq!(
            code(FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Equals)),
            ErrorCode::InvalidArity
        );
        assert_eq!(
            code(FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Equals).with_value("four")),
            ErrorCode::ValueParseError
        );
    }

    #[test]
    fn test_error_context() {
        let err = translate::<Permission>(
            &FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Equals).with_value("four"),
        )
        .unwrap_err();
        assert_eq!(err.context.entity.as_deref(), Some("Permission"));
        assert_eq!(err.context.property.as_deref(), Some("Id"));
        assert!(err.context.operation.as_deref().unwrap().contains("Equals"));
    }

    #[test]
    fn test_translate_all() {
        let filters = vec![
            FilterSpec::new("Name", TypeFamily::String, FilterOperator::Contains).with_value("can"),
            FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::GreaterThan).with_value("2"),
        ];
        let spec = FilterTranslator::new().translate_all::<Permission>(&filters).unwrap();
        let matched: Vec<i64> = spec.filter_slice(&permissions()).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(matched, vec![3, 4]);

        let everything = FilterTranslator::new().translate_all::<Permission>(&[]).unwrap();
        assert_eq!(everything.filter_slice(&permissions()).unwrap().len(), 9);

        let err = FilterTranslator::new()
            .max_filters(1)
            .translate_all::<Permission>(&filters)
            .unwrap_err();
        assert!(err.is_invalid_arity());
    }

    #[test]
    fn test_filter_spec_json() {
        let filter: FilterSpec = serde_json::from_str(
            r#"{"propertyName":"Id","declaredType":"Integer","operator":"Between","values":["4","8"]}"#,
        )
        .unwrap();
        assert_eq!(
            filter,
            FilterSpec::new("Id", TypeFamily::Integer, FilterOperator::Between).with_values(["4", "8"])
        );
        let json = serde_json::to_string(&FilterSpec::new("Name", TypeFamily::String, FilterOperator::Equals).with_value("a"))
            .unwrap();
        assert_eq!(json, r#"{"propertyName":"Name","declaredType":"String","operator":"Equals","value":"a"}"#);
    }
}
