//! Dynamic multi-key ordering.
//!
//! Sort configuration arrives as data: a [`SortSpec`], an ordered list of
//! `(property, direction)` pairs. [`OrderBuilder`] resolves each key against
//! entity metadata, picks a typed comparator from the property's family and
//! drives a [`QuerySource`] with `order_by` for the first key and `then_by`
//! for each tie-breaker.
//!
//! The resulting order equals sorting by the composite tuple of all keys,
//! each in its own direction. Rows tied on every key keep their source order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::entity::{Entity, Property};
use crate::error::{QueryError, QueryResult};
use crate::source::QuerySource;
use crate::value::{TypeFamily, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Null handling in sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    /// Nulls appear first in the results.
    First,
    /// Nulls appear last in the results.
    Last,
}

impl NullsOrder {
    /// Get the SQL clause for this null order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// One sort key as received in a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    /// Property name, matched case-sensitively.
    pub property_name: String,
    /// Sort descending.
    #[serde(default)]
    pub descending: bool,
    /// Explicit null placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullsOrder>,
}

impl SortKey {
    /// An ascending key.
    pub fn asc(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            descending: false,
            nulls: None,
        }
    }

    /// A descending key.
    pub fn desc(property_name: impl Into<String>) -> Self {
        Self {
            descending: true,
            ..Self::asc(property_name)
        }
    }

    /// Set null placement.
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// The sort direction.
    pub fn order(&self) -> SortOrder {
        if self.descending { SortOrder::Desc } else { SortOrder::Asc }
    }

    /// Null placement, defaulting to the natural order reversed by direction:
    /// first when ascending, last when descending.
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(if self.descending {
            NullsOrder::Last
        } else {
            NullsOrder::First
        })
    }
}

/// An ordered list of sort keys; the first is primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(Vec<SortKey>);

impl SortSpec {
    /// An empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tie-breaker key.
    pub fn then(mut self, key: SortKey) -> Self {
        self.0.push(key);
        self
    }

    /// The keys, primary first.
    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the spec has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SortKey>> for SortSpec {
    fn from(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }
}

impl FromIterator<SortKey> for SortSpec {
    fn from_iter<I: IntoIterator<Item = SortKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SortSpec {
    type Item = &'a SortKey;
    type IntoIter = std::slice::Iter<'a, SortKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Comparator over two non-null values of one family.
pub type Comparator = fn(&Value, &Value) -> Ordering;

/// The natural-order comparator for a family.
pub fn comparator_for(family: TypeFamily) -> Comparator {
    match family {
        TypeFamily::String => compare_strings,
        TypeFamily::Integer | TypeFamily::Decimal => compare_numbers,
        TypeFamily::Boolean => compare_booleans,
        TypeFamily::DateTime => compare_datetimes,
        TypeFamily::Uuid => compare_uuids,
    }
}

fn compare_strings(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => a.cmp(b),
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or_else(|| a.cmp(b))
}

fn compare_booleans(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => a.cmp(b),
    }
}

fn compare_datetimes(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        _ => a.cmp(b),
    }
}

fn compare_uuids(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
        _ => a.cmp(b),
    }
}

/// A sort key resolved against `T`'s metadata.
pub struct OrderKey<T> {
    property: Property<T>,
    descending: bool,
    nulls: NullsOrder,
    comparator: Comparator,
}

impl<T: Entity> OrderKey<T> {
    /// Resolve a request key.
    ///
    /// Fails with `PropertyNotFound` for unknown names and with
    /// `UnsupportedOperation` for collection properties.
    pub fn resolve(key: &SortKey) -> QueryResult<Self> {
        let property = T::metadata().resolve_property(&key.property_name)?;
        let ty = property.ty();
        if ty.is_collection() {
            return Err(QueryError::unsupported_operation(
                property.name(),
                format!("Cannot sort by collection property '{}' of type {}", property.name(), ty),
            )
            .with_entity(T::metadata().name()));
        }

        Ok(Self {
            property: property.clone(),
            descending: key.descending,
            nulls: key.effective_nulls(),
            comparator: comparator_for(ty.family),
        })
    }

    /// Property name.
    pub fn property_name(&self) -> &'static str {
        self.property.name()
    }

    /// Whether the key sorts descending.
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    /// Read the sort value of an entity.
    pub fn extract(&self, entity: &T) -> Value {
        self.property.get(entity)
    }

    /// Compare two extracted sort values.
    pub fn compare_values(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.nulls {
                NullsOrder::First => Ordering::Less,
                NullsOrder::Last => Ordering::Greater,
            },
            (false, true) => match self.nulls {
                NullsOrder::First => Ordering::Greater,
                NullsOrder::Last => Ordering::Less,
            },
            (false, false) => {
                let ordering = (self.comparator)(a, b);
                if self.descending { ordering.reverse() } else { ordering }
            }
        }
    }

    /// Compare two entities by this key.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.compare_values(&self.extract(a), &self.extract(b))
    }
}

impl<T> Clone for OrderKey<T> {
    fn clone(&self) -> Self {
        Self {
            property: self.property.clone(),
            descending: self.descending,
            nulls: self.nulls,
            comparator: self.comparator,
        }
    }
}

impl<T> fmt::Debug for OrderKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderKey")
            .field("property", &self.property.name())
            .field("descending", &self.descending)
            .field("nulls", &self.nulls)
            .finish()
    }
}

impl<T> fmt::Display for OrderKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = if self.descending { SortOrder::Desc } else { SortOrder::Asc };
        write!(f, "{} {} {}", self.property.name(), order, self.nulls.as_sql())
    }
}

/// Several keys folded into one comparator.
pub struct CompositeOrder<T> {
    keys: Vec<OrderKey<T>>,
}

impl<T: Entity> CompositeOrder<T> {
    /// Order by the given keys, primary first.
    pub fn new(keys: Vec<OrderKey<T>>) -> Self {
        Self { keys }
    }

    /// Append a tie-breaker.
    pub fn push(&mut self, key: OrderKey<T>) {
        self.keys.push(key);
    }

    /// The keys, primary first.
    pub fn keys(&self) -> &[OrderKey<T>] {
        &self.keys
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop all keys.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Sort values of an entity, one per key.
    pub fn extract(&self, entity: &T) -> Vec<Value> {
        self.keys.iter().map(|key| key.extract(entity)).collect()
    }

    /// Compare two extracted value tuples.
    pub fn compare_values(&self, a: &[Value], b: &[Value]) -> Ordering {
        self.keys
            .iter()
            .zip(a.iter().zip(b.iter()))
            .fold(Ordering::Equal, |acc, (key, (a, b))| {
                acc.then_with(|| key.compare_values(a, b))
            })
    }

    /// Compare two entities.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.keys
            .iter()
            .fold(Ordering::Equal, |acc, key| acc.then_with(|| key.compare(a, b)))
    }

    /// Stable sort of `rows`; each sort value is read once per row.
    pub fn sort(&self, rows: Vec<T>) -> Vec<T> {
        if self.keys.is_empty() {
            return rows;
        }
        let mut decorated: Vec<(Vec<Value>, T)> =
            rows.into_iter().map(|row| (self.extract(&row), row)).collect();
        decorated.sort_by(|(a, _), (b, _)| self.compare_values(a, b));
        decorated.into_iter().map(|(_, row)| row).collect()
    }
}

impl<T> Clone for CompositeOrder<T> {
    fn clone(&self) -> Self {
        Self { keys: self.keys.clone() }
    }
}

impl<T> Default for CompositeOrder<T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<T> fmt::Debug for CompositeOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys.iter()).finish()
    }
}

impl<T> fmt::Display for CompositeOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// Default limit on sort keys per request.
pub const DEFAULT_MAX_SORT_KEYS: usize = 8;

/// Applies [`SortSpec`]s to query sources.
#[derive(Debug, Clone, Copy)]
pub struct OrderBuilder {
    max_sort_keys: usize,
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self {
            max_sort_keys: DEFAULT_MAX_SORT_KEYS,
        }
    }
}

impl OrderBuilder {
    /// Builder with the default key limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder configured from `config.ordering`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_sort_keys: config.ordering.max_sort_keys,
        }
    }

    /// Set the maximum number of keys.
    pub fn max_sort_keys(mut self, max: usize) -> Self {
        self.max_sort_keys = max;
        self
    }

    /// Resolve every key of `spec`.
    pub fn resolve<T: Entity>(&self, spec: &SortSpec) -> QueryResult<CompositeOrder<T>> {
        if spec.len() > self.max_sort_keys {
            return Err(QueryError::invalid_arity(
                "Sort specification",
                format!("at most {}", self.max_sort_keys),
                spec.len(),
            )
            .with_entity(T::metadata().name()));
        }

        spec.keys()
            .iter()
            .map(OrderKey::resolve)
            .collect::<QueryResult<Vec<_>>>()
            .map(CompositeOrder::new)
            .map_err(|err| err.with_context("Resolving sort specification"))
    }

    /// Order `source` by `spec`. An empty spec leaves the source unchanged.
    pub fn apply_order<S: QuerySource>(&self, source: S, spec: &SortSpec) -> QueryResult<S> {
        let order = self.resolve::<S::Item>(spec)?;
        debug!(entity = <S::Item as Entity>::metadata().name(), keys = spec.len(), order = %order, "applying order");

        let mut keys = order.keys.into_iter();
        let Some(primary) = keys.next() else {
            return Ok(source);
        };
        Ok(keys.fold(source.order_by(primary), |source, key| source.then_by(key)))
    }

    /// Order `source` by `spec`, or by `default_key` when `spec` is empty.
    pub fn apply_order_or<S: QuerySource>(
        &self,
        source: S,
        spec: &SortSpec,
        default_key: &SortKey,
    ) -> QueryResult<S> {
        if spec.is_empty() {
            self.apply_order(source, &SortSpec::from(vec![default_key.clone()]))
        } else {
            self.apply_order(source, spec)
        }
    }
}

/// Order `source` by `spec` with the default builder.
pub fn apply_order<S: QuerySource>(source: S, spec: &SortSpec) -> QueryResult<S> {
    OrderBuilder::new().apply_order(source, spec)
}
