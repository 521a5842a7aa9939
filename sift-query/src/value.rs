//! Runtime values and the property type model.
//!
//! [`Value`] is what a property accessor yields and what filter literals are
//! parsed into. [`TypeFamily`] is the declared-type tag carried by filter
//! requests, and [`PropertyType`] adds the shape (scalar, optional or
//! collection) of a resolved property.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

/// A property or literal value.
///
/// Serialized untagged. Decimals travel as JSON numbers, and strings that
/// parse as RFC 3339 timestamps or UUIDs deserialize as those variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged, from = "ValueRepr")]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Decimal value.
    Decimal(#[serde(serialize_with = "rust_decimal::serde::float::serialize")] Decimal),
    /// String value.
    String(String),
    /// Timestamp in UTC.
    DateTime(DateTime<Utc>),
    /// UUID value.
    Uuid(Uuid),
    /// Values of a multi-valued property.
    List(Vec<Value>),
}

// Untagged candidates are tried in order: integers before decimals, and
// timestamps and UUIDs before plain strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Null,
    Bool(bool),
    Int(i64),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    String(String),
    Decimal(#[serde(deserialize_with = "rust_decimal::serde::float::deserialize")] Decimal),
    List(Vec<Value>),
}

impl From<ValueRepr> for Value {
    fn from(repr: ValueRepr) -> Self {
        match repr {
            ValueRepr::Null => Self::Null,
            ValueRepr::Bool(b) => Self::Bool(b),
            ValueRepr::Int(i) => Self::Int(i),
            ValueRepr::DateTime(dt) => Self::DateTime(dt),
            ValueRepr::Uuid(u) => Self::Uuid(u),
            ValueRepr::String(s) => Self::String(s),
            ValueRepr::Decimal(d) => Self::Decimal(d),
            ValueRepr::List(items) => Self::List(items),
        }
    }
}

impl Value {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The family of a scalar value. `Null` and lists have none.
    pub fn family(&self) -> Option<TypeFamily> {
        match self {
            Self::Bool(_) => Some(TypeFamily::Boolean),
            Self::Int(_) => Some(TypeFamily::Integer),
            Self::Decimal(_) => Some(TypeFamily::Decimal),
            Self::String(_) => Some(TypeFamily::String),
            Self::DateTime(_) => Some(TypeFamily::DateTime),
            Self::Uuid(_) => Some(TypeFamily::Uuid),
            Self::Null | Self::List(_) => None,
        }
    }

    /// Natural ordering between two comparable values.
    ///
    /// Returns `None` when either side is null, when the values belong to
    /// different families or when either is a list. Integers and decimals
    /// compare numerically with each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Decimal(a), Self::Int(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality used by predicates: null never equals anything.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Whether this is the default value of its family.
    pub fn is_default(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Decimal(d) => d.is_zero(),
            Self::String(s) => s.is_empty(),
            Self::DateTime(dt) => *dt == DateTime::<Utc>::default(),
            Self::Uuid(u) => u.is_nil(),
            Self::List(items) => items.is_empty(),
        }
    }

    /// The value viewed as a set of members.
    ///
    /// Lists yield their items, null yields nothing and any other scalar is a
    /// singleton.
    pub fn members(&self) -> &[Value] {
        match self {
            Self::Null => &[],
            Self::List(items) => items,
            scalar => std::slice::from_ref(scalar),
        }
    }

    /// True if any member of `self` loosely equals any member of `other`.
    pub fn overlaps(&self, other: &Value) -> bool {
        self.members()
            .iter()
            .any(|a| other.members().iter().any(|b| a.loose_eq(b)))
    }

    /// True if both values hold the same member set (duplicates ignored).
    pub fn set_equals(&self, other: &Value) -> bool {
        let contains_all = |outer: &Value, inner: &Value| {
            inner
                .members()
                .iter()
                .all(|b| outer.members().iter().any(|a| a.loose_eq(b)))
        };
        contains_all(self, other) && contains_all(other, self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::String(s) => write!(f, "{:?}", s),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{}", u),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Declared type tag of a property or filter literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFamily {
    /// Text.
    #[serde(alias = "string")]
    String,
    /// Signed integers.
    #[serde(alias = "integer", alias = "Int", alias = "int")]
    Integer,
    /// Fixed-point decimals.
    #[serde(alias = "decimal")]
    Decimal,
    /// Booleans.
    #[serde(alias = "boolean", alias = "Bool", alias = "bool")]
    Boolean,
    /// UTC timestamps.
    #[serde(alias = "datetime", alias = "dateTime", alias = "Date", alias = "date")]
    DateTime,
    /// UUIDs.
    #[serde(alias = "uuid", alias = "Guid", alias = "guid")]
    Uuid,
}

impl TypeFamily {
    /// The tag as written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Decimal => "Decimal",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
            Self::Uuid => "Uuid",
        }
    }

    /// Whether `<`, `>` and `between` apply to this family.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::DateTime)
    }

    /// Whether substring tests apply to this family.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String)
    }

    /// The default value used by `NotEmpty`.
    pub fn default_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::Int(0),
            Self::Decimal => Value::Decimal(Decimal::ZERO),
            Self::Boolean => Value::Bool(false),
            Self::DateTime => Value::DateTime(DateTime::<Utc>::default()),
            Self::Uuid => Value::Uuid(Uuid::nil()),
        }
    }

    /// Parse a request literal into a value of this family.
    pub fn parse(&self, raw: &str) -> QueryResult<Value> {
        let trimmed = raw.trim();
        match self {
            Self::String => Ok(Value::String(raw.to_string())),
            Self::Integer => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| QueryError::value_parse(raw, self).with_source(e)),
            Self::Decimal => trimmed
                .parse::<Decimal>()
                .map(Value::Decimal)
                .map_err(|e| QueryError::value_parse(raw, self).with_source(e)),
            Self::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(QueryError::value_parse(raw, self)
                    .with_suggestion("Use one of: true, false, 1, 0")),
            },
            Self::DateTime => parse_datetime(trimmed)
                .map(Value::DateTime)
                .ok_or_else(|| {
                    QueryError::value_parse(raw, self)
                        .with_suggestion("Use RFC 3339 (2024-01-31T12:00:00Z) or YYYY-MM-DD")
                }),
            Self::Uuid => Uuid::parse_str(trimmed)
                .map(Value::Uuid)
                .map_err(|e| QueryError::value_parse(raw, self).with_source(e)),
        }
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many values a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Exactly one value.
    Scalar,
    /// Zero or one value.
    Optional,
    /// Any number of values.
    Collection,
}

/// Resolved type of a property: family plus shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyType {
    /// Type family of each value.
    pub family: TypeFamily,
    /// Shape of the property.
    pub shape: Shape,
}

impl PropertyType {
    /// A single required value.
    pub const fn scalar(family: TypeFamily) -> Self {
        Self { family, shape: Shape::Scalar }
    }

    /// A nullable value.
    pub const fn optional(family: TypeFamily) -> Self {
        Self { family, shape: Shape::Optional }
    }

    /// A multi-valued property.
    pub const fn collection(family: TypeFamily) -> Self {
        Self { family, shape: Shape::Collection }
    }

    /// Whether the property holds a set of values.
    pub fn is_collection(&self) -> bool {
        self.shape == Shape::Collection
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            Shape::Scalar => write!(f, "{}", self.family),
            Shape::Optional => write!(f, "{}?", self.family),
            Shape::Collection => write!(f, "[{}]", self.family),
        }
    }
}

/// String comparison mode for equality and substring operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringComparison {
    /// Byte-wise comparison.
    #[default]
    #[serde(alias = "Ordinal")]
    Ordinal,
    /// Comparison after lowercasing both sides.
    #[serde(alias = "IgnoreCase", alias = "ignoreCase")]
    IgnoreCase,
}

impl fmt::Display for StringComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal => f.write_str("ordinal"),
            Self::IgnoreCase => f.write_str("ignore_case"),
        }
    }
}

/// Rust field types usable as entity properties.
pub trait PropertyValue {
    /// The property type this Rust type maps to.
    const TYPE: PropertyType;

    /// Convert a field value into a [`Value`].
    fn to_value(&self) -> Value;
}

macro_rules! property_value {
    ($($ty:ty => $family:ident, |$v:ident| $conv:expr);+ $(;)?) => {
        $(
            impl PropertyValue for $ty {
                const TYPE: PropertyType = PropertyType::scalar(TypeFamily::$family);

                fn to_value(&self) -> Value {
                    let $v = self;
                    $conv
                }
            }

            impl PropertyValue for Option<$ty> {
                const TYPE: PropertyType = PropertyType::optional(TypeFamily::$family);

                fn to_value(&self) -> Value {
                    match self {
                        Some($v) => $conv,
                        None => Value::Null,
                    }
                }
            }

            impl PropertyValue for Vec<$ty> {
                const TYPE: PropertyType = PropertyType::collection(TypeFamily::$family);

                fn to_value(&self) -> Value {
                    Value::List(self.iter().map(|$v| $conv).collect())
                }
            }

            impl PropertyValue for BTreeSet<$ty> {
                const TYPE: PropertyType = PropertyType::collection(TypeFamily::$family);

                fn to_value(&self) -> Value {
                    Value::List(self.iter().map(|$v| $conv).collect())
                }
            }

            impl PropertyValue for HashSet<$ty> {
                const TYPE: PropertyType = PropertyType::collection(TypeFamily::$family);

                fn to_value(&self) -> Value {
                    let mut items: Vec<Value> = self.iter().map(|$v| $conv).collect();
                    items.sort();
                    Value::List(items)
                }
            }
        )+
    };
}

property_value! {
    i8 => Integer, |v| Value::Int(i64::from(*v));
    i16 => Integer, |v| Value::Int(i64::from(*v));
    i32 => Integer, |v| Value::Int(i64::from(*v));
    i64 => Integer, |v| Value::Int(*v);
    u8 => Integer, |v| Value::Int(i64::from(*v));
    u16 => Integer, |v| Value::Int(i64::from(*v));
    u32 => Integer, |v| Value::Int(i64::from(*v));
    String => String, |v| Value::String(v.clone());
    bool => Boolean, |v| Value::Bool(*v);
    Decimal => Decimal, |v| Value::Decimal(*v);
    DateTime<Utc> => DateTime, |v| Value::DateTime(*v);
    Uuid => Uuid, |v| Value::Uuid(*v);
}
