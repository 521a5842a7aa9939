//! Typed predicate trees and the builder used to write them.
//!
//! ```rust
//! use sift_query::tree::PredicateTree;
//! # use sift_query::entity::{Entity, EntityMetadata};
//! # use std::sync::OnceLock;
//! # struct Permission { id: i64, name: String }
//! # impl Entity for Permission {
//! #     fn metadata() -> &'static EntityMetadata<Self> {
//! #         static M: OnceLock<EntityMetadata<Permission>> = OnceLock::new();
//! #         M.get_or_init(|| EntityMetadata::builder("Permission")
//! #             .field("Id", |p: &Permission| &p.id)
//! #             .field("Name", |p: &Permission| &p.name)
//! #             .build())
//! #     }
//! # }
//!
//! let tree = PredicateTree::<Permission>::build(|x| {
//!     Ok(x.property("Name")?.starts_with("can").and(x.property("Id")?.gt(3)))
//! })
//! .unwrap();
//!
//! assert_eq!(tree.to_string(), "x => (x.Name.StartsWith(\"can\") && (x.Id > 3))");
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::expr::{CompareOp, Expr, Member, Method, OpaqueTest, Parameter, Projection};
use crate::value::{PropertyType, StringComparison, Value};

static NEXT_TREE: AtomicU64 = AtomicU64::new(1);

/// Identity of a predicate tree instance. Clones share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Lambda {
    id: TreeId,
    parameter: Parameter,
    body: Expr,
}

/// An inspectable `T -> bool` condition over one parameter.
pub struct PredicateTree<T> {
    lambda: Arc<Lambda>,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T: Entity> PredicateTree<T> {
    /// Assemble a tree from a parameter and a body.
    ///
    /// The parameter must range over `T`. The body is not checked here; an
    /// unbound reference surfaces as `InvalidTree` when the tree is compiled.
    pub fn from_parts(parameter: Parameter, body: Expr) -> QueryResult<Self> {
        if !parameter.entity().is::<T>() {
            return Err(QueryError::invalid_tree(format!(
                "parameter '{}' ranges over {}, expected {}",
                parameter.name(),
                parameter.entity(),
                T::metadata().name()
            ))
            .with_entity(T::metadata().name()));
        }
        Ok(Self::assemble(parameter, body))
    }

    pub(crate) fn assemble(parameter: Parameter, body: Expr) -> Self {
        Self {
            lambda: Arc::new(Lambda {
                id: TreeId(NEXT_TREE.fetch_add(1, Ordering::Relaxed)),
                parameter,
                body,
            }),
            _entity: PhantomData,
        }
    }

    /// Build a tree with the typed builder.
    pub fn build<F>(f: F) -> QueryResult<Self>
    where
        F: FnOnce(&Subject<T>) -> QueryResult<Condition>,
    {
        let parameter = Parameter::new::<T>("x");
        let subject = Subject::root(&parameter);
        let condition = f(&subject)?;
        Ok(Self::assemble(parameter, condition.into_expr()))
    }

    /// A tree that is always (or never) satisfied.
    pub fn constant(value: bool) -> Self {
        Self::assemble(Parameter::new::<T>("x"), Expr::boolean(value))
    }
}

impl<T> PredicateTree<T> {
    /// Identity of this tree instance.
    pub fn id(&self) -> TreeId {
        self.lambda.id
    }

    /// The free variable.
    pub fn parameter(&self) -> &Parameter {
        &self.lambda.parameter
    }

    /// The condition body.
    pub fn body(&self) -> &Expr {
        &self.lambda.body
    }
}

impl<T> Clone for PredicateTree<T> {
    fn clone(&self) -> Self {
        Self {
            lambda: Arc::clone(&self.lambda),
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Display for PredicateTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.lambda.parameter.name(), self.lambda.body)
    }
}

impl<T> fmt::Debug for PredicateTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateTree")
            .field("id", &self.lambda.id)
            .field("parameter", &self.lambda.parameter)
            .field("body", &self.lambda.body)
            .finish()
    }
}

/// An entity-typed position in a tree under construction.
pub struct Subject<T> {
    expr: Expr,
    root: Option<Parameter>,
    _entity: PhantomData<fn(&T)>,
}

impl<T: Entity> Subject<T> {
    fn root(parameter: &Parameter) -> Self {
        Self {
            expr: Expr::parameter(parameter),
            root: Some(parameter.clone()),
            _entity: PhantomData,
        }
    }

    /// The underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Read a property by name.
    pub fn property(&self, name: &str) -> QueryResult<Operand> {
        let property = T::metadata().resolve_property(name)?;
        Ok(Operand {
            expr: Expr::member(self.expr.clone(), Member::of(property)),
            ty: property.ty(),
            comparison: StringComparison::Ordinal,
        })
    }

    /// Navigate to a related entity borrowed from this one.
    pub fn navigate<U, F>(&self, label: &str, map: F) -> Subject<U>
    where
        U: Entity,
        F: Fn(&T) -> &U + Send + Sync + 'static,
    {
        Subject {
            expr: Expr::project(self.expr.clone(), Projection::borrowed(label, map)),
            root: None,
            _entity: PhantomData,
        }
    }

    /// Attach a caller-supplied test. Only allowed on the tree parameter.
    pub fn test<F>(&self, label: &str, test: F) -> QueryResult<Condition>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        match &self.root {
            Some(parameter) => Ok(Condition::from_expr(Expr::Opaque(OpaqueTest::new(
                label,
                parameter.clone(),
                test,
            )))),
            None => Err(QueryError::unsupported_node(
                format!("{}({})", label, self.expr),
                "Opaque test",
            )
            .with_suggestion("Apply opaque tests to the tree parameter only")),
        }
    }
}

/// A property value inside a tree under construction.
#[derive(Debug, Clone)]
pub struct Operand {
    expr: Expr,
    ty: PropertyType,
    comparison: StringComparison,
}

impl Operand {
    /// The underlying expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The resolved property type.
    pub fn ty(&self) -> PropertyType {
        self.ty
    }

    /// Compare strings case-insensitively.
    pub fn ignore_case(mut self) -> Self {
        self.comparison = StringComparison::IgnoreCase;
        self
    }

    /// Use the given string comparison mode.
    pub fn with_comparison(mut self, comparison: StringComparison) -> Self {
        self.comparison = comparison;
        self
    }

    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Condition {
        Condition::from_expr(Expr::compare(op, self.expr.clone(), Expr::constant(value)))
    }

    fn call(&self, method: Method, args: Vec<Expr>) -> Condition {
        Condition::from_expr(Expr::call(method, self.expr.clone(), args))
    }

    /// `self == value`
    pub fn eq(&self, value: impl Into<Value>) -> Condition {
        match self.comparison {
            StringComparison::IgnoreCase if self.ty.family.is_textual() => self.call(
                Method::TextEquals(StringComparison::IgnoreCase),
                vec![Expr::constant(value)],
            ),
            _ => self.compare(CompareOp::Eq, value),
        }
    }

    /// `self != value`
    pub fn ne(&self, value: impl Into<Value>) -> Condition {
        self.eq(value).not()
    }

    /// `self < value`
    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    /// `self <= value`
    pub fn lte(&self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Lte, value)
    }

    /// `self > value`
    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    /// `self >= value`
    pub fn gte(&self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Gte, value)
    }

    /// `low <= self <= high`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        self.gte(low).and(self.lte(high))
    }

    /// Substring test.
    pub fn contains(&self, needle: impl Into<String>) -> Condition {
        self.call(Method::Contains(self.comparison), vec![Expr::constant(needle.into())])
    }

    /// Prefix test.
    pub fn starts_with(&self, prefix: impl Into<String>) -> Condition {
        self.call(Method::StartsWith(self.comparison), vec![Expr::constant(prefix.into())])
    }

    /// Suffix test.
    pub fn ends_with(&self, suffix: impl Into<String>) -> Condition {
        self.call(Method::EndsWith(self.comparison), vec![Expr::constant(suffix.into())])
    }

    /// Null or the default value of the property's family.
    pub fn is_default(&self) -> Condition {
        self.call(Method::IsDefault, Vec::new())
    }

    /// Neither null nor default.
    pub fn not_empty(&self) -> Condition {
        self.is_default().not()
    }

    /// The property's member set intersects `values`.
    pub fn overlaps<I, V>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.call(Method::Overlaps, vec![Expr::Constant(collect_list(values))])
    }

    /// The property's member set equals `values`.
    pub fn set_equals<I, V>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.call(Method::SetEquals, vec![Expr::Constant(collect_list(values))])
    }

    /// A boolean property is true.
    pub fn is_true(&self) -> Condition {
        self.compare(CompareOp::Eq, true)
    }
}

fn collect_list<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Value::List(values.into_iter().map(Into::into).collect())
}

/// A boolean expression inside a tree under construction.
#[derive(Debug, Clone)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    /// Wrap a boolean expression.
    pub fn from_expr(expr: Expr) -> Self {
        Self { expr }
    }

    /// Always true.
    pub fn always() -> Self {
        Self::from_expr(Expr::boolean(true))
    }

    /// Always false.
    pub fn never() -> Self {
        Self::from_expr(Expr::boolean(false))
    }

    /// Both conditions hold.
    pub fn and(self, other: Condition) -> Self {
        Self::from_expr(Expr::and(self.expr, other.expr))
    }

    /// Either condition holds.
    pub fn or(self, other: Condition) -> Self {
        Self::from_expr(Expr::or(self.expr, other.expr))
    }

    /// The condition does not hold.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::from_expr(Expr::not(self.expr))
    }

    /// The underlying expression.
    pub fn into_expr(self) -> Expr {
        self.expr
    }
}

impl From<Condition> for Expr {
    fn from(condition: Condition) -> Self {
        condition.expr
    }
}
