//! Predicate tree nodes.
//!
//! A predicate body is an [`Expr`] over exactly one free variable, a
//! [`Parameter`]. Nodes are immutable; every transformation builds a new
//! tree and shares unchanged accessors through `Arc`.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entity::{Entity, Property};
use crate::value::{PropertyType, StringComparison, Value};

static NEXT_PARAMETER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Parameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(u64);

/// Runtime identity of an entity type.
#[derive(Debug, Clone, Copy)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    /// The entity type `T`.
    pub fn of<T: Entity>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::metadata().name(),
        }
    }

    /// Entity name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this is the entity type `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The free variable of a predicate tree.
///
/// Two parameters are equal only if one was cloned from the other.
#[derive(Debug, Clone)]
pub struct Parameter {
    id: ParameterId,
    name: Arc<str>,
    entity: EntityType,
}

impl Parameter {
    /// A fresh parameter of entity type `T`.
    pub fn new<T: Entity>(name: &str) -> Self {
        Self {
            id: ParameterId(NEXT_PARAMETER.fetch_add(1, Ordering::Relaxed)),
            name: Arc::from(name),
            entity: EntityType::of::<T>(),
        }
    }

    /// Unique id.
    pub fn id(&self) -> ParameterId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity type the parameter ranges over.
    pub fn entity(&self) -> EntityType {
        self.entity
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

type MemberFn = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;
type VisitFn = Arc<dyn Fn(&dyn Any, &mut dyn FnMut(&dyn Any)) + Send + Sync>;
type TestFn = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Property access on an entity-typed expression.
#[derive(Clone)]
pub struct Member {
    owner: EntityType,
    name: &'static str,
    ty: PropertyType,
    get: MemberFn,
}

impl Member {
    /// Member access for a resolved property of `T`.
    pub fn of<T: Entity>(property: &Property<T>) -> Self {
        let accessor = property.accessor();
        Self {
            owner: EntityType::of::<T>(),
            name: property.name(),
            ty: property.ty(),
            get: Arc::new(move |subject: &dyn Any| {
                subject
                    .downcast_ref::<T>()
                    .map(|entity| accessor(entity))
                    .unwrap_or(Value::Null)
            }),
        }
    }

    /// Entity type declaring the property.
    pub fn owner(&self) -> EntityType {
        self.owner
    }

    /// Property name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Property type.
    pub fn ty(&self) -> PropertyType {
        self.ty
    }

    pub(crate) fn getter(&self) -> MemberFn {
        Arc::clone(&self.get)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("owner", &self.owner.name)
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// Navigation from one entity type to another.
///
/// The mapped value is handed to a continuation, so projections that borrow
/// from the parent and projections that build a new value share one shape.
#[derive(Clone)]
pub struct Projection {
    label: Arc<str>,
    input: EntityType,
    output: EntityType,
    visit: VisitFn,
}

impl Projection {
    /// Projection borrowing a `T` out of a `P`.
    pub fn borrowed<P, T, F>(label: &str, map: F) -> Self
    where
        P: Entity,
        T: Entity,
        F: Fn(&P) -> &T + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label),
            input: EntityType::of::<P>(),
            output: EntityType::of::<T>(),
            visit: Arc::new(move |subject: &dyn Any, k: &mut dyn FnMut(&dyn Any)| {
                if let Some(parent) = subject.downcast_ref::<P>() {
                    let child: &dyn Any = map(parent);
                    k(child);
                }
            }),
        }
    }

    /// Projection deriving an owned `T` from a `P`.
    pub fn owned<P, T, F>(label: &str, map: F) -> Self
    where
        P: Entity,
        T: Entity,
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label),
            input: EntityType::of::<P>(),
            output: EntityType::of::<T>(),
            visit: Arc::new(move |subject: &dyn Any, k: &mut dyn FnMut(&dyn Any)| {
                if let Some(parent) = subject.downcast_ref::<P>() {
                    let child = map(parent);
                    k(&child);
                }
            }),
        }
    }

    /// Label used when rendering the tree.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Entity type projected from.
    pub fn input(&self) -> EntityType {
        self.input
    }

    /// Entity type projected to.
    pub fn output(&self) -> EntityType {
        self.output
    }

    pub(crate) fn visitor(&self) -> VisitFn {
        Arc::clone(&self.visit)
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("label", &self.label)
            .field("input", &self.input.name)
            .field("output", &self.output.name)
            .finish()
    }
}

/// A caller-supplied test over the parameter.
///
/// Executable but not inspectable: the SQL renderer rejects it and the
/// rebinder can only move it to another parameter of the same type.
#[derive(Clone)]
pub struct OpaqueTest {
    label: Arc<str>,
    subject: Parameter,
    test: TestFn,
}

impl OpaqueTest {
    pub(crate) fn new<T, F>(label: &str, subject: Parameter, test: F) -> Self
    where
        T: Entity,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label),
            subject,
            test: Arc::new(move |value: &dyn Any| value.downcast_ref::<T>().is_some_and(|v| test(v))),
        }
    }

    /// Label used when rendering the tree.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parameter the test is applied to.
    pub fn subject(&self) -> &Parameter {
        &self.subject
    }

    pub(crate) fn with_subject(&self, subject: Parameter) -> Self {
        Self {
            label: Arc::clone(&self.label),
            subject,
            test: Arc::clone(&self.test),
        }
    }

    pub(crate) fn tester(&self) -> TestFn {
        Arc::clone(&self.test)
    }
}

impl fmt::Debug for OpaqueTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueTest")
            .field("label", &self.label)
            .field("subject", &self.subject.name)
            .finish()
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CompareOp {
    /// Operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// Methods callable on a value expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Substring test.
    Contains(StringComparison),
    /// Prefix test.
    StartsWith(StringComparison),
    /// Suffix test.
    EndsWith(StringComparison),
    /// String equality under a comparison mode.
    TextEquals(StringComparison),
    /// Null or default value of its family.
    IsDefault,
    /// Member sets intersect.
    Overlaps,
    /// Member sets are equal.
    SetEquals,
}

impl Method {
    /// Method name used when rendering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Contains(_) => "Contains",
            Self::StartsWith(_) => "StartsWith",
            Self::EndsWith(_) => "EndsWith",
            Self::TextEquals(_) => "Equals",
            Self::IsDefault => "IsDefault",
            Self::Overlaps => "Overlaps",
            Self::SetEquals => "SetEquals",
        }
    }

    /// Number of arguments besides the target.
    pub fn arity(&self) -> usize {
        match self {
            Self::IsDefault => 0,
            _ => 1,
        }
    }

    /// Comparison mode of string methods.
    pub fn comparison(&self) -> Option<StringComparison> {
        match self {
            Self::Contains(c) | Self::StartsWith(c) | Self::EndsWith(c) | Self::TextEquals(c) => {
                Some(*c)
            }
            _ => None,
        }
    }
}

/// A predicate tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Reference to the free variable.
    Parameter(Parameter),
    /// Literal value.
    Constant(Value),
    /// Property read on an entity expression.
    Member {
        /// Entity expression.
        target: Box<Expr>,
        /// Property accessor.
        member: Member,
    },
    /// Navigation to another entity.
    Project {
        /// Entity expression.
        target: Box<Expr>,
        /// Projection applied to it.
        projection: Projection,
    },
    /// Binary comparison of two values.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Method call on a value.
    Call {
        /// Method.
        method: Method,
        /// Receiver.
        target: Box<Expr>,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Caller-supplied test.
    Opaque(OpaqueTest),
}

impl Expr {
    /// Reference to `parameter`.
    pub fn parameter(parameter: &Parameter) -> Self {
        Self::Parameter(parameter.clone())
    }

    /// Literal value.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// Boolean literal.
    pub fn boolean(value: bool) -> Self {
        Self::Constant(Value::Bool(value))
    }

    /// Property read.
    pub fn member(target: Expr, member: Member) -> Self {
        Self::Member { target: Box::new(target), member }
    }

    /// Navigation.
    pub fn project(target: Expr, projection: Projection) -> Self {
        Self::Project { target: Box::new(target), projection }
    }

    /// Comparison.
    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Self::Compare { op, left: Box::new(left), right: Box::new(right) }
    }

    /// Method call.
    pub fn call(method: Method, target: Expr, args: Vec<Expr>) -> Self {
        Self::Call { method, target: Box::new(target), args }
    }

    /// Conjunction.
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    /// Disjunction.
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Negation. A double negation collapses to the inner expression.
    pub fn not(inner: Expr) -> Self {
        match inner {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// The literal boolean value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Constant(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Short node kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "Parameter",
            Self::Constant(_) => "Constant",
            Self::Member { .. } => "Member",
            Self::Project { .. } => "Project",
            Self::Compare { .. } => "Compare",
            Self::Call { .. } => "Call",
            Self::And(..) => "And",
            Self::Or(..) => "Or",
            Self::Not(_) => "Not",
            Self::Opaque(_) => "Opaque",
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Self::Parameter(_) | Self::Constant(_) | Self::Opaque(_) => 0,
            Self::Member { target, .. } | Self::Project { target, .. } | Self::Not(target) => {
                target.node_count()
            }
            Self::Compare { left, right, .. } | Self::And(left, right) | Self::Or(left, right) => {
                left.node_count() + right.node_count()
            }
            Self::Call { target, args, .. } => {
                target.node_count() + args.iter().map(Expr::node_count).sum::<usize>()
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(p) => f.write_str(p.name()),
            Self::Constant(v) => write!(f, "{}", v),
            Self::Member { target, member } => write!(f, "{}.{}", target, member.name),
            Self::Project { target, projection } => write!(f, "{}.{}", target, projection.label),
            Self::Compare { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Self::Call { method, target, args } => {
                write!(f, "{}.{}(", target, method.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                if method.comparison() == Some(StringComparison::IgnoreCase) {
                    write!(f, ", IgnoreCase")?;
                }
                write!(f, ")")
            }
            Self::And(left, right) => write!(f, "({} && {})", left, right),
            Self::Or(left, right) => write!(f, "({} || {})", left, right),
            Self::Not(inner) => write!(f, "!{}", inner),
            Self::Opaque(test) => write!(f, "{}({})", test.label, test.subject.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::fixtures::Permission;
    use crate::entity::Entity;

    fn name_member() -> Member {
        Member::of(Permission::metadata().resolve_property("Name").unwrap())
    }

    #[test]
    fn test_parameters_are_unique() {
        let a = Parameter::new::<Permission>("x");
        let b = Parameter::new::<Permission>("x");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.entity(), b.entity());
        assert!(a.entity().is::<Permission>());
    }

    #[test]
    fn test_display() {
        let x = Parameter::new::<Permission>("x");
        let expr = Expr::and(
            Expr::compare(
                CompareOp::Eq,
                Expr::member(Expr::parameter(&x), name_member()),
                Expr::constant("a"),
            ),
            Expr::not(Expr::call(
                Method::StartsWith(StringComparison::IgnoreCase),
                Expr::member(Expr::parameter(&x), name_member()),
                vec![Expr::constant("b")],
            )),
        );
        assert_eq!(
            expr.to_string(),
            "((x.Name == \"a\") && !x.Name.StartsWith(\"b\", IgnoreCase))"
        );
        assert_eq!(expr.node_count(), 10);
    }

    #[test]
    fn test_double_negation_collapses() {
        let inner = Expr::boolean(true);
        let twice = Expr::not(Expr::not(inner));
        assert_eq!(twice.as_bool(), Some(true));
    }

    #[test]
    fn test_member_reads_through_any() {
        let member = name_member();
        let p = Permission::new(1, "canEditUser");
        assert_eq!((member.getter())(&p), Value::from("canEditUser"));
        // Wrong subject type reads as null.
        assert_eq!((member.getter())(&42i32), Value::Null);
    }
}
