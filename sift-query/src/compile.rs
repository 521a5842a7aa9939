//! Compilation of predicate trees into callables.
//!
//! Compilation walks the tree once, checks that every node is used in a
//! position it can occupy, and produces a closure graph. Evaluating the
//! result never fails: a member read on the wrong entity type or a
//! comparison between unrelated families simply evaluates to `false`, and
//! those situations are rejected up front as `InvalidTree`.
//!
//! Most callers go through [`PredicateCache`](crate::cache::PredicateCache)
//! rather than calling [`compile`] directly.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::expr::{CompareOp, EntityType, Expr, Method, Parameter};
use crate::tree::{PredicateTree, TreeId};
use crate::value::{StringComparison, TypeFamily, Value};

type SubjectFn = Arc<dyn Fn(&dyn Any, &mut dyn FnMut(&dyn Any)) + Send + Sync>;
type ValueFn = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;
type BoolFn = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Compile a tree without going through a cache.
pub fn compile<T: Entity>(tree: &PredicateTree<T>) -> QueryResult<CompiledPredicate<T>> {
    let erased = compile_erased(tree.id(), tree.parameter(), tree.body())
        .map_err(|err| err.with_tree(tree).with_entity(T::metadata().name()))?;
    Ok(CompiledPredicate::from_erased(&erased))
}

pub(crate) fn compile_erased(id: TreeId, parameter: &Parameter, body: &Expr) -> QueryResult<ErasedPredicate> {
    debug!(tree = %id, entity = parameter.entity().name(), nodes = body.node_count(), "compiling predicate");
    let eval = Compiler { parameter }.boolean(body)?;
    Ok(ErasedPredicate {
        entity: parameter.entity(),
        tree: id,
        eval,
    })
}

/// A compiled predicate with its entity type erased, as stored in caches.
#[derive(Clone)]
pub struct ErasedPredicate {
    entity: EntityType,
    tree: TreeId,
    eval: BoolFn,
}

impl ErasedPredicate {
    /// Entity type the predicate accepts.
    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Tree the predicate was compiled from.
    pub fn tree_id(&self) -> TreeId {
        self.tree
    }

    /// Recover the typed predicate, if it was compiled for `T`.
    pub fn downcast<T: Entity>(&self) -> Option<CompiledPredicate<T>> {
        self.entity.is::<T>().then(|| CompiledPredicate::from_erased(self))
    }
}

impl fmt::Debug for ErasedPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedPredicate")
            .field("entity", &self.entity.name())
            .field("tree", &self.tree)
            .finish()
    }
}

/// A directly invocable `T -> bool`.
pub struct CompiledPredicate<T> {
    tree: TreeId,
    eval: BoolFn,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T: Entity> CompiledPredicate<T> {
    fn from_erased(erased: &ErasedPredicate) -> Self {
        Self {
            tree: erased.tree,
            eval: Arc::clone(&erased.eval),
            _entity: PhantomData,
        }
    }

    /// Evaluate the predicate.
    #[inline]
    pub fn call(&self, entity: &T) -> bool {
        (self.eval)(entity)
    }

    /// Tree the predicate was compiled from.
    pub fn tree_id(&self) -> TreeId {
        self.tree
    }

    /// Whether both handles share one compiled closure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.eval, &other.eval)
    }
}

impl<T> Clone for CompiledPredicate<T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            eval: Arc::clone(&self.eval),
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CompiledPredicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPredicate").field("tree", &self.tree).finish()
    }
}

/// A compiled value position; constants are kept as-is to avoid cloning.
enum Operand {
    Fixed(Value),
    Dynamic(ValueFn),
}

impl Operand {
    #[inline]
    fn with<R>(&self, subject: &dyn Any, f: impl FnOnce(&Value) -> R) -> R {
        match self {
            Self::Fixed(value) => f(value),
            Self::Dynamic(get) => f(&get(subject)),
        }
    }
}

struct Compiler<'a> {
    parameter: &'a Parameter,
}

impl Compiler<'_> {
    /// An entity-typed position: the parameter or a projection chain on it.
    fn subject(&self, expr: &Expr) -> QueryResult<(EntityType, Option<SubjectFn>)> {
        match expr {
            Expr::Parameter(p) if p == self.parameter => Ok((p.entity(), None)),
            Expr::Parameter(p) => Err(QueryError::invalid_tree(format!(
                "parameter '{}' is not bound by this tree",
                p.name()
            ))),
            Expr::Project { target, projection } => {
                let (entity, inner) = self.subject(target)?;
                if entity != projection.input() {
                    return Err(QueryError::invalid_tree(format!(
                        "projection '{}' expects {}, applied to {}",
                        projection.label(),
                        projection.input(),
                        entity
                    )));
                }
                let visit = projection.visitor();
                let chained: SubjectFn = match inner {
                    None => visit,
                    Some(inner) => Arc::new(move |root: &dyn Any, k: &mut dyn FnMut(&dyn Any)| {
                        inner(root, &mut |parent: &dyn Any| visit(parent, &mut *k))
                    }),
                };
                Ok((projection.output(), Some(chained)))
            }
            other => Err(QueryError::invalid_tree(format!(
                "expected an entity expression, found {} '{}'",
                other.kind(),
                other
            ))),
        }
    }

    fn operand(&self, expr: &Expr) -> QueryResult<Operand> {
        match expr {
            Expr::Constant(value) => Ok(Operand::Fixed(value.clone())),
            other => self.value(other).map(Operand::Dynamic),
        }
    }

    fn value(&self, expr: &Expr) -> QueryResult<ValueFn> {
        match expr {
            Expr::Constant(value) => {
                let value = value.clone();
                Ok(Arc::new(move |_: &dyn Any| value.clone()))
            }
            Expr::Member { target, member } => {
                let (entity, subject) = self.subject(target)?;
                if entity != member.owner() {
                    return Err(QueryError::invalid_tree(format!(
                        "property '{}' belongs to {}, read from {}",
                        member.name(),
                        member.owner(),
                        entity
                    )));
                }
                let get = member.getter();
                Ok(match subject {
                    None => get,
                    Some(subject) => Arc::new(move |root: &dyn Any| {
                        let mut out = Value::Null;
                        subject(root, &mut |entity: &dyn Any| out = get(entity));
                        out
                    }),
                })
            }
            Expr::Parameter(_) | Expr::Project { .. } => Err(QueryError::invalid_tree(format!(
                "entity expression '{}' used where a value is expected",
                expr
            ))),
            boolean => {
                let eval = self.boolean(boolean)?;
                Ok(Arc::new(move |root: &dyn Any| Value::Bool(eval(root))))
            }
        }
    }

    fn boolean(&self, expr: &Expr) -> QueryResult<BoolFn> {
        match expr {
            Expr::Constant(Value::Bool(b)) => {
                let b = *b;
                Ok(Arc::new(move |_: &dyn Any| b))
            }
            Expr::Constant(other) => Err(QueryError::invalid_tree(format!(
                "constant {} used where a condition is expected",
                other
            ))),
            Expr::Member { member, .. } => {
                if member.ty().family != TypeFamily::Boolean || member.ty().is_collection() {
                    return Err(QueryError::invalid_tree(format!(
                        "property '{}' of type {} used as a condition",
                        member.name(),
                        member.ty()
                    )));
                }
                let get = self.value(expr)?;
                Ok(Arc::new(move |root: &dyn Any| get(root) == Value::Bool(true)))
            }
            Expr::Compare { op, left, right } => {
                let op = *op;
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(Arc::new(move |root: &dyn Any| {
                    left.with(root, |l| right.with(root, |r| eval_compare(op, l, r)))
                }))
            }
            Expr::Call { method, target, args } => {
                if args.len() != method.arity() {
                    return Err(QueryError::invalid_tree(format!(
                        "{} takes {} argument(s), got {}",
                        method.name(),
                        method.arity(),
                        args.len()
                    )));
                }
                let method = *method;
                let target = self.operand(target)?;
                match args.first() {
                    None => Ok(Arc::new(move |root: &dyn Any| {
                        target.with(root, |t| eval_method(method, t, None))
                    })),
                    Some(arg) => {
                        let arg = self.operand(arg)?;
                        Ok(Arc::new(move |root: &dyn Any| {
                            target.with(root, |t| arg.with(root, |a| eval_method(method, t, Some(a))))
                        }))
                    }
                }
            }
            Expr::And(left, right) => {
                let left = self.boolean(left)?;
                let right = self.boolean(right)?;
                Ok(Arc::new(move |root: &dyn Any| left(root) && right(root)))
            }
            Expr::Or(left, right) => {
                let left = self.boolean(left)?;
                let right = self.boolean(right)?;
                Ok(Arc::new(move |root: &dyn Any| left(root) || right(root)))
            }
            Expr::Not(inner) => {
                let inner = self.boolean(inner)?;
                Ok(Arc::new(move |root: &dyn Any| !inner(root)))
            }
            Expr::Opaque(test) => {
                if test.subject() != self.parameter {
                    return Err(QueryError::invalid_tree(format!(
                        "opaque test '{}' refers to unbound parameter '{}'",
                        test.label(),
                        test.subject().name()
                    )));
                }
                Ok(test.tester())
            }
            Expr::Parameter(_) | Expr::Project { .. } => Err(QueryError::invalid_tree(format!(
                "entity expression '{}' used where a condition is expected",
                expr
            ))),
        }
    }
}

pub(crate) fn eval_compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => left.loose_eq(right),
        CompareOp::Ne => !left.loose_eq(right),
        CompareOp::Lt => left.compare(right) == Some(Ordering::Less),
        CompareOp::Lte => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => left.compare(right) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal)),
    }
}

pub(crate) fn eval_method(method: Method, target: &Value, arg: Option<&Value>) -> bool {
    match method {
        Method::Contains(c) => text_test(c, target, arg, |h, n| h.contains(n)),
        Method::StartsWith(c) => text_test(c, target, arg, |h, n| h.starts_with(n)),
        Method::EndsWith(c) => text_test(c, target, arg, |h, n| h.ends_with(n)),
        Method::TextEquals(c) => text_test(c, target, arg, |h, n| h == n),
        Method::IsDefault => target.is_default(),
        Method::Overlaps => arg.is_some_and(|values| target.overlaps(values)),
        Method::SetEquals => arg.is_some_and(|values| target.set_equals(values)),
    }
}

fn text_test(
    comparison: StringComparison,
    target: &Value,
    arg: Option<&Value>,
    test: fn(&str, &str) -> bool,
) -> bool {
    match (target.as_str(), arg.and_then(Value::as_str)) {
        (Some(haystack), Some(needle)) => match comparison {
            StringComparison::Ordinal => test(haystack, needle),
            StringComparison::IgnoreCase => test(&haystack.to_lowercase(), &needle.to_lowercase()),
        },
        _ => false,
    }
}
