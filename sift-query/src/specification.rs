//! Composable specifications over predicate trees.
//!
//! A [`Specification`] wraps exactly one [`PredicateTree`] and combines with
//! others at the tree level, so the result stays inspectable (and renderable
//! to SQL) rather than becoming an opaque closure.
//!
//! ```rust
//! use sift_query::Specification;
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
//! let can = Specification::<Permission>::build(|x| Ok(x.property("Name")?.starts_with("can"))).unwrap();
//! let small = Specification::<Permission>::build(|x| Ok(x.property("Id")?.lt(3))).unwrap();
//!
//! let both = can.and(&small);
//! let row = Permission { id: 2, name: "canView".into() };
//! assert!(both.is_satisfied_by(&row).unwrap());
//! assert!(!both.not().is_satisfied_by(&row).unwrap());
//! ```

use std::fmt;
use std::sync::OnceLock;

use crate::cache::PredicateCache;
use crate::compile::CompiledPredicate;
use crate::entity::Entity;
use crate::error::QueryResult;
use crate::expr::{Expr, Parameter, Projection};
use crate::rebind::{ParameterRebinder, rename_parameter};
use crate::tree::{Condition, PredicateTree, Subject};

/// A composable condition on `T`.
pub struct Specification<T> {
    tree: PredicateTree<T>,
    compiled: OnceLock<CompiledPredicate<T>>,
}

impl<T: Entity> Specification<T> {
    /// Wrap a tree.
    pub fn new(tree: PredicateTree<T>) -> Self {
        Self {
            tree,
            compiled: OnceLock::new(),
        }
    }

    /// Build with the typed builder.
    pub fn build<F>(f: F) -> QueryResult<Self>
    where
        F: FnOnce(&Subject<T>) -> QueryResult<Condition>,
    {
        PredicateTree::build(f).map(Self::new)
    }

    /// Satisfied by everything.
    pub fn always() -> Self {
        Self::new(PredicateTree::constant(true))
    }

    /// Satisfied by nothing.
    pub fn never() -> Self {
        Self::new(PredicateTree::constant(false))
    }

    /// The wrapped tree.
    pub fn tree(&self) -> &PredicateTree<T> {
        &self.tree
    }

    /// Unwrap into the tree.
    pub fn into_tree(self) -> PredicateTree<T> {
        self.tree
    }

    fn combine(&self, other: &Specification<T>, join: fn(Expr, Expr) -> Expr) -> Self {
        let parameter = self.tree.parameter();
        let other_body = rename_parameter(other.tree.body(), other.tree.parameter(), parameter);
        Self::new(PredicateTree::assemble(
            parameter.clone(),
            join(self.tree.body().clone(), other_body),
        ))
    }

    /// Both specifications hold. `other` is rebound onto this one's parameter.
    pub fn and(&self, other: &Specification<T>) -> Self {
        self.combine(other, Expr::and)
    }

    /// Either specification holds. `other` is rebound onto this one's parameter.
    pub fn or(&self, other: &Specification<T>) -> Self {
        self.combine(other, Expr::or)
    }

    /// This specification does not hold.
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Self {
        Self::new(PredicateTree::assemble(
            self.tree.parameter().clone(),
            Expr::not(self.tree.body().clone()),
        ))
    }

    /// Conjunction of all specifications; `always()` when empty.
    pub fn all<'a, I>(specs: I) -> Self
    where
        I: IntoIterator<Item = &'a Specification<T>>,
    {
        let mut specs = specs.into_iter();
        match specs.next() {
            None => Self::always(),
            Some(first) => specs.fold(first.clone(), |acc, spec| acc.and(spec)),
        }
    }

    /// Disjunction of all specifications; `never()` when empty.
    pub fn any<'a, I>(specs: I) -> Self
    where
        I: IntoIterator<Item = &'a Specification<T>>,
    {
        let mut specs = specs.into_iter();
        match specs.next() {
            None => Self::never(),
            Some(first) => specs.fold(first.clone(), |acc, spec| acc.or(spec)),
        }
    }

    /// Lift this specification onto a parent entity that holds a `T`.
    ///
    /// Fails with `UnsupportedNodeKind` if the tree contains opaque tests.
    pub fn from_parent<P, F>(&self, label: &str, map: F) -> QueryResult<Specification<P>>
    where
        P: Entity,
        F: Fn(&P) -> &T + Send + Sync + 'static,
    {
        self.lift(Projection::borrowed(label, map))
    }

    /// Lift this specification onto an entity a `T` can be derived from.
    ///
    /// Fails with `UnsupportedNodeKind` if the tree contains opaque tests.
    pub fn from_derived<P, F>(&self, label: &str, map: F) -> QueryResult<Specification<P>>
    where
        P: Entity,
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        self.lift(Projection::owned(label, map))
    }

    fn lift<P: Entity>(&self, projection: Projection) -> QueryResult<Specification<P>> {
        let parameter = Parameter::new::<P>(self.tree.parameter().name());
        let body = ParameterRebinder::new()
            .replace(
                self.tree.parameter(),
                Expr::project(Expr::parameter(&parameter), projection),
            )
            .rebind(self.tree.body())?;
        crate::sift_debug!(
            from = T::metadata().name(),
            to = P::metadata().name(),
            tree = %self.tree.id(),
            "specification lifted"
        );
        Ok(Specification::new(PredicateTree::assemble(parameter, body)))
    }

    /// The compiled predicate, via the process-wide cache.
    pub fn compiled(&self) -> QueryResult<CompiledPredicate<T>> {
        self.compiled_with(PredicateCache::global())
    }

    /// The compiled predicate, via `cache` on first use.
    ///
    /// The result is memoized on the specification, so later calls return
    /// it without consulting any cache.
    pub fn compiled_with(&self, cache: &PredicateCache) -> QueryResult<CompiledPredicate<T>> {
        if let Some(compiled) = self.compiled.get() {
            return Ok(compiled.clone());
        }
        let compiled = cache.compile(&self.tree)?;
        Ok(self.compiled.get_or_init(|| compiled).clone())
    }

    /// Evaluate against one entity.
    ///
    /// Errors only if the tree is malformed; never because of the entity.
    pub fn is_satisfied_by(&self, entity: &T) -> QueryResult<bool> {
        Ok(self.compiled()?.call(entity))
    }

    /// Rows of `rows` satisfying this specification, in order.
    pub fn filter_slice<'a>(&self, rows: &'a [T]) -> QueryResult<Vec<&'a T>> {
        let predicate = self.compiled()?;
        Ok(rows.iter().filter(|row| predicate.call(row)).collect())
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            compiled: self.compiled.clone(),
        }
    }
}

impl<T> fmt::Display for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tree, f)
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("tree", &self.tree)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}

impl<T: Entity> From<PredicateTree<T>> for Specification<T> {
    fn from(tree: PredicateTree<T>) -> Self {
        Self::new(tree)
    }
}

impl<T> From<Specification<T>> for PredicateTree<T> {
    fn from(spec: Specification<T>) -> Self {
        spec.tree
    }
}
