//! Parameter rebinding.
//!
//! Two trees built separately each own their own [`Parameter`]. Before they
//! can be merged, every reference to the second tree's parameter has to be
//! rewritten to the first tree's. [`ParameterRebinder`] performs that
//! rewrite (and the more general substitution of a parameter by any entity
//! expression, used when lifting a predicate through a projection).
//!
//! Rebinding never mutates its input; it always returns a new tree.

use std::collections::HashMap;
use std::convert::Infallible;

use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, Parameter, ParameterId};

/// Substitutes parameter references in a tree.
#[derive(Debug, Clone, Default)]
pub struct ParameterRebinder {
    substitutions: HashMap<ParameterId, Expr>,
}

impl ParameterRebinder {
    /// An empty rebinder; rebinding with it copies the tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every reference to `parameter` with `replacement`.
    pub fn replace(mut self, parameter: &Parameter, replacement: Expr) -> Self {
        self.substitutions.insert(parameter.id(), replacement);
        self
    }

    /// Number of registered substitutions.
    pub fn len(&self) -> usize {
        self.substitutions.len()
    }

    /// Whether no substitution is registered.
    pub fn is_empty(&self) -> bool {
        self.substitutions.is_empty()
    }

    /// Rewrite `expr`.
    ///
    /// Fails with `UnsupportedNodeKind` when an opaque test would have to be
    /// applied to anything other than a parameter of the same entity type.
    pub fn rebind(&self, expr: &Expr) -> QueryResult<Expr> {
        trace!(substitutions = self.substitutions.len(), "rebinding tree");
        fold(expr, &mut |node| match node {
            Expr::Parameter(p) => Ok(self.substitutions.get(&p.id()).cloned()),
            Expr::Opaque(test) => match self.substitutions.get(&test.subject().id()) {
                None => Ok(None),
                Some(Expr::Parameter(to)) if to.entity() == test.subject().entity() => {
                    Ok(Some(Expr::Opaque(test.with_subject(to.clone()))))
                }
                Some(other) => Err(QueryError::unsupported_node(node, "Parameter rebinding")
                    .with_suggestion(format!(
                        "Opaque test '{}' cannot be applied to {}; express it with properties instead",
                        test.label(),
                        other
                    ))),
            },
            _ => Ok(None),
        })
    }
}

/// Rename one parameter to another of the same entity type.
///
/// Infallible: an opaque test can always move between same-typed parameters.
pub(crate) fn rename_parameter(expr: &Expr, from: &Parameter, to: &Parameter) -> Expr {
    let renamed: Result<Expr, Infallible> = fold(expr, &mut |node| {
        Ok(match node {
            Expr::Parameter(p) if p == from => Some(Expr::parameter(to)),
            Expr::Opaque(test) if test.subject() == from => {
                Some(Expr::Opaque(test.with_subject(to.clone())))
            }
            _ => None,
        })
    });
    match renamed {
        Ok(expr) => expr,
        Err(never) => match never {},
    }
}

/// Rebuild `expr` bottom-up, letting `f` replace any node outright.
fn fold<E, F>(expr: &Expr, f: &mut F) -> Result<Expr, E>
where
    F: FnMut(&Expr) -> Result<Option<Expr>, E>,
{
    if let Some(replaced) = f(expr)? {
        return Ok(replaced);
    }

    Ok(match expr {
        Expr::Parameter(_) | Expr::Constant(_) | Expr::Opaque(_) => expr.clone(),
        Expr::Member { target, member } => Expr::member(fold(target, f)?, member.clone()),
        Expr::Project { target, projection } => Expr::project(fold(target, f)?, projection.clone()),
        Expr::Compare { op, left, right } => Expr::compare(*op, fold(left, f)?, fold(right, f)?),
        Expr::Call { method, target, args } => {
            let target = fold(target, f)?;
            let args = args
                .iter()
                .map(|arg| fold(arg, f))
                .collect::<Result<Vec<_>, E>>()?;
            Expr::call(*method, target, args)
        }
        Expr::And(left, right) => Expr::and(fold(left, f)?, fold(right, f)?),
        Expr::Or(left, right) => Expr::or(fold(left, f)?, fold(right, f)?),
        Expr::Not(inner) => Expr::Not(Box::new(fold(inner, f)?)),
    })
}
