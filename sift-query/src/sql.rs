//! SQL rendering of predicate trees and sort specifications.
//!
//! [`SqlRenderer`] turns a [`PredicateTree`] into a `WHERE` fragment with
//! bind parameters, and a [`SortSpec`] into `ORDER BY` content. Only
//! inspectable nodes can be rendered: opaque tests and set operations on
//! collection properties fail with `UnsupportedNodeKind`.
//!
//! Negation wraps its operand in `COALESCE(.., FALSE)` so that rows with
//! `NULL` properties match the same way they do in memory.
//!
//! ```rust
//! use sift_query::sql::{DatabaseType, SqlRenderer};
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
//! let fragment = SqlRenderer::new(DatabaseType::PostgreSQL).render(&tree).unwrap();
//! assert_eq!(fragment.sql, r#"("Name" LIKE $1 ESCAPE '!' AND "Id" > $2)"#);
//! assert_eq!(fragment.params.len(), 2);
//! ```

use std::fmt::Write;

use tracing::debug;

use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::expr::{CompareOp, Expr, Member, Method, Parameter};
use crate::order::{NullsOrder, OrderKey, SortSpec};
use crate::request::Pagination;
use crate::specification::Specification;
use crate::tree::PredicateTree;
use crate::value::{StringComparison, TypeFamily, Value};

const LIKE_ESCAPE: char = '!';

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL uses $1, $2, etc.
    #[default]
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    SQLite,
}

impl DatabaseType {
    /// Get the parameter placeholder for this database type.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::MySQL => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSQL | Self::SQLite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    fn supports_nulls_ordering(&self) -> bool {
        !matches!(self, Self::MySQL)
    }
}

/// A rendered SQL fragment and its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlFragment {
    /// SQL text.
    pub sql: String,
    /// Bind parameters.
    pub params: Vec<Value>,
}

/// Renders predicate trees and sort specifications for one dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlRenderer {
    db: DatabaseType,
}

impl SqlRenderer {
    /// Create a renderer for `db`.
    pub fn new(db: DatabaseType) -> Self {
        Self { db }
    }

    /// Create a PostgreSQL renderer.
    pub fn postgres() -> Self {
        Self::new(DatabaseType::PostgreSQL)
    }

    /// Create a MySQL renderer.
    pub fn mysql() -> Self {
        Self::new(DatabaseType::MySQL)
    }

    /// Create a SQLite renderer.
    pub fn sqlite() -> Self {
        Self::new(DatabaseType::SQLite)
    }

    /// The target dialect.
    pub fn database(&self) -> DatabaseType {
        self.db
    }

    /// Render a tree as a `WHERE` condition.
    pub fn render<T: Entity>(&self, tree: &PredicateTree<T>) -> QueryResult<SqlFragment> {
        let mut writer = Writer {
            db: self.db,
            root: tree.parameter(),
            fragment: SqlFragment::default(),
        };
        writer
            .condition(tree.body())
            .map_err(|err| err.with_tree(tree).with_entity(T::metadata().name()))?;

        debug!(
            entity = T::metadata().name(),
            tree = %tree.id(),
            params = writer.fragment.params.len(),
            "rendered SQL condition"
        );
        Ok(writer.fragment)
    }

    /// Render a specification as a `WHERE` condition.
    pub fn render_specification<T: Entity>(&self, spec: &Specification<T>) -> QueryResult<SqlFragment> {
        self.render(spec.tree())
    }

    /// Render `ORDER BY` content, e.g. `"Name" ASC, "Id" DESC`.
    ///
    /// Null placement is rendered only where a key sets it explicitly. MySQL
    /// has no `NULLS FIRST`/`NULLS LAST`, so an `IS NULL` key is emitted ahead
    /// of the column instead.
    pub fn render_order<T: Entity>(&self, spec: &SortSpec) -> QueryResult<String> {
        let mut sql = String::new();
        for (i, key) in spec.keys().iter().enumerate() {
            let resolved = OrderKey::<T>::resolve(key)?;
            let column = self.db.quote_identifier(resolved.property_name());
            if i > 0 {
                sql.push_str(", ");
            }
            match key.nulls {
                Some(nulls) if !self.db.supports_nulls_ordering() => {
                    let null_rank = if nulls == NullsOrder::First { "DESC" } else { "ASC" };
                    let _ = write!(sql, "{} IS NULL {}, {} {}", column, null_rank, column, key.order().as_sql());
                }
                Some(nulls) => {
                    let _ = write!(sql, "{} {} {}", column, key.order().as_sql(), nulls.as_sql());
                }
                None => {
                    let _ = write!(sql, "{} {}", column, key.order().as_sql());
                }
            }
        }
        Ok(sql)
    }

    /// Render `LIMIT`/`OFFSET` for `pagination`.
    ///
    /// `bound` is the number of parameters already bound by the statement, so
    /// numbered placeholders continue after them. An offset without a limit
    /// needs an explicit unbounded `LIMIT` on MySQL and SQLite.
    pub fn render_pagination(&self, pagination: &Pagination, bound: usize) -> SqlFragment {
        let mut fragment = SqlFragment::default();
        let bind = |fragment: &mut SqlFragment, n: usize| {
            fragment.params.push(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)));
            self.db.placeholder(bound + fragment.params.len())
        };

        match (pagination.take, self.db) {
            (Some(take), _) => {
                let placeholder = bind(&mut fragment, take);
                let _ = write!(fragment.sql, "LIMIT {}", placeholder);
            }
            (None, _) if pagination.skip == 0 => return fragment,
            (None, DatabaseType::PostgreSQL) => {}
            (None, DatabaseType::MySQL) => fragment.sql.push_str("LIMIT 18446744073709551615"),
            (None, DatabaseType::SQLite) => fragment.sql.push_str("LIMIT -1"),
        }

        if pagination.skip > 0 {
            let placeholder = bind(&mut fragment, pagination.skip);
            if !fragment.sql.is_empty() {
                fragment.sql.push(' ');
            }
            let _ = write!(fragment.sql, "OFFSET {}", placeholder);
        }
        fragment
    }
}

struct Writer<'t> {
    db: DatabaseType,
    root: &'t Parameter,
    fragment: SqlFragment,
}

impl Writer<'_> {
    fn push(&mut self, sql: &str) {
        self.fragment.sql.push_str(sql);
    }

    fn bind(&mut self, value: Value) {
        self.fragment.params.push(value);
        let placeholder = self.db.placeholder(self.fragment.params.len());
        self.push(&placeholder);
    }

    fn condition(&mut self, expr: &Expr) -> QueryResult<()> {
        match expr {
            Expr::Constant(Value::Bool(b)) => {
                self.push(if *b { "TRUE" } else { "FALSE" });
                Ok(())
            }
            Expr::Constant(other) => Err(QueryError::invalid_tree(format!(
                "constant {} used as a condition",
                other
            ))),
            Expr::Member { target, member } => {
                if member.ty().family != TypeFamily::Boolean || member.ty().is_collection() {
                    return Err(QueryError::invalid_tree(format!(
                        "property '{}' of type {} used as a condition",
                        member.name(),
                        member.ty()
                    )));
                }
                let column = self.column(target, member)?;
                self.push(&column);
                self.push(" = ");
                self.bind(Value::Bool(true));
                Ok(())
            }
            Expr::Compare { op, left, right } => {
                if *op == CompareOp::Ne {
                    self.push("NOT COALESCE(");
                    self.comparison(CompareOp::Eq, left, right)?;
                    self.push(", FALSE)");
                    Ok(())
                } else {
                    self.comparison(*op, left, right)
                }
            }
            Expr::Call { method, target, args } => self.call(*method, target, args),
            Expr::And(left, right) => self.junction(" AND ", left, right),
            Expr::Or(left, right) => self.junction(" OR ", left, right),
            Expr::Not(inner) => {
                self.push("NOT COALESCE(");
                self.condition(inner)?;
                self.push(", FALSE)");
                Ok(())
            }
            Expr::Opaque(test) => Err(QueryError::unsupported_node(
                format!("opaque test '{}'", test.label()),
                "SQL rendering",
            )
            .with_help("Opaque tests can only be evaluated in memory")),
            Expr::Parameter(_) | Expr::Project { .. } => Err(QueryError::invalid_tree(format!(
                "entity expression {} used as a condition",
                expr
            ))),
        }
    }

    fn junction(&mut self, keyword: &str, left: &Expr, right: &Expr) -> QueryResult<()> {
        self.push("(");
        self.condition(left)?;
        self.push(keyword);
        self.condition(right)?;
        self.push(")");
        Ok(())
    }

    fn comparison(&mut self, op: CompareOp, left: &Expr, right: &Expr) -> QueryResult<()> {
        self.scalar(left)?;
        let symbol = match op {
            CompareOp::Eq => " = ",
            CompareOp::Ne => " <> ",
            CompareOp::Lt => " < ",
            CompareOp::Lte => " <= ",
            CompareOp::Gt => " > ",
            CompareOp::Gte => " >= ",
        };
        self.push(symbol);
        self.scalar(right)
    }

    fn call(&mut self, method: Method, target: &Expr, args: &[Expr]) -> QueryResult<()> {
        if args.len() != method.arity() {
            return Err(QueryError::invalid_tree(format!(
                "{} expects {} argument(s), got {}",
                method.name(),
                method.arity(),
                args.len()
            )));
        }

        match method {
            Method::Contains(comparison) => self.like(target, &args[0], comparison, true, true),
            Method::StartsWith(comparison) => self.like(target, &args[0], comparison, false, true),
            Method::EndsWith(comparison) => self.like(target, &args[0], comparison, true, false),
            Method::TextEquals(comparison) => {
                let text = text_literal(&args[0], method)?;
                self.text_column(target, comparison)?;
                self.push(" = ");
                self.bind(Value::String(fold_case(text, comparison)));
                Ok(())
            }
            Method::IsDefault => {
                let family = self.scalar_family(target, method)?;
                let column = self.scalar_sql(target)?;
                let _ = write!(self.fragment.sql, "({} IS NULL OR {} = ", column, column);
                self.bind(family.default_value());
                self.push(")");
                Ok(())
            }
            Method::Overlaps => {
                self.scalar_family(target, method)?;
                let Expr::Constant(values) = &args[0] else {
                    return Err(QueryError::unsupported_node(
                        format!("{} with a computed argument", method.name()),
                        "SQL rendering",
                    ));
                };
                let members = values.members();
                if members.is_empty() {
                    self.push("FALSE");
                    return Ok(());
                }
                self.scalar(target)?;
                self.push(" IN (");
                for (i, value) in members.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.bind(value.clone());
                }
                self.push(")");
                Ok(())
            }
            Method::SetEquals => Err(QueryError::unsupported_node(
                format!("{}({})", method.name(), target),
                "SQL rendering",
            )),
        }
    }

    fn like(
        &mut self,
        target: &Expr,
        arg: &Expr,
        comparison: StringComparison,
        leading: bool,
        trailing: bool,
    ) -> QueryResult<()> {
        let method_name = if leading && trailing {
            "Contains"
        } else if trailing {
            "StartsWith"
        } else {
            "EndsWith"
        };
        let Expr::Constant(Value::String(text)) = arg else {
            return Err(QueryError::unsupported_node(
                format!("{} with a non-literal argument {}", method_name, arg),
                "SQL rendering",
            ));
        };

        let mut pattern = String::with_capacity(text.len() + 2);
        if leading {
            pattern.push('%');
        }
        pattern.push_str(&escape_like(&fold_case(text, comparison)));
        if trailing {
            pattern.push('%');
        }

        self.text_column(target, comparison)?;
        self.push(" LIKE ");
        self.bind(Value::String(pattern));
        let _ = write!(self.fragment.sql, " ESCAPE '{}'", LIKE_ESCAPE);
        Ok(())
    }

    fn text_column(&mut self, target: &Expr, comparison: StringComparison) -> QueryResult<()> {
        let column = self.scalar_sql(target)?;
        match comparison {
            StringComparison::Ordinal => self.push(&column),
            StringComparison::IgnoreCase => {
                let _ = write!(self.fragment.sql, "LOWER({})", column);
            }
        }
        Ok(())
    }

    /// Renders a scalar value: a bound constant or a column.
    fn scalar(&mut self, expr: &Expr) -> QueryResult<()> {
        match expr {
            Expr::Constant(Value::List(_)) => Err(QueryError::unsupported_node(
                format!("list literal {}", expr),
                "SQL rendering",
            )),
            Expr::Constant(value) => {
                self.bind(value.clone());
                Ok(())
            }
            _ => {
                let column = self.scalar_sql(expr)?;
                self.push(&column);
                Ok(())
            }
        }
    }

    fn scalar_sql(&self, expr: &Expr) -> QueryResult<String> {
        match expr {
            Expr::Member { target, member } => {
                if member.ty().is_collection() {
                    return Err(QueryError::unsupported_node(
                        format!("collection property {}", expr),
                        "SQL rendering",
                    ));
                }
                self.column(target, member)
            }
            Expr::Parameter(_) | Expr::Project { .. } => Err(QueryError::invalid_tree(format!(
                "entity expression {} used as a value",
                expr
            ))),
            other => Err(QueryError::unsupported_node(
                format!("{} in a value position", other.kind()),
                "SQL rendering",
            )),
        }
    }

    fn scalar_family(&self, target: &Expr, method: Method) -> QueryResult<TypeFamily> {
        match target {
            Expr::Member { member, .. } if member.ty().is_collection() => Err(QueryError::unsupported_node(
                format!("{}({})", method.name(), target),
                "SQL rendering",
            )
            .with_help("Set operations on collection properties can only be evaluated in memory")),
            Expr::Member { member, .. } => Ok(member.ty().family),
            other => Err(QueryError::unsupported_node(
                format!("{} on {}", method.name(), other.kind()),
                "SQL rendering",
            )),
        }
    }

    fn column(&self, target: &Expr, member: &Member) -> QueryResult<String> {
        let mut column = String::new();
        for segment in self.path(target)? {
            column.push_str(&self.db.quote_identifier(segment));
            column.push('.');
        }
        column.push_str(&self.db.quote_identifier(member.name()));
        Ok(column)
    }

    /// Projection labels from the tree parameter down to `target`.
    fn path<'e>(&self, target: &'e Expr) -> QueryResult<Vec<&'e str>> {
        match target {
            Expr::Parameter(parameter) if parameter == self.root => Ok(Vec::new()),
            Expr::Parameter(parameter) => Err(QueryError::invalid_tree(format!(
                "parameter '{}' is not bound by this tree",
                parameter.name()
            ))),
            Expr::Project { target, projection } => {
                let mut path = self.path(target)?;
                path.push(projection.label());
                Ok(path)
            }
            other => Err(QueryError::invalid_tree(format!(
                "{} is not an entity expression",
                other
            ))),
        }
    }
}

fn text_literal(arg: &Expr, method: Method) -> QueryResult<&str> {
    match arg {
        Expr::Constant(Value::String(text)) => Ok(text),
        other => Err(QueryError::unsupported_node(
            format!("{} with a non-literal argument {}", method.name(), other),
            "SQL rendering",
        )),
    }
}

fn fold_case(text: &str, comparison: StringComparison) -> String {
    match comparison {
        StringComparison::Ordinal => text.to_string(),
        StringComparison::IgnoreCase => text.to_lowercase(),
    }
}

/// Escape `LIKE` wildcards with [`LIKE_ESCAPE`].
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
