//! # sift-query
//!
//! Declarative predicate and query-composition engine.
//!
//! This crate provides:
//! - Predicate trees over entity properties, built with a typed DSL
//! - Specifications combined with AND, OR, NOT and lifted through projections
//! - A parameter rebinder for splicing trees built against different parameters
//! - A compiled-predicate cache keyed by tree identity
//! - A translator from request filters (`FilterSpec`) to specifications
//! - A multi-key order builder driven by request sort keys
//! - Query plans that filter, order and page any [`QuerySource`]
//! - SQL rendering of trees and sort keys
//!
//! ## Specifications
//!
//! ```rust
//! use sift_query::prelude::*;
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
//! let high = Specification::<Permission>::build(|x| Ok(x.property("Id")?.gt(2))).unwrap();
//! let spec = can.and(&high.not());
//!
//! let row = Permission { id: 1, name: "canEditUser".into() };
//! assert!(spec.is_satisfied_by(&row).unwrap());
//! ```
//!
//! ## Requests
//!
//! ```rust
//! use sift_query::prelude::*;
//! # use std::sync::OnceLock;
//! # #[derive(Debug)]
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
//! let request = QueryRequest::from_json(r#"{
//!     "filters": [{ "propertyName": "Name", "declaredType": "String", "operator": "Contains", "value": "User" }],
//!     "sort": [{ "propertyName": "Id", "descending": true }]
//! }"#).unwrap();
//!
//! let plan = QueryPlan::<Permission>::from_request(&request, &EngineConfig::default()).unwrap();
//! let rows = plan.apply(MemorySource::new(vec![
//!     Permission { id: 1, name: "canEditUser".into() },
//!     Permission { id: 2, name: "readReports".into() },
//!     Permission { id: 3, name: "canViewUser".into() },
//! ])).unwrap().into_vec();
//!
//! assert_eq!(rows.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 1]);
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use sift_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::property_not_found("Permission", "Nmae", &["Id", "Name"]);
//! assert_eq!(err.code, ErrorCode::PropertyNotFound);
//! assert!(err.display_full().contains("Did you mean 'Name'?"));
//! ```

pub mod cache;
pub mod compile;
pub mod config;
pub mod entity;
pub mod error;
pub mod expr;
pub mod logging;
pub mod order;
pub mod rebind;
pub mod request;
pub mod source;
pub mod specification;
pub mod sql;
pub mod translate;
pub mod tree;
pub mod value;

pub use cache::{CacheStats, PredicateCache};
pub use compile::{CompiledPredicate, compile};
pub use config::EngineConfig;
pub use entity::{Entity, EntityMetadata, EntityMetadataBuilder, Property};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use expr::{CompareOp, Expr, Method, Parameter, Projection};
pub use order::{
    CompositeOrder, NullsOrder, OrderBuilder, OrderKey, SortKey, SortOrder, SortSpec, apply_order,
};
pub use rebind::ParameterRebinder;
pub use request::{Pagination, QueryPlan, QueryRequest};
pub use source::{MemorySource, QuerySource};
pub use specification::Specification;
pub use sql::{DatabaseType, SqlFragment, SqlRenderer};
pub use translate::{FilterOperator, FilterSpec, FilterTranslator, translate};
pub use tree::{Condition, Operand, PredicateTree, Subject, TreeId};
pub use value::{PropertyType, PropertyValue, Shape, StringComparison, TypeFamily, Value};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, init_with_level, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::entity::{Entity, EntityMetadata};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::order::{NullsOrder, OrderBuilder, SortKey, SortSpec};
    pub use crate::request::{QueryPlan, QueryRequest};
    pub use crate::source::{MemorySource, QuerySource};
    pub use crate::specification::Specification;
    pub use crate::translate::{FilterOperator, FilterSpec, FilterTranslator};
    pub use crate::tree::{Condition, PredicateTree};
    pub use crate::value::{StringComparison, TypeFamily, Value};
}
