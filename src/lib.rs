//! # Sift
//!
//! Composable, inspectable predicate trees and dynamic ordering for typed
//! entities.
//!
//! Sift provides:
//! - Predicate trees over entity properties that can be inspected, rendered and compiled
//! - Specifications combined with AND, OR, NOT and lifted onto parent entities
//! - A compiled-predicate cache keyed by tree identity
//! - Translation of request filters and sort keys into specifications and orderings
//! - `#[derive(Entity)]` for generating property lookup tables
//!
//! ## Quick Start
//!
//! ```rust
//! use sift::prelude::*;
//!
//! #[derive(Debug, Entity)]
//! struct Permission {
//!     id: i64,
//!     name: String,
//!     level: Option<i32>,
//! }
//!
//! let admin = Specification::<Permission>::build(|x| Ok(x.property("Level")?.gte(4))).unwrap();
//! let editor = Specification::<Permission>::build(|x| Ok(x.property("Name")?.contains("Edit"))).unwrap();
//!
//! let rows = vec![
//!     Permission { id: 1, name: "canEditUser".into(), level: Some(3) },
//!     Permission { id: 2, name: "readReports".into(), level: None },
//!     Permission { id: 3, name: "manageBilling".into(), level: Some(4) },
//! ];
//!
//! let matches = admin.or(&editor).filter_slice(&rows).unwrap();
//! assert_eq!(matches.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The query engine.
pub use sift_query as query;

// Re-export the engine at the crate root
pub use sift_query::*;

// Re-export proc macros
pub use sift_codegen::Entity;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sift_query::prelude::*;

    pub use crate::Entity;
}
