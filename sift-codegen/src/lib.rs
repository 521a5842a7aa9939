//! Procedural macros for the Sift query engine.
//!
//! # Macros
//!
//! - [`Entity`] - Derive entity metadata (the property lookup table) for a struct
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(sift::Entity)]
//! #[sift(name = "Permission")]
//! struct Permission {
//!     id: i64,
//!     name: String,
//!     level: Option<i32>,
//!     #[sift(rename = "RoleIds")]
//!     roles: BTreeSet<i64>,
//!     #[sift(skip)]
//!     audit_note: String,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod derive;

/// Derive `Entity` for a struct with named fields.
///
/// Every field becomes a property whose type comes from the field's
/// `PropertyValue` implementation. Property names default to the field name
/// in PascalCase.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[sift(name = "Name")]` - Entity name used in errors and logs (default: struct name)
/// - `#[sift(rename_all = "camelCase")]` - Naming rule for properties: `PascalCase`,
///   `camelCase`, `snake_case`, `SCREAMING_SNAKE_CASE`, `kebab-case`, `lowercase`,
///   `UPPERCASE` or `verbatim`
///
/// ## Field-level
/// - `#[sift(rename = "Name")]` - Property name for this field
/// - `#[sift(skip)]` - Do not expose this field
#[proc_macro_derive(Entity, attributes(sift))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive::derive_entity_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
