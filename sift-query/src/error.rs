//! Error types for predicate construction, translation and ordering.
//!
//! Every failure the engine reports is a [`QueryError`] carrying:
//! - an [`ErrorCode`] for programmatic handling
//! - actionable suggestions (for example the closest property names)
//! - context about the entity and property involved
//!
//! # Error Codes
//!
//! Error codes follow a pattern: S{category}{number}
//! - 1xxx: Translation errors (unknown property, type mismatch, arity, parsing)
//! - 2xxx: Tree errors (unsupported node kinds, malformed trees)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use sift_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::property_not_found("User", "Nmae", &["Id", "Name"]);
//! assert_eq!(err.code, ErrorCode::PropertyNotFound);
//! assert!(err.is_property_not_found());
//! assert_eq!(err.code.code(), "S1001");
//! ```
//!
//! Evaluation of a compiled predicate never produces an error; everything here
//! is raised while a tree is being built, translated, rebound or compiled.

use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Translation errors (1xxx)
    /// Property name not present in the entity metadata (S1001).
    PropertyNotFound = 1001,
    /// Declared type incompatible with the property type (S1002).
    TypeMismatch = 1002,
    /// Operator not applicable to the property (S1003).
    UnsupportedOperation = 1003,
    /// Wrong number of values or keys (S1004).
    InvalidArity = 1004,
    /// Literal could not be parsed into the declared type (S1005).
    ValueParseError = 1005,
    /// Malformed request payload (S1006).
    InvalidRequest = 1006,

    // Tree errors (2xxx)
    /// Node kind cannot be handled by the operation (S2001).
    UnsupportedNodeKind = 2001,
    /// Tree is malformed, e.g. references an unbound parameter (S2002).
    InvalidTree = 2002,

    // Configuration errors (7xxx)
    /// Invalid configuration (S7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (S9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "S1001").
    pub fn code(&self) -> String {
        format!("S{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PropertyNotFound => "Property not found",
            Self::TypeMismatch => "Type mismatch",
            Self::UnsupportedOperation => "Unsupported operation",
            Self::InvalidArity => "Invalid arity",
            Self::ValueParseError => "Value parse error",
            Self::InvalidRequest => "Invalid request",
            Self::UnsupportedNodeKind => "Unsupported node kind",
            Self::InvalidTree => "Invalid predicate tree",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }

    /// Get the documentation URL for this error.
    pub fn docs_url(&self) -> String {
        format!("https://sift.rs/docs/errors/{}", self.code())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The entity type involved.
    pub entity: Option<String>,
    /// The property involved.
    pub property: Option<String>,
    /// Rendered predicate tree (if available).
    pub tree: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors raised while building, translating or compiling queries.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the entity.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.context.entity = Some(entity.into());
        self
    }

    /// Set the property.
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.context.property = Some(property.into());
        self
    }

    /// Attach the rendered tree.
    pub fn with_tree(mut self, tree: impl fmt::Display) -> Self {
        self.context.tree = Some(tree.to_string());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a property-not-found error, suggesting the closest known names.
    pub fn property_not_found(entity: &str, property: &str, known: &[&str]) -> Self {
        let mut err = Self::new(
            ErrorCode::PropertyNotFound,
            format!("Property '{}' not found on {}", property, entity),
        )
        .with_entity(entity)
        .with_property(property);

        for candidate in closest_names(property, known) {
            err = err.with_suggestion(format!("Did you mean '{}'?", candidate));
        }
        if !known.is_empty() {
            err = err.with_help(format!("Known properties: {}", known.join(", ")));
        }
        err
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(property: &str, declared: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TypeMismatch,
            format!(
                "Declared type {} is incompatible with property '{}' of type {}",
                declared, property, actual
            ),
        )
        .with_property(property)
        .with_suggestion(format!("Declare the filter as {}", actual))
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(property: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedOperation, message).with_property(property)
    }

    /// Create an invalid arity error.
    pub fn invalid_arity(what: impl fmt::Display, expected: impl fmt::Display, actual: usize) -> Self {
        Self::new(
            ErrorCode::InvalidArity,
            format!("{} expects {} value(s), got {}", what, expected, actual),
        )
    }

    /// Create a value parse error.
    pub fn value_parse(value: &str, declared: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ValueParseError,
            format!("Cannot parse '{}' as {}", value, declared),
        )
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::InvalidRequest, format!("Invalid request: {}", message))
    }

    /// Create an unsupported node kind error.
    pub fn unsupported_node(construct: impl fmt::Display, operation: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedNodeKind,
            format!("{} cannot handle node {}", operation, construct),
        )
        .with_context(operation)
    }

    /// Create an invalid tree error.
    pub fn invalid_tree(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::InvalidTree, format!("Invalid predicate tree: {}", message))
            .with_help("Trees combined from separate builders must be rebound to one parameter")
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid configuration: {}", message),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
            .with_help("This is likely a bug in Sift - please report it at https://github.com/sift-rs/sift/issues")
    }

    // ============== Error Checks ==============

    /// Check if this is a property-not-found error.
    pub fn is_property_not_found(&self) -> bool {
        self.code == ErrorCode::PropertyNotFound
    }

    /// Check if this is a type mismatch.
    pub fn is_type_mismatch(&self) -> bool {
        self.code == ErrorCode::TypeMismatch
    }

    /// Check if this is an unsupported operation.
    pub fn is_unsupported_operation(&self) -> bool {
        self.code == ErrorCode::UnsupportedOperation
    }

    /// Check if this is an arity error.
    pub fn is_invalid_arity(&self) -> bool {
        self.code == ErrorCode::InvalidArity
    }

    /// Check if this is a value parse error.
    pub fn is_value_parse(&self) -> bool {
        self.code == ErrorCode::ValueParseError
    }

    /// Check if this is an unsupported node kind error.
    pub fn is_unsupported_node(&self) -> bool {
        self.code == ErrorCode::UnsupportedNodeKind
    }

    /// Check if this is an invalid tree error.
    pub fn is_invalid_tree(&self) -> bool {
        self.code == ErrorCode::InvalidTree
    }

    /// Check if this error was caused by the request payload rather than the engine.
    pub fn is_client_error(&self) -> bool {
        (self.code as u16) < 2000
    }

    // ============== Display Functions ==============

    /// Get the documentation URL for this error.
    pub fn docs_url(&self) -> String {
        self.code.docs_url()
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref entity) = self.context.entity {
            output.push_str(&format!("  → Entity: {}\n", entity));
        }
        if let Some(ref property) = self.context.property {
            output.push_str(&format!("  → Property: {}\n", property));
        }
        if let Some(ref tree) = self.context.tree {
            let tree_display = if tree.len() > 200 {
                let cut = (0..=200).rev().find(|i| tree.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &tree[..cut])
            } else {
                tree.clone()
            };
            output.push_str(&format!("  → Tree: {}\n", tree_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output.push_str(&format!("\nMore info: {}\n", self.docs_url()));

        output
    }
}

/// Up to three known names within edit distance 2 of `name`, closest first.
fn closest_names<'a>(name: &str, known: &[&'a str]) -> Vec<&'a str> {
    let lowered = name.to_lowercase();
    let mut scored: Vec<(usize, &'a str)> = known
        .iter()
        .map(|candidate| (levenshtein(&lowered, &candidate.to_lowercase()), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, candidate)| candidate).collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut previous = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let current = row[j + 1];
            row[j + 1] = if ca == *cb {
                previous
            } else {
                1 + previous.min(row[j]).min(current)
            };
            previous = current;
        }
    }

    row[b.len()]
}
