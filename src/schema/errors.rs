//! # Schema Errors
//!
//! Error types for record reflection.

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Record schema violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Operation requires an id the record does not carry
    #[error("record of type {type_name} has no id")]
    MissingId { type_name: &'static str },

    /// A predicate names a field the record does not index
    #[error("field {field} of {type_name} is not indexed")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },

    /// Textual id could not be decoded
    #[error("invalid id encoding: {0}")]
    InvalidId(String),
}
