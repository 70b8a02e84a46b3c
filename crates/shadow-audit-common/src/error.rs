//! Error types for shared Shadow Audit types

use thiserror::Error;

/// Result type alias for parsing shared types
pub type Result<T> = std::result::Result<T, TypeError>;

/// Errors raised while parsing or validating shared types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Table reference cannot be empty")]
    EmptyTableRef,

    #[error("Invalid table reference '{0}': expected 'table' or 'schema.table'")]
    InvalidTableRef(String),

    #[error("The {0} part of a table reference cannot be empty")]
    EmptyPart(&'static str),

    #[error("The {0} name contains a NUL character")]
    InvalidCharacter(&'static str),

    #[error("The {what} name exceeds {max} bytes")]
    TooLong { what: &'static str, max: usize },

    #[error("Invalid action '{0}': expected INSERT, UPDATE or DELETE")]
    InvalidAction(String),
}
