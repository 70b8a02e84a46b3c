//! Core error types

use shadow_audit_common::{TableRef, TypeError};
use thiserror::Error;

use crate::cipher::CipherError;
use crate::db::DbError;

/// Result type alias for audit operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Errors surfaced by the audit lifecycle, reader and supporting services
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Table not found: {0}")]
    TableNotFound(TableRef),

    #[error("Failed to create audit for {table}: {message}")]
    AuditCreation { table: String, message: String },

    #[error("Failed to remove audit for {table}: {message}")]
    AuditRemoval { table: String, message: String },

    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Invalid identifier: {0}")]
    Identifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl AuditError {
    /// Wrap any failure of the create pipeline, keeping the cause in the message.
    pub fn creation(table: &TableRef, cause: impl std::fmt::Display) -> Self {
        Self::AuditCreation {
            table: table.to_string(),
            message: cause.to_string(),
        }
    }

    /// Wrap a failure of the remove pipeline.
    pub fn removal(table: &TableRef, cause: impl std::fmt::Display) -> Self {
        Self::AuditRemoval {
            table: table.to_string(),
            message: cause.to_string(),
        }
    }

    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<DbError> for AuditError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(message) => AuditError::DatabaseConnection(message),
            other => AuditError::Database(other),
        }
    }
}

impl From<CipherError> for AuditError {
    fn from(err: CipherError) -> Self {
        AuditError::Encryption(err.to_string())
    }
}

impl From<TypeError> for AuditError {
    fn from(err: TypeError) -> Self {
        AuditError::Identifier(err.to_string())
    }
}
