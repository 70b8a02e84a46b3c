//! Error types for the Shadow Audit CLI
//!
//! Every variant is user-facing: the message says what went wrong and, where
//! there is one, which command fixes it.

use shadow_audit_core::db::DbError;
use shadow_audit_core::{AuditError, CipherError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Environment or command-line configuration is invalid
    #[error("Configuration error: {0}. Check DATABASE_URL and the SHADOW_* environment variables.")]
    Config(String),

    /// The database could not be reached
    #[error("Cannot reach the database: {0}. Check DATABASE_URL and that PostgreSQL is running.")]
    Connection(String),

    /// No usable encryption key
    #[error("Encryption key problem: {0}. Run 'shadow-audit setup' and 'shadow-audit key init' first.")]
    Key(String),

    /// A key already exists and rotation was not requested
    #[error("An encryption key already exists (fingerprint {0}). Pass --rotate to replace it; audits created under the old key become orphaned.")]
    KeyExists(String),

    /// A table argument could not be parsed
    #[error("Invalid table '{input}': {reason}")]
    InvalidTable { input: String, reason: String },

    /// Some tables of a bulk operation failed
    #[error("{failed} of {total} tables failed. See the messages above.")]
    PartialFailure { failed: usize, total: usize },

    /// The background task running a lifecycle batch did not finish
    #[error("Background task failed: {0}")]
    Task(String),

    /// Any other audit failure
    #[error(transparent)]
    Audit(AuditError),

    /// Output serialization failed
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_table(input: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidTable {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<AuditError> for CliError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::DatabaseConnection(message) => CliError::Connection(message),
            AuditError::Encryption(message) => CliError::Key(message),
            AuditError::Config(message) => CliError::Config(message),
            other => CliError::Audit(other),
        }
    }
}

impl From<DbError> for CliError {
    fn from(err: DbError) -> Self {
        AuditError::from(err).into()
    }
}

impl From<CipherError> for CliError {
    fn from(err: CipherError) -> Self {
        AuditError::from(err).into()
    }
}
