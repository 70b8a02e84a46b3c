//! Database access layer
//!
//! The audit components never talk to `sqlx` directly. They go through the
//! [`SqlExecutor`] capability defined in [`executor`], which [`PgExecutor`]
//! implements over a connection pool.

mod executor;

pub use executor::{PgExecutor, Row, SqlExecutor, SqlParam};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// The server could not be reached or the pool is unusable
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// SQL statement failed
    #[error("Database query failed: {0}")]
    Query(sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// A column value could not be decoded
    #[error("Failed to decode column: {0}")]
    Decode(String),
}

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn decode(column: &str, type_name: &str) -> Self {
        Self::Decode(format!("column '{}' has unsupported type {}", column, type_name))
    }

    /// True when the failure is about reaching the server rather than the statement.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => DbError::Connection(err.to_string()),
            other => DbError::Query(other),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
