//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::keys::KeyCachePolicy;
use crate::sql::Ident;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://postgres@localhost:5432/postgres";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (5 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 300;

/// Schema assumed for unqualified table references.
pub const DEFAULT_TABLE_SCHEMA: &str = "public";

/// Schema holding the secret table, the registry and the helper function.
pub const DEFAULT_CONTROL_SCHEMA: &str = "public";

/// Default name of the table storing the encryption key.
pub const DEFAULT_SECRET_TABLE: &str = "shadow_audit_secret";

/// Default name of the shadow registry table.
pub const DEFAULT_REGISTRY_TABLE: &str = "shadow_audit_registry";

/// Default key cache lifetime in seconds. Zero disables caching.
pub const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 300;

/// Default number of audit rows returned by a read.
pub const DEFAULT_READ_LIMIT: i64 = 100;

/// Upper bound for any read, whatever the caller asks for.
pub const MAX_READ_LIMIT: i64 = 10_000;

/// Shadow audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub audit: AuditConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Audit object placement and runtime policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub default_schema: String,
    pub control_schema: String,
    pub secret_table: String,
    pub registry_table: String,
    pub key_cache_ttl_secs: u64,
    pub read_limit: i64,
}

impl AuditConfig {
    pub fn key_cache_policy(&self) -> KeyCachePolicy {
        if self.key_cache_ttl_secs == 0 {
            KeyCachePolicy::Disabled
        } else {
            KeyCachePolicy::Ttl(Duration::from_secs(self.key_cache_ttl_secs))
        }
    }

    /// Clamp a requested row limit into `1..=MAX_READ_LIMIT`, falling back to the configured default.
    pub fn effective_limit(&self, requested: Option<i64>) -> i64 {
        requested.unwrap_or(self.read_limit).clamp(1, MAX_READ_LIMIT)
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            audit: AuditConfig {
                default_schema: env_string("SHADOW_DEFAULT_SCHEMA", DEFAULT_TABLE_SCHEMA),
                control_schema: env_string("SHADOW_CONTROL_SCHEMA", DEFAULT_CONTROL_SCHEMA),
                secret_table: env_string("SHADOW_SECRET_TABLE", DEFAULT_SECRET_TABLE),
                registry_table: env_string("SHADOW_REGISTRY_TABLE", DEFAULT_REGISTRY_TABLE),
                key_cache_ttl_secs: env_or("SHADOW_KEY_CACHE_TTL", DEFAULT_KEY_CACHE_TTL_SECS),
                read_limit: env_or("SHADOW_READ_LIMIT", DEFAULT_READ_LIMIT),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        for (what, name) in [
            ("default schema", &self.audit.default_schema),
            ("control schema", &self.audit.control_schema),
            ("secret table", &self.audit.secret_table),
            ("registry table", &self.audit.registry_table),
        ] {
            Ident::new(name.as_str())
                .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", what, name, e))?;
        }

        if self.audit.read_limit <= 0 {
            anyhow::bail!("Read limit must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_schema: DEFAULT_TABLE_SCHEMA.to_string(),
            control_schema: DEFAULT_CONTROL_SCHEMA.to_string(),
            secret_table: DEFAULT_SECRET_TABLE.to_string(),
            registry_table: DEFAULT_REGISTRY_TABLE.to_string(),
            key_cache_ttl_secs: DEFAULT_KEY_CACHE_TTL_SECS,
            read_limit: DEFAULT_READ_LIMIT,
        }
    }
}
