//! Connection and manager setup shared by every command

use shadow_audit_common::TableRef;
use shadow_audit_core::config::Config;
use shadow_audit_core::{db, AuditLifecycleManager};
use tracing::debug;

use crate::error::{CliError, Result};

/// Everything a command needs to talk to the database
pub struct Context {
    pub config: Config,
    pub manager: AuditLifecycleManager,
}

impl Context {
    /// Load configuration, apply the `--database-url` override and connect.
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        let mut config = Config::load().map_err(|e| CliError::config(e.to_string()))?;
        if let Some(url) = database_url {
            config.database.url = url.to_string();
            config
                .validate()
                .map_err(|e| CliError::config(e.to_string()))?;
        }

        let pool = db::create_pool(&config.database).await?;
        db::health_check(&pool).await?;
        debug!("Connected to database");

        let manager = AuditLifecycleManager::from_pool(pool, &config.audit)?;
        Ok(Self { config, manager })
    }

    /// Schema given on the command line, or the configured default.
    pub fn schema<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.config.audit.default_schema)
    }

    /// Parse table arguments, reporting the first one that is invalid.
    pub fn parse_tables(&self, inputs: &[String]) -> Result<Vec<TableRef>> {
        inputs
            .iter()
            .map(|input| {
                self.manager
                    .parse_table(input)
                    .map_err(|e| CliError::invalid_table(input, e))
            })
            .collect()
    }
}
