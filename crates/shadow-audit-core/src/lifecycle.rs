//! Audit lifecycle management
//!
//! Per table, an audit moves through these states:
//!
//! ```text
//! NoAudit --create--> Active --remove--> Removed --create--> Active
//!                       \--create (again)--> Active (rebuilt, history discarded)
//! ```
//!
//! A create that fails midway leaves a `Partial` state (for example a shadow
//! table without its trigger function). Nothing is rolled back across steps;
//! running `create` again is the recovery path, since every step either drops
//! before creating or uses `CREATE OR REPLACE`.
//!
//! Status checks never fail. Mutations return [`AuditError`]s that keep the
//! underlying cause in their message. Bulk operations run one table at a time
//! and record each failure instead of aborting.

use serde::Serialize;
use shadow_audit_common::TableRef;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::builder::{
    AuditNames, AuditStructureBuilder, SHADOW_TABLE_PREFIX, TRY_DECRYPT_FUNCTION,
    UNDECRYPTABLE_MARKER,
};
use crate::cipher::{EncryptionKey, NameCipher};
use crate::config::{
    AuditConfig, DEFAULT_CONTROL_SCHEMA, DEFAULT_READ_LIMIT, DEFAULT_REGISTRY_TABLE,
    DEFAULT_SECRET_TABLE, DEFAULT_TABLE_SCHEMA,
};
use crate::db::{DbError, PgExecutor, SqlExecutor};
use crate::error::{AuditError, AuditResult};
use crate::keys::{DbKeyProvider, KeyProvider};
use crate::reader::AuditReader;
use crate::registry::ShadowRegistry;
use crate::schema::{Catalog, PgCatalog};
use crate::sql::{Ident, QualifiedName};

/// Database objects shared by every audited table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlObjects {
    pub secret_table: QualifiedName,
    pub registry_table: QualifiedName,
    pub try_decrypt: QualifiedName,
    /// Schema for unqualified table references.
    pub default_schema: String,
}

impl ControlObjects {
    pub fn from_config(config: &AuditConfig) -> AuditResult<Self> {
        let schema = config.control_schema.as_str();
        Ok(Self {
            secret_table: QualifiedName::new(schema, config.secret_table.as_str())?,
            registry_table: QualifiedName::new(schema, config.registry_table.as_str())?,
            try_decrypt: QualifiedName::new(schema, TRY_DECRYPT_FUNCTION)?,
            default_schema: config.default_schema.clone(),
        })
    }

    fn is_control_table(&self, schema: &str, table: &str) -> bool {
        [&self.secret_table, &self.registry_table]
            .iter()
            .any(|q| q.schema.as_str() == schema && q.name.as_str() == table)
    }

    /// Statements that install the control objects. All are idempotent.
    pub fn bootstrap_ddl(&self, registry: &ShadowRegistry) -> Vec<String> {
        vec![
            "CREATE EXTENSION IF NOT EXISTS pgcrypto".to_string(),
            format!("CREATE SCHEMA IF NOT EXISTS {}", self.secret_table.schema),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    id BIGSERIAL PRIMARY KEY,\n    secret TEXT NOT NULL,\n    created_at TIMESTAMPTZ NOT NULL DEFAULT now()\n)",
                self.secret_table
            ),
            registry.create_table_ddl(),
            format!(
                r#"CREATE OR REPLACE FUNCTION {}(p_value BYTEA, p_key TEXT) RETURNS TEXT
LANGUAGE plpgsql STABLE
AS $shadow_audit$
BEGIN
    IF p_value IS NULL THEN
        RETURN NULL;
    END IF;
    RETURN pgp_sym_decrypt(p_value, p_key);
EXCEPTION WHEN OTHERS THEN
    RETURN '{}';
END;
$shadow_audit$"#,
                self.try_decrypt, UNDECRYPTABLE_MARKER
            ),
        ]
    }
}

impl Default for ControlObjects {
    fn default() -> Self {
        let schema = || Ident::trusted(DEFAULT_CONTROL_SCHEMA);
        Self {
            secret_table: QualifiedName {
                schema: schema(),
                name: Ident::trusted(DEFAULT_SECRET_TABLE),
            },
            registry_table: QualifiedName {
                schema: schema(),
                name: Ident::trusted(DEFAULT_REGISTRY_TABLE),
            },
            try_decrypt: QualifiedName {
                schema: schema(),
                name: Ident::trusted(TRY_DECRYPT_FUNCTION),
            },
            default_schema: DEFAULT_TABLE_SCHEMA.to_string(),
        }
    }
}

/// The four independent existence checks for one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStatus {
    pub table_exists: bool,
    pub shadow_table_exists: bool,
    pub triggers_exist: bool,
    pub function_exists: bool,
}

/// Lifecycle state derived from an [`AuditStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditState {
    NoAudit,
    Active,
    /// Shadow table kept, triggers and function gone.
    Removed,
    Partial,
}

impl AuditStatus {
    pub fn state(&self) -> AuditState {
        match (self.shadow_table_exists, self.function_exists, self.triggers_exist) {
            (false, false, false) => AuditState::NoAudit,
            (true, true, true) => AuditState::Active,
            (true, false, false) => AuditState::Removed,
            _ => AuditState::Partial,
        }
    }
}

impl std::fmt::Display for AuditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AuditState::NoAudit => "no audit",
            AuditState::Active => "active",
            AuditState::Removed => "removed",
            AuditState::Partial => "partial",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Also drop the shadow table and its recorded history.
    pub drop_shadow: bool,
}

/// One table that failed within a bulk operation
#[derive(Debug)]
pub struct BulkFailure {
    pub table: TableRef,
    pub error: AuditError,
}

/// Per-item accounting for a bulk operation
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: Vec<TableRef>,
    pub failed: Vec<BulkFailure>,
    pub total: usize,
}

impl BulkOutcome {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn record(&mut self, table: &TableRef, result: AuditResult<()>) {
        match result {
            Ok(()) => self.succeeded.push(table.clone()),
            Err(error) => self.failed.push(BulkFailure {
                table: table.clone(),
                error,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Orchestrates create, remove and status for audited tables
#[derive(Clone)]
pub struct AuditLifecycleManager {
    executor: Arc<dyn SqlExecutor>,
    catalog: Arc<dyn Catalog>,
    keys: Arc<dyn KeyProvider>,
    control: ControlObjects,
    registry: ShadowRegistry,
    read_limit: i64,
}

impl AuditLifecycleManager {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        catalog: Arc<dyn Catalog>,
        keys: Arc<dyn KeyProvider>,
        control: ControlObjects,
    ) -> Self {
        let registry = ShadowRegistry::new(executor.clone(), control.registry_table.clone());
        Self {
            executor,
            catalog,
            keys,
            control,
            registry,
            read_limit: DEFAULT_READ_LIMIT,
        }
    }

    /// Default row limit handed to readers created by [`reader`](Self::reader).
    pub fn with_read_limit(mut self, limit: i64) -> Self {
        self.read_limit = limit;
        self
    }

    /// Wire the PostgreSQL implementations of every collaborator over `pool`.
    pub fn from_pool(pool: PgPool, config: &AuditConfig) -> AuditResult<Self> {
        let control = ControlObjects::from_config(config)?;
        let executor: Arc<dyn SqlExecutor> = Arc::new(PgExecutor::new(pool));
        let catalog = Arc::new(PgCatalog::new(executor.clone()));
        let keys = Arc::new(DbKeyProvider::new(
            executor.clone(),
            control.secret_table.clone(),
            config.key_cache_policy(),
        ));
        Ok(Self::new(executor, catalog, keys, control).with_read_limit(config.read_limit))
    }

    /// A reader sharing this manager's collaborators.
    pub fn reader(&self) -> AuditReader {
        AuditReader::new(
            self.executor.clone(),
            self.catalog.clone(),
            self.keys.clone(),
            self.control.try_decrypt.clone(),
        )
        .with_default_limit(self.read_limit)
    }

    pub fn executor(&self) -> &Arc<dyn SqlExecutor> {
        &self.executor
    }

    pub fn keys(&self) -> &Arc<dyn KeyProvider> {
        &self.keys
    }

    pub fn control(&self) -> &ControlObjects {
        &self.control
    }

    pub fn registry(&self) -> &ShadowRegistry {
        &self.registry
    }

    /// Parse a user-supplied table reference against the configured default schema.
    pub fn parse_table(&self, input: &str) -> AuditResult<TableRef> {
        Ok(TableRef::parse(input, &self.control.default_schema)?)
    }

    async fn builder(&self) -> AuditResult<(AuditStructureBuilder, EncryptionKey)> {
        let key = self.keys.current_key().await?;
        let builder =
            AuditStructureBuilder::new(NameCipher::new(&key), self.control.secret_table.clone());
        Ok((builder, key))
    }

    /// Encrypted names for `table` under the current key.
    pub async fn names(&self, table: &TableRef) -> AuditResult<AuditNames> {
        let (builder, _) = self.builder().await?;
        builder.names(table)
    }

    /// Install pgcrypto, the secret table, the registry and the decrypt helper.
    pub async fn bootstrap(&self) -> AuditResult<()> {
        let statements = self.control.bootstrap_ddl(&self.registry);
        self.executor
            .execute_batch(&statements)
            .await
            .map_err(|e| match e {
                DbError::Connection(_) => AuditError::from(e),
                other => AuditError::AuditCreation {
                    table: self.control.secret_table.to_string(),
                    message: format!("bootstrap failed: {}", other),
                },
            })?;

        info!(
            secret_table = %self.control.secret_table,
            registry_table = %self.control.registry_table,
            "Control objects installed"
        );
        Ok(())
    }

    /// Create, or rebuild, the shadow table, trigger function and triggers for `table`.
    pub async fn create(&self, table: &TableRef) -> AuditResult<AuditNames> {
        if !self.catalog.table_exists(table).await {
            return Err(AuditError::TableNotFound(table.clone()));
        }

        let (builder, key) = self
            .builder()
            .await
            .map_err(|e| AuditError::creation(table, e))?;

        let columns = self
            .catalog
            .columns(table)
            .await
            .map_err(|e| AuditError::creation(table, format!("reading columns: {}", e)))?;

        let structure = builder.structure(table, &columns).map_err(|e| match e {
            AuditError::TableNotFound(_) => e,
            other => AuditError::creation(table, other),
        })?;

        debug!(table = %table, shadow = %structure.names.shadow_table, "Creating shadow table");
        self.executor
            .execute_batch(&structure.shadow_table_ddl())
            .await
            .map_err(|e| AuditError::creation(table, format!("creating shadow table: {}", e)))?;

        self.executor
            .execute_batch(&[structure.trigger_function_ddl(builder.secret_table())])
            .await
            .map_err(|e| {
                AuditError::creation(table, format!("creating trigger function: {}", e))
            })?;

        let mut triggers = structure.names.drop_triggers_ddl();
        triggers.extend(structure.trigger_ddl());
        self.executor
            .execute_batch(&triggers)
            .await
            .map_err(|e| AuditError::creation(table, format!("creating triggers: {}", e)))?;

        self.registry
            .record(&structure.names, &key.fingerprint())
            .await
            .map_err(|e| AuditError::creation(table, format!("recording registry entry: {}", e)))?;

        info!(
            table = %table,
            shadow = %structure.names.shadow_table,
            columns = structure.columns.len(),
            "Audit created"
        );
        Ok(structure.names)
    }

    /// Drop the triggers and trigger function. The shadow table is kept unless
    /// `options.drop_shadow` is set.
    pub async fn remove(&self, table: &TableRef, options: RemoveOptions) -> AuditResult<()> {
        let (builder, key) = self
            .builder()
            .await
            .map_err(|e| AuditError::removal(table, e))?;
        let names = builder
            .names(table)
            .map_err(|e| AuditError::removal(table, e))?;

        for statement in names.drop_triggers_ddl() {
            if let Err(e) = self.executor.execute(&statement, &[]).await {
                warn!(table = %table, error = %e, "Failed to drop audit trigger, continuing");
            }
        }

        self.executor
            .execute(&names.drop_function_ddl(), &[])
            .await
            .map_err(|e| AuditError::removal(table, format!("dropping trigger function: {}", e)))?;

        let fingerprint = key.fingerprint();
        if options.drop_shadow {
            self.executor
                .execute(&names.drop_shadow_table_ddl(), &[])
                .await
                .map_err(|e| AuditError::removal(table, format!("dropping shadow table: {}", e)))?;
            if let Err(e) = self.registry.forget(table, &fingerprint).await {
                warn!(table = %table, error = %e, "Failed to delete registry entry");
            }
        } else if let Err(e) = self.registry.deactivate(table, &fingerprint).await {
            warn!(table = %table, error = %e, "Failed to deactivate registry entry");
        }

        info!(table = %table, dropped_shadow = options.drop_shadow, "Audit removed");
        Ok(())
    }

    /// Check the four existence flags. Never fails; anything unresolvable is `false`.
    pub async fn status(&self, table: &TableRef) -> AuditStatus {
        let table_exists = self.catalog.table_exists(table).await;

        let names = match self.names(table).await {
            Ok(names) => names,
            Err(e) => {
                debug!(table = %table, error = %e, "Cannot derive audit names, reporting absent");
                return AuditStatus {
                    table_exists,
                    ..Default::default()
                };
            },
        };

        let shadow_table_exists = match names.shadow_ref() {
            Ok(shadow) => self.catalog.table_exists(&shadow).await,
            Err(_) => false,
        };
        let triggers_exist = self
            .catalog
            .triggers_exist(table, &names.trigger_names())
            .await;
        let function_exists = self
            .catalog
            .function_exists(names.function.schema.as_str(), names.function.name.as_str())
            .await;

        AuditStatus {
            table_exists,
            shadow_table_exists,
            triggers_exist,
            function_exists,
        }
    }

    pub async fn status_many(&self, tables: &[TableRef]) -> Vec<(TableRef, AuditStatus)> {
        let mut statuses = Vec::with_capacity(tables.len());
        for table in tables {
            statuses.push((table.clone(), self.status(table).await));
        }
        statuses
    }

    /// Create audits one table at a time, calling `on_progress(done, total, table)` after each.
    pub async fn bulk_create<F>(&self, tables: &[TableRef], mut on_progress: F) -> BulkOutcome
    where
        F: FnMut(usize, usize, &TableRef) + Send,
    {
        let mut outcome = BulkOutcome::with_total(tables.len());
        for (i, table) in tables.iter().enumerate() {
            let result = self.create(table).await.map(|_| ());
            if let Err(e) = &result {
                warn!(table = %table, error = %e, "Audit creation failed");
            }
            outcome.record(table, result);
            on_progress(i + 1, outcome.total, table);
        }

        info!(
            total = outcome.total,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Bulk audit creation finished"
        );
        outcome
    }

    pub async fn bulk_remove<F>(
        &self,
        tables: &[TableRef],
        options: RemoveOptions,
        mut on_progress: F,
    ) -> BulkOutcome
    where
        F: FnMut(usize, usize, &TableRef) + Send,
    {
        let mut outcome = BulkOutcome::with_total(tables.len());
        for (i, table) in tables.iter().enumerate() {
            let result = self.remove(table, options).await;
            if let Err(e) = &result {
                warn!(table = %table, error = %e, "Audit removal failed");
            }
            outcome.record(table, result);
            on_progress(i + 1, outcome.total, table);
        }

        info!(
            total = outcome.total,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Bulk audit removal finished"
        );
        outcome
    }

    /// Auditable tables in `schema`: shadow tables and control tables are left out.
    ///
    /// Without a key, shadow tables cannot be recognised and are listed too.
    pub async fn list_tables(&self, schema: &str) -> AuditResult<Vec<TableRef>> {
        let names = self.catalog.list_tables(schema).await?;
        let cipher = match self.keys.current_key().await {
            Ok(key) => Some(NameCipher::new(&key)),
            Err(e) => {
                debug!(error = %e, "No key available, shadow tables will not be filtered");
                None
            },
        };

        let is_shadow = |name: &str| {
            cipher
                .as_ref()
                .and_then(|c| c.decrypt_name(name).ok())
                .is_some_and(|plain| plain.starts_with(SHADOW_TABLE_PREFIX))
        };

        names
            .into_iter()
            .filter(|name| !self.control.is_control_table(schema, name) && !is_shadow(name))
            .map(|name| TableRef::new(schema, name).map_err(AuditError::from))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_flags() {
        let mut status = AuditStatus::default();
        assert_eq!(status.state(), AuditState::NoAudit);

        status.shadow_table_exists = true;
        assert_eq!(status.state(), AuditState::Removed);

        status.function_exists = true;
        assert_eq!(status.state(), AuditState::Partial);

        status.triggers_exist = true;
        assert_eq!(status.state(), AuditState::Active);
    }

    #[test]
    fn test_control_objects_from_config() {
        let mut config = AuditConfig::default();
        config.control_schema = "audit_ctl".to_string();
        let control = ControlObjects::from_config(&config).unwrap();

        assert_eq!(
            control.secret_table.to_string(),
            "\"audit_ctl\".\"shadow_audit_secret\""
        );
        assert!(control.is_control_table("audit_ctl", "shadow_audit_registry"));
        assert!(!control.is_control_table("public", "shadow_audit_registry"));
        assert_eq!(ControlObjects::default().default_schema, "public");
    }

    #[test]
    fn test_bootstrap_ddl_is_idempotent() {
        let control = ControlObjects::default();
        let registry = ShadowRegistry::new(
            Arc::new(NullExecutor),
            control.registry_table.clone(),
        );
        let ddl = control.bootstrap_ddl(&registry);

        assert_eq!(ddl[0], "CREATE EXTENSION IF NOT EXISTS pgcrypto");
        assert!(ddl[2].starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"shadow_audit_secret\""));
        assert!(ddl[3].starts_with("CREATE TABLE IF NOT EXISTS"));
        assert!(ddl[4].starts_with("CREATE OR REPLACE FUNCTION \"public\".\"shadow_audit_try_decrypt\""));
        assert!(ddl[4].contains("'<undecryptable>'"));
    }

    struct NullExecutor;

    #[async_trait::async_trait]
    impl SqlExecutor for NullExecutor {
        async fn fetch(
            &self,
            _sql: &str,
            _params: &[crate::db::SqlParam],
        ) -> crate::db::DbResult<Vec<crate::db::Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _params: &[crate::db::SqlParam]) -> crate::db::DbResult<u64> {
            Ok(0)
        }

        async fn execute_batch(&self, _statements: &[String]) -> crate::db::DbResult<()> {
            Ok(())
        }
    }
}
