//! Shadow registry
//!
//! Records which shadow structures exist for which table under which key
//! version. Names are still recomputed from the key, but the registry makes
//! the relationship queryable: after a key rotation, entries recorded under
//! the old fingerprint are the structures the new key can no longer find.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadow_audit_common::TableRef;
use std::sync::Arc;
use tracing::debug;

use crate::builder::AuditNames;
use crate::db::{Row, SqlExecutor, SqlParam};
use crate::error::AuditResult;
use crate::sql::QualifiedName;

/// A recorded audit structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub original_schema: String,
    pub original_table: String,
    pub key_fingerprint: String,
    pub shadow_table: String,
    pub function_name: String,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RegistryEntry {
    pub fn table(&self) -> AuditResult<TableRef> {
        Ok(TableRef::new(
            self.original_schema.as_str(),
            self.original_table.as_str(),
        )?)
    }

    fn from_row(row: &Row) -> Self {
        let text = |name: &str| row.get_str(name).unwrap_or_default().to_string();
        let timestamp = |name: &str| {
            row.get_str(name)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        };

        Self {
            original_schema: text("original_schema"),
            original_table: text("original_table"),
            key_fingerprint: text("key_fingerprint"),
            shadow_table: text("shadow_table"),
            function_name: text("function_name"),
            active: row.get_bool("active").unwrap_or(false),
            created_at: timestamp("created_at"),
            updated_at: timestamp("updated_at"),
        }
    }
}

/// Reads and writes the registry table
#[derive(Clone)]
pub struct ShadowRegistry {
    executor: Arc<dyn SqlExecutor>,
    table: QualifiedName,
}

impl ShadowRegistry {
    pub fn new(executor: Arc<dyn SqlExecutor>, table: QualifiedName) -> Self {
        Self { executor, table }
    }

    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// `CREATE TABLE IF NOT EXISTS` for the registry itself.
    pub fn create_table_ddl(&self) -> String {
        format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
    original_schema TEXT NOT NULL,
    original_table TEXT NOT NULL,
    key_fingerprint TEXT NOT NULL,
    shadow_table TEXT NOT NULL,
    function_name TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (original_schema, original_table, key_fingerprint)
)"#,
            self.table
        )
    }

    /// Upsert an active entry for `names` under `fingerprint`.
    pub async fn record(&self, names: &AuditNames, fingerprint: &str) -> AuditResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                original_schema, original_table, key_fingerprint,
                shadow_table, function_name, active
            )
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (original_schema, original_table, key_fingerprint)
            DO UPDATE SET shadow_table = EXCLUDED.shadow_table,
                          function_name = EXCLUDED.function_name,
                          active = TRUE,
                          updated_at = now()
            "#,
            self.table
        );

        self.executor
            .execute(
                &sql,
                &[
                    SqlParam::from(names.table.schema.as_str()),
                    SqlParam::from(names.table.table.as_str()),
                    SqlParam::from(fingerprint),
                    SqlParam::from(names.shadow_table.name.as_str()),
                    SqlParam::from(names.function.name.as_str()),
                ],
            )
            .await?;

        debug!(table = %names.table, fingerprint, "Recorded shadow registry entry");
        Ok(())
    }

    /// Mark the entry inactive. Returns whether an entry was found.
    pub async fn deactivate(&self, table: &TableRef, fingerprint: &str) -> AuditResult<bool> {
        let sql = format!(
            "UPDATE {} SET active = FALSE, updated_at = now() \
             WHERE original_schema = $1 AND original_table = $2 AND key_fingerprint = $3",
            self.table
        );
        let affected = self
            .executor
            .execute(&sql, &Self::key_params(table, fingerprint))
            .await?;
        Ok(affected > 0)
    }

    /// Delete the entry. Returns whether an entry was found.
    pub async fn forget(&self, table: &TableRef, fingerprint: &str) -> AuditResult<bool> {
        let sql = format!(
            "DELETE FROM {} \
             WHERE original_schema = $1 AND original_table = $2 AND key_fingerprint = $3",
            self.table
        );
        let affected = self
            .executor
            .execute(&sql, &Self::key_params(table, fingerprint))
            .await?;
        Ok(affected > 0)
    }

    pub async fn list(&self) -> AuditResult<Vec<RegistryEntry>> {
        let sql = format!(
            r#"
            SELECT original_schema, original_table, key_fingerprint,
                   shadow_table, function_name, active, created_at, updated_at
            FROM {}
            ORDER BY original_schema, original_table, created_at
            "#,
            self.table
        );
        let rows = self.executor.fetch(&sql, &[]).await?;
        Ok(rows.iter().map(RegistryEntry::from_row).collect())
    }

    /// Entries recorded under any key other than `current_fingerprint`.
    pub async fn orphaned(&self, current_fingerprint: &str) -> AuditResult<Vec<RegistryEntry>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|e| e.key_fingerprint != current_fingerprint)
            .collect())
    }

    fn key_params(table: &TableRef, fingerprint: &str) -> [SqlParam; 3] {
        [
            SqlParam::from(table.schema.as_str()),
            SqlParam::from(table.table.as_str()),
            SqlParam::from(fingerprint),
        ]
    }
}
