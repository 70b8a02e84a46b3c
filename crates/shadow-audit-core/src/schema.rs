//! Live catalog introspection
//!
//! [`Catalog`] answers the questions the lifecycle and reader need about the
//! database: which columns a table has, and whether a table, function or
//! trigger exists. Existence checks are best effort and answer `false` on any
//! underlying failure; column and table listings return errors so callers can
//! tell a missing table from an unreachable server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shadow_audit_common::TableRef;
use std::sync::Arc;
use tracing::warn;

use crate::db::{DbError, DbResult, Row, SqlExecutor, SqlParam};

/// One column of a table, as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub nullable: bool,
    pub ordinal_position: i64,
}

impl ColumnDescriptor {
    /// A nullable column with no length or precision, handy for fixtures.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: i64) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            nullable: true,
            ordinal_position,
        }
    }

    fn from_row(row: &Row) -> DbResult<Self> {
        let name = row
            .get_str("name")
            .ok_or_else(|| DbError::Decode("column descriptor without a name".to_string()))?;

        Ok(Self {
            name: name.to_string(),
            data_type: row.get_str("data_type").unwrap_or_default().to_string(),
            max_length: row.get_i64("max_length"),
            numeric_precision: row.get_i64("numeric_precision"),
            numeric_scale: row.get_i64("numeric_scale"),
            nullable: row.get_bool("nullable").unwrap_or(true),
            ordinal_position: row.get_i64("ordinal_position").unwrap_or_default(),
        })
    }
}

/// Catalog questions asked by the audit components
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Columns ordered by ordinal position. A missing table yields an empty list.
    async fn columns(&self, table: &TableRef) -> DbResult<Vec<ColumnDescriptor>>;

    async fn table_exists(&self, table: &TableRef) -> bool;

    async fn function_exists(&self, schema: &str, function: &str) -> bool;

    /// True when at least one of `triggers` is defined on `table`.
    async fn triggers_exist(&self, table: &TableRef, triggers: &[String]) -> bool;

    /// Ordinary tables in `schema`, sorted by name.
    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>>;
}

/// [`Catalog`] backed by PostgreSQL's system catalogs
#[derive(Clone)]
pub struct PgCatalog {
    executor: Arc<dyn SqlExecutor>,
}

impl PgCatalog {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    async fn exists(&self, what: &str, sql: &str, params: &[SqlParam]) -> bool {
        match self.executor.fetch(sql, params).await {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.get_bool("found"))
                .unwrap_or(false),
            Err(e) => {
                warn!(check = what, error = %e, "Catalog check failed, assuming absent");
                false
            },
        }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn columns(&self, table: &TableRef) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = self
            .executor
            .fetch(
                r#"
                SELECT column_name::text AS name,
                       data_type::text AS data_type,
                       character_maximum_length::int8 AS max_length,
                       numeric_precision::int8 AS numeric_precision,
                       numeric_scale::int8 AS numeric_scale,
                       (is_nullable = 'YES') AS nullable,
                       ordinal_position::int8 AS ordinal_position
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
                "#,
                &[
                    SqlParam::from(table.schema.as_str()),
                    SqlParam::from(table.table.as_str()),
                ],
            )
            .await?;

        rows.iter().map(ColumnDescriptor::from_row).collect()
    }

    async fn table_exists(&self, table: &TableRef) -> bool {
        self.exists(
            "table",
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_catalog.pg_tables
                WHERE schemaname = $1 AND tablename = $2
            ) AS found
            "#,
            &[
                SqlParam::from(table.schema.as_str()),
                SqlParam::from(table.table.as_str()),
            ],
        )
        .await
    }

    async fn function_exists(&self, schema: &str, function: &str) -> bool {
        self.exists(
            "function",
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_catalog.pg_proc p
                JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
                WHERE n.nspname = $1 AND p.proname = $2
            ) AS found
            "#,
            &[SqlParam::from(schema), SqlParam::from(function)],
        )
        .await
    }

    async fn triggers_exist(&self, table: &TableRef, triggers: &[String]) -> bool {
        if triggers.is_empty() {
            return false;
        }

        let placeholders: Vec<String> = (0..triggers.len()).map(|i| format!("${}", i + 3)).collect();
        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_catalog.pg_trigger t
                JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname = $1 AND c.relname = $2
                  AND NOT t.tgisinternal
                  AND t.tgname IN ({})
            ) AS found
            "#,
            placeholders.join(", ")
        );

        let mut params = vec![
            SqlParam::from(table.schema.as_str()),
            SqlParam::from(table.table.as_str()),
        ];
        params.extend(triggers.iter().map(|t| SqlParam::from(t.as_str())));

        self.exists("triggers", &sql, &params).await
    }

    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>> {
        let primary = self
            .executor
            .fetch(
                "SELECT tablename::text AS name FROM pg_catalog.pg_tables \
                 WHERE schemaname = $1 ORDER BY tablename",
                &[SqlParam::from(schema)],
            )
            .await;

        let rows = match primary {
            Ok(rows) => rows,
            Err(e) => {
                warn!(schema, error = %e, "pg_tables unavailable, falling back to information_schema");
                self.executor
                    .fetch(
                        "SELECT table_name::text AS name FROM information_schema.tables \
                         WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                         ORDER BY table_name",
                        &[SqlParam::from(schema)],
                    )
                    .await?
            },
        };

        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("name").map(str::to_string))
            .collect())
    }
}
