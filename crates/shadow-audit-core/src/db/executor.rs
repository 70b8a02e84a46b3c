//! Statement execution capability and its PostgreSQL implementation

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use super::{DbError, DbResult};

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One result row: field names in select-list order, each with a JSON value.
///
/// `BYTEA` values arrive hex-encoded and timestamps as RFC 3339 strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, mostly useful for fakes and tests.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

/// Injected statement execution capability.
///
/// `fetch` returns rows, `execute` discards them and reports the affected
/// count, `execute_batch` runs DDL statements in one transaction.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>>;

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64>;

    /// Run every statement in a single transaction; the first failure rolls back all of them.
    async fn execute_batch(&self, statements: &[String]) -> DbResult<()>;
}

/// [`SqlExecutor`] over a `sqlx` PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(
    sql: &'q str,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind(value.clone()),
            SqlParam::Int(value) => query.bind(*value),
            SqlParam::Bool(value) => query.bind(*value),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> DbResult<Row> {
    let mut decoded = Row::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let is_null = row.try_get_raw(idx)?.is_null();
        if is_null {
            decoded.push(name, Value::Null);
            continue;
        }

        let type_name = column.type_info().name();
        let value = match type_name {
            "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => Value::from(row.try_get::<String, _>(idx)?),
            "INT2" => Value::from(row.try_get::<i16, _>(idx)?),
            "INT4" => Value::from(row.try_get::<i32, _>(idx)?),
            "INT8" => Value::from(row.try_get::<i64, _>(idx)?),
            "BOOL" => Value::from(row.try_get::<bool, _>(idx)?),
            "BYTEA" => Value::from(hex::encode(row.try_get::<Vec<u8>, _>(idx)?)),
            "TIMESTAMPTZ" => Value::from(
                row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?
                    .to_rfc3339(),
            ),
            other => return Err(DbError::decode(name, other)),
        };
        decoded.push(name, value);
    }

    Ok(decoded)
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        let rows = bind_params(sql, params).fetch_all(&self.pool).await?;
        debug!(count = rows.len(), "Fetched rows");
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let result = if params.is_empty() {
            sqlx::raw_sql(sql).execute(&self.pool).await?
        } else {
            bind_params(sql, params).execute(&self.pool).await?
        };
        Ok(result.rows_affected())
    }

    async fn execute_batch(&self, statements: &[String]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(statement)).await?;
        }
        tx.commit().await?;

        debug!(statements = statements.len(), "Executed statement batch");
        Ok(())
    }
}
