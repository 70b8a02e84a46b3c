//! Read-back of shadow tables
//!
//! The reader recomputes a table's shadow name from the current key, asks the
//! catalog for its encrypted columns and selects every cell through the
//! `shadow_audit_try_decrypt` helper, so a cell that fails to decrypt comes
//! back as a marker instead of failing the query. Column labels are decrypted
//! locally; a label that does not decrypt is shown as its raw identifier.

use serde::{Serialize, Serializer};
use shadow_audit_common::{ActionKind, TableRef};
use std::sync::Arc;
use tracing::debug;

use crate::builder::{
    AuditNames, ACTION_AT_COLUMN, ACTION_COLUMN, ACTOR_COLUMN, UNDECRYPTABLE_MARKER,
};
use crate::cipher::NameCipher;
use crate::config::{DEFAULT_READ_LIMIT, MAX_READ_LIMIT};
use crate::db::{SqlExecutor, SqlParam};
use crate::error::{AuditError, AuditResult};
use crate::keys::KeyProvider;
use crate::schema::Catalog;
use crate::sensitive::{SensitiveColumns, MASK};
use crate::sql::{quote_ident, QualifiedName};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Which column rows are ordered by.
///
/// With no column, rows come newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    pub column: Option<String>,
    pub direction: SortDirection,
}

impl SortState {
    pub fn by(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: Some(column.into()),
            direction,
        }
    }

    /// Selecting the current column again flips the direction; a new column starts ascending.
    pub fn toggle(&mut self, column: &str) {
        if self.column.as_deref() == Some(column) {
            self.direction = self.direction.toggled();
        } else {
            self.column = Some(column.to_string());
            self.direction = SortDirection::Ascending;
        }
    }
}

/// Row filters, both applied to decrypted values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Case-insensitive substring of the acting user.
    pub actor: Option<String>,
    pub action: Option<ActionKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Defaults to the reader's limit; always capped at [`MAX_READ_LIMIT`].
    pub limit: Option<i64>,
    pub filter: AuditFilter,
    pub sort: SortState,
    /// Show sensitive columns instead of masking them.
    pub decrypt_sensitive: bool,
}

/// What a shadow column records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Data,
    Actor,
    ActionAt,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditColumn {
    /// Decrypted name, or the raw identifier when it does not decrypt.
    ///
    /// Audit columns are labelled `$actor`, `$action_at` and `$action`.
    pub label: String,
    pub identifier: String,
    pub role: ColumnRole,
    pub sensitive: bool,
}

/// One decrypted cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Null,
    Text(String),
    Undecryptable,
    Masked,
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Undecryptable => f.write_str(UNDECRYPTABLE_MARKER),
            CellValue::Masked => f.write_str(MASK),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

/// Decrypted contents of one shadow table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRows {
    pub table: TableRef,
    pub columns: Vec<AuditColumn>,
    pub rows: Vec<Vec<CellValue>>,
}

impl AuditRows {
    fn empty(table: &TableRef) -> Self {
        Self {
            table: table.clone(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label.as_str()).collect()
    }
}

/// Reads and decrypts shadow tables
#[derive(Clone)]
pub struct AuditReader {
    executor: Arc<dyn SqlExecutor>,
    catalog: Arc<dyn Catalog>,
    keys: Arc<dyn KeyProvider>,
    try_decrypt: QualifiedName,
    sensitive: SensitiveColumns,
    default_limit: i64,
}

impl AuditReader {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        catalog: Arc<dyn Catalog>,
        keys: Arc<dyn KeyProvider>,
        try_decrypt: QualifiedName,
    ) -> Self {
        Self {
            executor,
            catalog,
            keys,
            try_decrypt,
            sensitive: SensitiveColumns::default(),
            default_limit: DEFAULT_READ_LIMIT,
        }
    }

    pub fn with_sensitive_columns(mut self, sensitive: SensitiveColumns) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn with_default_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Read the newest audit rows of `table`. A table never audited yields no rows.
    pub async fn read_rows(&self, table: &TableRef, options: &ReadOptions) -> AuditResult<AuditRows> {
        let key = self.keys.current_key().await?;
        let cipher = NameCipher::new(&key);
        let names = AuditNames::derive(table, &cipher)?;
        let shadow = names.shadow_ref()?;

        if !self.catalog.table_exists(&shadow).await {
            debug!(table = %table, "No shadow table, nothing to read");
            return Ok(AuditRows::empty(table));
        }

        let descriptors = self.catalog.columns(&shadow).await?;
        if descriptors.is_empty() {
            return Ok(AuditRows::empty(table));
        }

        let columns: Vec<AuditColumn> = descriptors
            .iter()
            .map(|d| self.label(&cipher, &d.name))
            .collect();

        let (sql, params) = self.select_sql(&names, &columns, key.expose(), options)?;
        let fetched = self.executor.fetch(&sql, &params).await?;

        let rows = fetched
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let value = row.get(&format!("c{}", i)).unwrap_or(&serde_json::Value::Null);
                        cell(value, column.sensitive && !options.decrypt_sensitive)
                    })
                    .collect()
            })
            .collect();

        debug!(table = %table, count = fetched.len(), "Read audit rows");
        Ok(AuditRows {
            table: table.clone(),
            columns,
            rows,
        })
    }

    fn label(&self, cipher: &NameCipher, identifier: &str) -> AuditColumn {
        let (label, role) = match cipher.decrypt_name(identifier) {
            Ok(plain) => {
                // audit labels keep their reserved plaintext so they never collide with a data column
                let role = match plain.as_str() {
                    ACTOR_COLUMN => ColumnRole::Actor,
                    ACTION_AT_COLUMN => ColumnRole::ActionAt,
                    ACTION_COLUMN => ColumnRole::Action,
                    _ => ColumnRole::Data,
                };
                (plain, role)
            },
            Err(e) => {
                debug!(identifier, error = %e, "Column label did not decrypt");
                (identifier.to_string(), ColumnRole::Data)
            },
        };

        let sensitive = role == ColumnRole::Data && self.sensitive.is_sensitive(&label);
        AuditColumn {
            label,
            identifier: identifier.to_string(),
            role,
            sensitive,
        }
    }

    fn select_sql(
        &self,
        names: &AuditNames,
        columns: &[AuditColumn],
        key: &str,
        options: &ReadOptions,
    ) -> AuditResult<(String, Vec<SqlParam>)> {
        let decrypt = |column: &AuditColumn| {
            format!("{}({}, $1)", self.try_decrypt, quote_ident(&column.identifier))
        };
        let timestamp = |column: &AuditColumn| {
            format!(
                "NULLIF({}, '{}')::timestamptz",
                decrypt(column),
                UNDECRYPTABLE_MARKER
            )
        };
        let by_role = |role: ColumnRole| columns.iter().find(|c| c.role == role);

        let projection: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} AS c{}", decrypt(c), i))
            .collect();

        let mut params = vec![SqlParam::from(key)];
        let mut conditions = Vec::new();

        if let Some(actor) = &options.filter.actor {
            match by_role(ColumnRole::Actor) {
                Some(column) => {
                    params.push(SqlParam::from(escape_like(actor)));
                    conditions.push(format!(
                        "{} ILIKE '%' || ${} || '%'",
                        decrypt(column),
                        params.len()
                    ));
                },
                None => conditions.push("FALSE".to_string()),
            }
        }

        if let Some(action) = options.filter.action {
            match by_role(ColumnRole::Action) {
                Some(column) => {
                    params.push(SqlParam::from(action.as_str()));
                    conditions.push(format!("{} = ${}", decrypt(column), params.len()));
                },
                None => conditions.push("FALSE".to_string()),
            }
        }

        let order = match &options.sort.column {
            Some(label) => {
                // exact label first, then an audit role by bare name, then case-insensitive
                let (i, column) = columns
                    .iter()
                    .enumerate()
                    .find(|(_, c)| c.label == *label)
                    .or_else(|| {
                        let role = audit_role_by_name(label)?;
                        columns.iter().enumerate().find(|(_, c)| c.role == role)
                    })
                    .or_else(|| {
                        columns
                            .iter()
                            .enumerate()
                            .find(|(_, c)| c.label.eq_ignore_ascii_case(label))
                    })
                    .ok_or_else(|| {
                        AuditError::Identifier(format!(
                            "cannot sort by '{}': no such column in the audit of {}",
                            label, names.table
                        ))
                    })?;
                let expr = if column.role == ColumnRole::ActionAt {
                    timestamp(column)
                } else {
                    format!("c{}", i)
                };
                Some(format!("{} {} NULLS LAST", expr, options.sort.direction.as_sql()))
            },
            None => by_role(ColumnRole::ActionAt).map(|c| format!("{} DESC NULLS LAST", timestamp(c))),
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            projection.join(", "),
            names.shadow_table
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if let Some(order) = order {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }

        let limit = options
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_READ_LIMIT);
        params.push(SqlParam::Int(limit));
        sql.push_str(&format!(" LIMIT ${}", params.len()));

        Ok((sql, params))
    }
}

fn cell(value: &serde_json::Value, mask: bool) -> CellValue {
    match value {
        serde_json::Value::Null => CellValue::Null,
        serde_json::Value::String(s) if s == UNDECRYPTABLE_MARKER => CellValue::Undecryptable,
        _ if mask => CellValue::Masked,
        serde_json::Value::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Audit role named without its `$` prefix, as in `--sort action_at`.
fn audit_role_by_name(name: &str) -> Option<ColumnRole> {
    let name = name.strip_prefix('$').unwrap_or(name);
    [
        (ACTOR_COLUMN, ColumnRole::Actor),
        (ACTION_AT_COLUMN, ColumnRole::ActionAt),
        (ACTION_COLUMN, ColumnRole::Action),
    ]
    .into_iter()
    .find(|(reserved, _)| reserved.trim_start_matches('$').eq_ignore_ascii_case(name))
    .map(|(_, role)| role)
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
