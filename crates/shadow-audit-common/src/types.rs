//! Common types shared by the core library and the CLI

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// PostgreSQL truncates identifiers longer than this many bytes (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Schema assumed for unqualified table references when no other default is configured.
pub const DEFAULT_SCHEMA: &str = "public";

/// A reference to a relational table, always schema-qualified once parsed.
///
/// # Examples
///
/// ```
/// use shadow_audit_common::types::TableRef;
///
/// let table = TableRef::parse("orders", "public").unwrap();
/// assert_eq!(table.to_string(), "public.orders");
///
/// let table = TableRef::parse("sales.invoices", "public").unwrap();
/// assert_eq!(table.schema, "sales");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// Build a reference from already-separated parts.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self, TypeError> {
        let schema = schema.into();
        let table = table.into();
        validate_part(&schema, "schema")?;
        validate_part(&table, "table")?;
        Ok(Self { schema, table })
    }

    /// Parse `schema.table` or `table`; the latter resolves against `default_schema`.
    pub fn parse(input: &str, default_schema: &str) -> Result<Self, TypeError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TypeError::EmptyTableRef);
        }

        match input.split_once('.') {
            Some((schema, table)) => {
                if table.contains('.') {
                    return Err(TypeError::InvalidTableRef(input.to_string()));
                }
                Self::new(schema.trim(), table.trim())
            },
            None => Self::new(default_schema, input),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn validate_part(part: &str, what: &'static str) -> Result<(), TypeError> {
    if part.is_empty() {
        return Err(TypeError::EmptyPart(what));
    }
    if part.contains('\0') {
        return Err(TypeError::InvalidCharacter(what));
    }
    if part.len() > MAX_IDENTIFIER_BYTES {
        return Err(TypeError::TooLong {
            what,
            max: MAX_IDENTIFIER_BYTES,
        });
    }
    Ok(())
}

/// The DML operation recorded in an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Insert,
    Update,
    Delete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [ActionKind::Insert, ActionKind::Update, ActionKind::Delete];

    /// The `TG_OP` spelling of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Insert => "INSERT",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INSERT" => Ok(ActionKind::Insert),
            "UPDATE" => Ok(ActionKind::Update),
            "DELETE" => Ok(ActionKind::Delete),
            _ => Err(TypeError::InvalidAction(s.to_string())),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
