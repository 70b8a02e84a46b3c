//! Audit structure synthesis
//!
//! Everything in this module is pure text generation: given a table, its
//! columns and a [`NameCipher`], it derives the encrypted names of the shadow
//! table, trigger function and triggers, and renders the statements that
//! create or drop them. Nothing here touches the database, so every statement
//! can be checked against fixed inputs.
//!
//! # Naming
//!
//! Each object name is the encryption of a role prefix plus the plaintext
//! table name, so it can be recomputed at any time from the table name and
//! the key alone:
//!
//! | Object | Plaintext |
//! |--------|-----------|
//! | shadow table | `aud_<table>` |
//! | trigger function | `fn_<table>` |
//! | insert / update / delete triggers | `ti_<table>`, `tu_<table>`, `td_<table>` |
//!
//! Shadow columns are the encrypted source column names followed by three
//! audit columns whose plaintexts (`$actor`, `$action_at`, `$action`) cannot
//! clash with an ordinary column name.

use shadow_audit_common::{ActionKind, TableRef};

use crate::cipher::{NameCipher, MAX_NAME_PLAINTEXT_BYTES};
use crate::error::{AuditError, AuditResult};
use crate::schema::ColumnDescriptor;
use crate::sql::{quote_ident, Ident, QualifiedName};

pub const SHADOW_TABLE_PREFIX: &str = "aud_";
pub const FUNCTION_PREFIX: &str = "fn_";

/// Plaintext of the column recording `SESSION_USER`
pub const ACTOR_COLUMN: &str = "$actor";
/// Plaintext of the column recording the statement's wall-clock time
pub const ACTION_AT_COLUMN: &str = "$action_at";
/// Plaintext of the column recording `TG_OP`
pub const ACTION_COLUMN: &str = "$action";

pub const RESERVED_COLUMNS: [&str; 3] = [ACTOR_COLUMN, ACTION_AT_COLUMN, ACTION_COLUMN];

/// Name of the helper that decrypts a cell or yields [`UNDECRYPTABLE_MARKER`].
pub const TRY_DECRYPT_FUNCTION: &str = "shadow_audit_try_decrypt";

pub const UNDECRYPTABLE_MARKER: &str = "<undecryptable>";

/// When a trigger fires relative to the row change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
}

impl TriggerTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
        }
    }
}

/// One of the three row-level triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub action: ActionKind,
    pub timing: TriggerTiming,
    pub name: Ident,
}

impl TriggerSpec {
    fn prefix(action: ActionKind) -> &'static str {
        match action {
            ActionKind::Insert => "ti_",
            ActionKind::Update => "tu_",
            ActionKind::Delete => "td_",
        }
    }

    /// Deletes fire before the row disappears so `OLD` is still the live image.
    fn timing(action: ActionKind) -> TriggerTiming {
        match action {
            ActionKind::Delete => TriggerTiming::Before,
            ActionKind::Insert | ActionKind::Update => TriggerTiming::After,
        }
    }
}

/// Encrypted names of every object belonging to one audited table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditNames {
    pub table: TableRef,
    pub source: QualifiedName,
    pub shadow_table: QualifiedName,
    pub function: QualifiedName,
    pub triggers: Vec<TriggerSpec>,
}

impl AuditNames {
    pub fn derive(table: &TableRef, cipher: &NameCipher) -> AuditResult<Self> {
        let source = QualifiedName::of_table(table)?;
        let shadow_table = source.sibling(encrypt_part(cipher, SHADOW_TABLE_PREFIX, &table.table)?)?;
        let function = source.sibling(encrypt_part(cipher, FUNCTION_PREFIX, &table.table)?)?;

        let triggers = ActionKind::ALL
            .iter()
            .map(|&action| -> AuditResult<TriggerSpec> {
                let name = encrypt_part(cipher, TriggerSpec::prefix(action), &table.table)?;
                Ok(TriggerSpec {
                    action,
                    timing: TriggerSpec::timing(action),
                    name: Ident::new(name)?,
                })
            })
            .collect::<AuditResult<Vec<_>>>()?;

        Ok(Self {
            table: table.clone(),
            source,
            shadow_table,
            function,
            triggers,
        })
    }

    /// The shadow table as a [`TableRef`], for catalog lookups.
    pub fn shadow_ref(&self) -> AuditResult<TableRef> {
        Ok(TableRef::new(
            self.shadow_table.schema.as_str(),
            self.shadow_table.name.as_str(),
        )?)
    }

    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers
            .iter()
            .map(|t| t.name.as_str().to_string())
            .collect()
    }

    pub fn drop_shadow_table_ddl(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.shadow_table)
    }

    pub fn drop_function_ddl(&self) -> String {
        format!("DROP FUNCTION IF EXISTS {}() CASCADE", self.function)
    }

    pub fn create_triggers_ddl(&self) -> Vec<String> {
        self.triggers
            .iter()
            .map(|t| {
                format!(
                    "CREATE TRIGGER {}\n    {} {} ON {}\n    FOR EACH ROW EXECUTE FUNCTION {}()",
                    t.name,
                    t.timing.as_str(),
                    t.action.as_str(),
                    self.source,
                    self.function
                )
            })
            .collect()
    }

    /// One `DROP TRIGGER IF EXISTS` per trigger, in insert/update/delete order.
    pub fn drop_triggers_ddl(&self) -> Vec<String> {
        self.triggers
            .iter()
            .map(|t| format!("DROP TRIGGER IF EXISTS {} ON {}", t.name, self.source))
            .collect()
    }
}

/// A source column paired with its encrypted shadow column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub original: String,
    pub encrypted: Ident,
}

/// The complete, consistent set of names and columns for one audited table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStructure {
    pub names: AuditNames,
    /// Source columns in ordinal order.
    pub columns: Vec<ColumnMapping>,
    pub actor_column: Ident,
    pub action_at_column: Ident,
    pub action_column: Ident,
}

impl AuditStructure {
    /// Derive every name for `table`. An empty column list means the table does not exist.
    pub fn build(
        table: &TableRef,
        columns: &[ColumnDescriptor],
        cipher: &NameCipher,
    ) -> AuditResult<Self> {
        if columns.is_empty() {
            return Err(AuditError::TableNotFound(table.clone()));
        }

        let mut ordered: Vec<&ColumnDescriptor> = columns.iter().collect();
        ordered.sort_by_key(|c| c.ordinal_position);

        let columns = ordered
            .into_iter()
            .map(|column| -> AuditResult<ColumnMapping> {
                if RESERVED_COLUMNS.contains(&column.name.as_str()) {
                    return Err(AuditError::Identifier(format!(
                        "column '{}' of {} uses a name reserved for audit columns",
                        column.name, table
                    )));
                }
                Ok(ColumnMapping {
                    original: column.name.clone(),
                    encrypted: Ident::new(encrypt_part(cipher, "", &column.name)?)?,
                })
            })
            .collect::<AuditResult<Vec<_>>>()?;

        Ok(Self {
            names: AuditNames::derive(table, cipher)?,
            columns,
            actor_column: Ident::new(encrypt_part(cipher, "", ACTOR_COLUMN)?)?,
            action_at_column: Ident::new(encrypt_part(cipher, "", ACTION_AT_COLUMN)?)?,
            action_column: Ident::new(encrypt_part(cipher, "", ACTION_COLUMN)?)?,
        })
    }

    /// All shadow columns in table order: data columns, then actor, timestamp, action.
    pub fn shadow_columns(&self) -> Vec<&Ident> {
        self.columns
            .iter()
            .map(|c| &c.encrypted)
            .chain([&self.actor_column, &self.action_at_column, &self.action_column])
            .collect()
    }

    /// `DROP TABLE IF EXISTS` followed by `CREATE TABLE`, every column `BYTEA`.
    ///
    /// Rebuilding discards any rows already recorded in the shadow table.
    pub fn shadow_table_ddl(&self) -> Vec<String> {
        let columns: Vec<String> = self
            .shadow_columns()
            .into_iter()
            .map(|c| format!("    {} BYTEA", c))
            .collect();

        vec![
            self.names.drop_shadow_table_ddl(),
            format!(
                "CREATE TABLE {} (\n{}\n)",
                self.names.shadow_table,
                columns.join(",\n")
            ),
        ]
    }

    /// The PL/pgSQL trigger function that encrypts the row image into the shadow table.
    ///
    /// The key is read from `secret_table` each time the function runs, not
    /// when it is created.
    pub fn trigger_function_ddl(&self, secret_table: &QualifiedName) -> String {
        let target_columns: Vec<String> = self
            .shadow_columns()
            .into_iter()
            .map(|c| c.to_string())
            .collect();

        let mut values: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                format!(
                    "pgp_sym_encrypt(v_row.{}::text, v_key)",
                    quote_ident(&c.original)
                )
            })
            .collect();
        values.push("pgp_sym_encrypt(SESSION_USER::text, v_key)".to_string());
        values.push("pgp_sym_encrypt(clock_timestamp()::text, v_key)".to_string());
        values.push("pgp_sym_encrypt(TG_OP::text, v_key)".to_string());

        let body = format!(
            r#"
DECLARE
    v_key TEXT;
    v_row RECORD;
BEGIN
    SELECT secret INTO v_key FROM {secret_table} ORDER BY id DESC LIMIT 1;
    IF v_key IS NULL THEN
        RAISE EXCEPTION 'shadow audit: no encryption key available';
    END IF;

    IF TG_OP = 'DELETE' THEN
        v_row := OLD;
    ELSE
        v_row := NEW;
    END IF;

    INSERT INTO {shadow} ({columns})
    VALUES (
        {values}
    );

    IF TG_OP = 'DELETE' THEN
        RETURN OLD;
    END IF;
    RETURN NEW;
END;
"#,
            secret_table = secret_table,
            shadow = self.names.shadow_table,
            columns = target_columns.join(", "),
            values = values.join(",\n        "),
        );

        let tag = dollar_tag(&body);
        format!(
            "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER\nLANGUAGE plpgsql\nAS {tag}{body}{tag}",
            self.names.function,
            tag = tag,
            body = body,
        )
    }

    /// The three `CREATE TRIGGER` statements, in insert/update/delete order.
    pub fn trigger_ddl(&self) -> Vec<String> {
        self.names.create_triggers_ddl()
    }
}

/// Builds audit DDL for tables under one key.
///
/// Thin entry points over [`AuditStructure`] for callers that only need one
/// kind of statement.
#[derive(Clone)]
pub struct AuditStructureBuilder {
    cipher: NameCipher,
    secret_table: QualifiedName,
}

impl AuditStructureBuilder {
    pub fn new(cipher: NameCipher, secret_table: QualifiedName) -> Self {
        Self {
            cipher,
            secret_table,
        }
    }

    pub fn names(&self, table: &TableRef) -> AuditResult<AuditNames> {
        AuditNames::derive(table, &self.cipher)
    }

    pub fn structure(
        &self,
        table: &TableRef,
        columns: &[ColumnDescriptor],
    ) -> AuditResult<AuditStructure> {
        AuditStructure::build(table, columns, &self.cipher)
    }

    pub fn shadow_table_ddl(
        &self,
        table: &TableRef,
        columns: &[ColumnDescriptor],
    ) -> AuditResult<Vec<String>> {
        Ok(self.structure(table, columns)?.shadow_table_ddl())
    }

    pub fn trigger_function_ddl(
        &self,
        table: &TableRef,
        columns: &[ColumnDescriptor],
    ) -> AuditResult<String> {
        Ok(self
            .structure(table, columns)?
            .trigger_function_ddl(&self.secret_table))
    }

    /// `DROP TRIGGER IF EXISTS` for each trigger, then the three `CREATE TRIGGER`s.
    pub fn trigger_ddl(&self, table: &TableRef) -> AuditResult<Vec<String>> {
        let names = self.names(table)?;
        let mut statements = names.drop_triggers_ddl();
        statements.extend(names.create_triggers_ddl());
        Ok(statements)
    }

    pub fn secret_table(&self) -> &QualifiedName {
        &self.secret_table
    }

    pub fn cipher(&self) -> &NameCipher {
        &self.cipher
    }
}

/// Encrypt `prefix + name`, refusing plaintexts whose ciphertext would not fit an identifier.
fn encrypt_part(cipher: &NameCipher, prefix: &str, name: &str) -> AuditResult<String> {
    let plaintext = format!("{}{}", prefix, name);
    if plaintext.len() > MAX_NAME_PLAINTEXT_BYTES {
        return Err(AuditError::Identifier(format!(
            "'{}' is too long to encrypt into an identifier ({} bytes, at most {}); \
             table names and column names are limited to {} bytes including any role prefix",
            plaintext,
            plaintext.len(),
            MAX_NAME_PLAINTEXT_BYTES,
            MAX_NAME_PLAINTEXT_BYTES
        )));
    }
    Ok(cipher.encrypt_name(&plaintext)?)
}

/// A dollar-quote tag that does not occur in `body`.
fn dollar_tag(body: &str) -> String {
    let mut tag = "$shadow_audit$".to_string();
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$shadow_audit_{}$", n);
    }
    tag
}
