//! Identifier quoting for generated SQL
//!
//! Every identifier that ends up in statement text goes through [`Ident`],
//! which validates it once and always renders it double-quoted with embedded
//! quotes doubled. Values are never interpolated; they are bound as parameters.

use std::fmt;

use shadow_audit_common::{TableRef, TypeError, MAX_IDENTIFIER_BYTES};

/// A validated SQL identifier, rendered quoted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::EmptyPart("identifier"));
        }
        if name.contains('\0') {
            return Err(TypeError::InvalidCharacter("identifier"));
        }
        if name.len() > MAX_IDENTIFIER_BYTES {
            return Err(TypeError::TooLong {
                what: "identifier",
                max: MAX_IDENTIFIER_BYTES,
            });
        }
        Ok(Self(name))
    }

    /// Wrap a name known to be valid, such as a built-in constant.
    pub(crate) fn trusted(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The unquoted name, for catalog lookups bound as parameters.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

/// `"schema"."name"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: Ident,
    pub name: Ident,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        Ok(Self {
            schema: Ident::new(schema)?,
            name: Ident::new(name)?,
        })
    }

    pub fn of_table(table: &TableRef) -> Result<Self, TypeError> {
        Self::new(table.schema.as_str(), table.table.as_str())
    }

    /// A sibling object in the same schema.
    pub fn sibling(&self, name: impl Into<String>) -> Result<Self, TypeError> {
        Ok(Self {
            schema: self.schema.clone(),
            name: Ident::new(name)?,
        })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Double-quote an identifier, doubling any embedded quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
