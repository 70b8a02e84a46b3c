//! `shadow-audit read` command implementation
//!
//! Prints the decrypted history of one table, newest first unless a sort
//! column is given. Sensitive columns are masked unless `--show-sensitive`.

use crate::context::Context;
use crate::error::{CliError, Result};
use crate::output::{rows_json, rows_table};
use crate::OutputFormat;
use colored::Colorize;
use shadow_audit_common::ActionKind;
use shadow_audit_core::{AuditFilter, ReadOptions, SortDirection, SortState};

/// Arguments of `shadow-audit read`
#[derive(Debug, Clone, Default)]
pub struct ReadArgs {
    pub table: String,
    pub limit: Option<i64>,
    pub user: Option<String>,
    pub action: Option<ActionKind>,
    pub sort: Option<String>,
    pub desc: bool,
    pub show_sensitive: bool,
}

impl ReadArgs {
    pub fn options(&self) -> ReadOptions {
        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        ReadOptions {
            limit: self.limit,
            filter: AuditFilter {
                actor: self.user.clone(),
                action: self.action,
            },
            sort: SortState {
                column: self.sort.clone(),
                direction,
            },
            decrypt_sensitive: self.show_sensitive,
        }
    }
}

pub async fn run(ctx: &Context, args: &ReadArgs, format: OutputFormat) -> Result<()> {
    let table = ctx
        .manager
        .parse_table(&args.table)
        .map_err(|e| CliError::invalid_table(&args.table, e))?;
    let rows = ctx.manager.reader().read_rows(&table, &args.options()).await?;

    match format {
        OutputFormat::Json => println!("{}", rows_json(&rows)?),
        OutputFormat::Table => {
            if rows.columns.is_empty() {
                println!("{} has no audit history.", table);
                return Ok(());
            }
            println!("{}", rows_table(&rows));
            println!("{} rows", rows.len());
            if !args.show_sensitive && rows.columns.iter().any(|c| c.sensitive) {
                println!(
                    "{}",
                    "Sensitive columns are masked. Use --show-sensitive to reveal them.".dimmed()
                );
            }
        },
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_args() {
        let args = ReadArgs {
            table: "orders".into(),
            limit: Some(5),
            user: Some("alice".into()),
            action: Some(ActionKind::Update),
            sort: Some("total".into()),
            desc: true,
            show_sensitive: false,
        };
        let options = args.options();
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.filter.actor.as_deref(), Some("alice"));
        assert_eq!(options.filter.action, Some(ActionKind::Update));
        assert_eq!(options.sort, SortState::by("total", SortDirection::Descending));
        assert!(!options.decrypt_sensitive);
    }

    #[test]
    fn test_default_args_read_newest_first() {
        let options = ReadArgs::default().options();
        assert_eq!(options.sort.column, None);
        assert_eq!(options.limit, None);
    }
}
