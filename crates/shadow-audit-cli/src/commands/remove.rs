//! `shadow-audit remove` command implementation
//!
//! Drops triggers and trigger functions. Shadow tables and their history stay
//! unless `--drop-shadow` is given.

use crate::context::Context;
use crate::error::{CliError, Result};
use crate::output::outcome_summary;
use crate::progress::run_with_progress;
use colored::Colorize;
use shadow_audit_core::RemoveOptions;

pub async fn run(ctx: &Context, tables: &[String], drop_shadow: bool) -> Result<()> {
    let tables = ctx.parse_tables(tables)?;
    let options = RemoveOptions { drop_shadow };

    if drop_shadow {
        println!(
            "{}",
            "Shadow tables will be dropped with all recorded history.".yellow()
        );
    }

    let manager = ctx.manager.clone();
    let total = tables.len();
    let outcome = run_with_progress("Removing audits", total, move |progress| async move {
        manager
            .bulk_remove(&tables, options, |done, total, table| {
                progress.send(done, total, table)
            })
            .await
    })
    .await?;

    println!("{}", outcome_summary("Removed audits for", &outcome));

    if outcome.is_success() {
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            failed: outcome.failed.len(),
            total: outcome.total,
        })
    }
}
