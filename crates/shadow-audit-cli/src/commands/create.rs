//! `shadow-audit create` command implementation
//!
//! Audits tables one at a time on a background task. A table that fails is
//! reported and the rest still run.

use crate::context::Context;
use crate::error::{CliError, Result};
use crate::output::outcome_summary;
use crate::progress::run_with_progress;

pub async fn run(ctx: &Context, tables: &[String], all: bool, schema: Option<&str>) -> Result<()> {
    let tables = if all {
        ctx.manager.list_tables(ctx.schema(schema)).await?
    } else {
        ctx.parse_tables(tables)?
    };

    if tables.is_empty() {
        println!("No tables to audit.");
        return Ok(());
    }

    // fail before spawning anything when there is no key
    ctx.manager.keys().current_key().await?;

    let manager = ctx.manager.clone();
    let total = tables.len();
    let outcome = run_with_progress("Creating audits", total, move |progress| async move {
        manager
            .bulk_create(&tables, |done, total, table| progress.send(done, total, table))
            .await
    })
    .await?;

    println!("{}", outcome_summary("Created audits for", &outcome));

    if outcome.is_success() {
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            failed: outcome.failed.len(),
            total: outcome.total,
        })
    }
}
