//! `shadow-audit status` command implementation

use crate::context::Context;
use crate::error::Result;
use crate::output::status_table;

/// Show the audit state of `tables`, or of every table in the schema when none are given
pub async fn run(ctx: &Context, tables: &[String], schema: Option<&str>) -> Result<()> {
    let tables = if tables.is_empty() {
        ctx.manager.list_tables(ctx.schema(schema)).await?
    } else {
        ctx.parse_tables(tables)?
    };

    if tables.is_empty() {
        println!("No tables to report on.");
        return Ok(());
    }

    let statuses = ctx.manager.status_many(&tables).await;
    println!("{}", status_table(&statuses));
    Ok(())
}
