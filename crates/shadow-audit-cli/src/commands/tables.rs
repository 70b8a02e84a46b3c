//! `shadow-audit tables` command implementation
//!
//! Lists tables that can be audited. Shadow tables and control tables are
//! left out.

use crate::context::Context;
use crate::error::Result;
use colored::Colorize;

pub async fn run(ctx: &Context, schema: Option<&str>) -> Result<()> {
    let schema = ctx.schema(schema);
    let tables = ctx.manager.list_tables(schema).await?;

    if tables.is_empty() {
        println!("No tables found in schema '{}'.", schema);
        return Ok(());
    }

    println!("{}", format!("Tables in {}:", schema).cyan().bold());
    for table in &tables {
        println!("  {}", table.table);
    }

    Ok(())
}
