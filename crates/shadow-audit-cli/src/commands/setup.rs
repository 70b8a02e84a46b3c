//! `shadow-audit setup` command implementation
//!
//! Installs pgcrypto and the control objects. Safe to run repeatedly.

use crate::context::Context;
use crate::error::Result;
use crate::progress::create_spinner;
use colored::Colorize;
use shadow_audit_core::keys::key_count;

pub async fn run(ctx: &Context) -> Result<()> {
    let spinner = create_spinner("Installing control objects...");
    let result = ctx.manager.bootstrap().await;
    spinner.finish_and_clear();
    result?;

    let control = ctx.manager.control();
    println!("{} Control objects ready", "✓".green());
    println!("  Key table:      {}", control.secret_table);
    println!("  Registry table: {}", control.registry_table);
    println!("  Decrypt helper: {}", control.try_decrypt);

    let keys = key_count(ctx.manager.executor().as_ref(), &control.secret_table).await?;
    if keys == 0 {
        println!();
        println!(
            "No encryption key yet. Run '{}' to create one.",
            "shadow-audit key init".cyan()
        );
    }

    Ok(())
}
