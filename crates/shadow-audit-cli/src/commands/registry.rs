//! `shadow-audit registry` command implementation
//!
//! Lists audit structures recorded in the registry. With `--orphaned`, only
//! those created under a key other than the current one.

use crate::context::Context;
use crate::error::Result;
use crate::output::registry_table;

pub async fn run(ctx: &Context, orphaned: bool) -> Result<()> {
    let registry = ctx.manager.registry();
    let entries = if orphaned {
        let key = ctx.manager.keys().current_key().await?;
        registry.orphaned(&key.fingerprint()).await?
    } else {
        registry.list().await?
    };

    if entries.is_empty() {
        if orphaned {
            println!("No orphaned audit structures.");
        } else {
            println!("No audit structures recorded.");
        }
        return Ok(());
    }

    println!("{}", registry_table(&entries));
    Ok(())
}
