//! `shadow-audit key` command implementation

use crate::context::Context;
use crate::error::{CliError, Result};
use colored::Colorize;
use shadow_audit_core::keys::{generate_key, install_key, key_count};
use shadow_audit_core::EncryptionKey;
use tracing::warn;

/// Generate and store a key, refusing to replace an existing one unless `rotate`
pub async fn init(ctx: &Context, rotate: bool) -> Result<()> {
    let manager = &ctx.manager;
    let secret_table = &manager.control().secret_table;
    let existing = key_count(manager.executor().as_ref(), secret_table).await?;

    if existing > 0 && !rotate {
        let current = manager.keys().current_key().await?;
        return Err(CliError::KeyExists(current.fingerprint()));
    }

    let key = EncryptionKey::new(generate_key())?;
    install_key(manager.executor().as_ref(), secret_table, &key).await?;

    println!("{} Stored encryption key {}", "✓".green(), key.fingerprint().bold());

    if existing > 0 {
        warn!(fingerprint = %key.fingerprint(), "Encryption key rotated");
        println!();
        println!(
            "{}",
            "Audits created under the previous key can no longer be located by name."
                .yellow()
        );
        println!(
            "Run '{}' to list them.",
            "shadow-audit registry --orphaned".cyan()
        );
    }

    Ok(())
}

/// Print the fingerprint of the newest key
pub async fn show_fingerprint(ctx: &Context) -> Result<()> {
    let key = ctx.manager.keys().current_key().await?;
    println!("{}", key.fingerprint());
    Ok(())
}
