//! Shadow Audit CLI - Main entry point

use clap::Parser;
use shadow_audit_cli::commands::read::ReadArgs;
use shadow_audit_cli::{commands, Cli, Commands, Context, KeyCommand};
use shadow_audit_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    // Verbose: debug to the console. Otherwise warnings only, so stdout stays clean.
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("shadow-audit")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli, command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli, command: &Commands) -> shadow_audit_cli::Result<()> {
    let ctx = Context::connect(cli.database_url.as_deref()).await?;

    match command {
        Commands::Setup => commands::setup::run(&ctx).await,

        Commands::Key { command } => match command {
            KeyCommand::Init { rotate } => commands::key::init(&ctx, *rotate).await,
            KeyCommand::ShowFingerprint => commands::key::show_fingerprint(&ctx).await,
        },

        Commands::Tables { schema } => commands::tables::run(&ctx, schema.as_deref()).await,

        Commands::Status { tables, schema } => {
            commands::status::run(&ctx, tables, schema.as_deref()).await
        },

        Commands::Create {
            tables,
            all,
            schema,
        } => commands::create::run(&ctx, tables, *all, schema.as_deref()).await,

        Commands::Remove {
            tables,
            drop_shadow,
        } => commands::remove::run(&ctx, tables, *drop_shadow).await,

        Commands::Read {
            table,
            limit,
            user,
            action,
            sort,
            desc,
            show_sensitive,
            format,
        } => {
            let args = ReadArgs {
                table: table.clone(),
                limit: *limit,
                user: user.clone(),
                action: *action,
                sort: sort.clone(),
                desc: *desc,
                show_sensitive: *show_sensitive,
            };
            commands::read::run(&ctx, &args, *format).await
        },

        Commands::Registry { orphaned } => commands::registry::run(&ctx, *orphaned).await,
    }
}
