//! Shadow Audit CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command-line interface for encrypted shadow-table auditing of PostgreSQL.
//!
//! # Overview
//!
//! - **Setup**: install pgcrypto and the control objects (`shadow-audit setup`)
//! - **Keys**: create or rotate the encryption key (`shadow-audit key init`)
//! - **Lifecycle**: audit tables and stop auditing them (`create`, `remove`)
//! - **Inspection**: list tables, show audit state, read decrypted history
//!   (`tables`, `status`, `read`, `registry`)
//!
//! Lifecycle batches run on a background task. Progress comes back over a
//! channel and only the main task writes to the terminal.

pub mod commands;
pub mod context;
pub mod error;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use context::Context;
pub use error::{CliError, Result};

use clap::{Parser, Subcommand, ValueEnum};
use shadow_audit_common::ActionKind;

/// Shadow Audit - encrypted change tracking for PostgreSQL tables
#[derive(Parser, Debug)]
#[command(name = "shadow-audit")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Print the full command reference as Markdown and exit
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install pgcrypto, the key table, the registry and the decrypt helper
    Setup,

    /// Manage the encryption key
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },

    /// List tables that can be audited
    Tables {
        /// Schema to list (defaults to SHADOW_DEFAULT_SCHEMA)
        #[arg(short, long)]
        schema: Option<String>,
    },

    /// Show the audit state of tables
    Status {
        /// Tables as `table` or `schema.table` (defaults to every listed table)
        tables: Vec<String>,

        /// Schema listed when no tables are given
        #[arg(short, long)]
        schema: Option<String>,
    },

    /// Start auditing tables
    Create {
        /// Tables as `table` or `schema.table`
        #[arg(required_unless_present = "all")]
        tables: Vec<String>,

        /// Audit every table of the schema
        #[arg(long, conflicts_with = "tables")]
        all: bool,

        /// Schema used with --all
        #[arg(short, long, requires = "all")]
        schema: Option<String>,
    },

    /// Stop auditing tables
    Remove {
        /// Tables as `table` or `schema.table`
        #[arg(required = true)]
        tables: Vec<String>,

        /// Also drop the shadow tables and every row recorded in them
        #[arg(long)]
        drop_shadow: bool,
    },

    /// Show the decrypted audit history of a table
    Read {
        /// Table as `table` or `schema.table`
        table: String,

        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<i64>,

        /// Only rows whose acting user contains this text (case-insensitive)
        #[arg(short, long)]
        user: Option<String>,

        /// Only rows of this action (INSERT, UPDATE or DELETE)
        #[arg(short, long)]
        action: Option<ActionKind>,

        /// Column to sort by (defaults to newest first); audit columns are actor, action_at and action
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,

        /// Show values of sensitive columns instead of masking them
        #[arg(long)]
        show_sensitive: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List recorded audit structures
    Registry {
        /// Only structures created under a previous key
        #[arg(long)]
        orphaned: bool,
    },
}

/// Key management subcommands
#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Generate and store an encryption key
    Init {
        /// Store a new key even if one exists. Audits created under the old key become orphaned.
        #[arg(long)]
        rotate: bool,
    },

    /// Print the fingerprint of the current key
    ShowFingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
