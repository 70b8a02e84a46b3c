//! Shadow Audit Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging for the Shadow Audit workspace.
//!
//! - **Types**: `TableRef` and `ActionKind`, used by both the core library and the CLI
//! - **Errors**: parse and validation errors for those types
//! - **Logging**: `tracing` subscriber setup for binaries

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TypeError};
pub use types::{ActionKind, TableRef, DEFAULT_SCHEMA, MAX_IDENTIFIER_BYTES};
