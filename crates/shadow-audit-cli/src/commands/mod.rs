//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function taking a
//! connected [`Context`](crate::Context).

pub mod create;
pub mod key;
pub mod read;
pub mod registry;
pub mod remove;
pub mod setup;
pub mod status;
pub mod tables;
