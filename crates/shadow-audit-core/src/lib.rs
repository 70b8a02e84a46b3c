//! Shadow Audit Core Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Encrypted change tracking for PostgreSQL tables. For each audited table the
//! library creates a shadow table, a trigger function and three row-level
//! triggers. Every INSERT, UPDATE and DELETE is appended to the shadow table
//! together with the acting user, a timestamp and the operation, with each
//! cell encrypted by `pgcrypto` and every identifier encrypted by
//! [`cipher::NameCipher`].
//!
//! # Components
//!
//! - [`cipher`]: deterministic, reversible identifier encryption
//! - [`schema`]: catalog introspection behind the [`schema::Catalog`] trait
//! - [`builder`]: pure DDL synthesis for shadow tables, functions and triggers
//! - [`lifecycle`]: create, remove, status and bulk operations
//! - [`reader`]: decrypted read-back with filtering, sorting and masking
//!
//! Supporting modules: [`keys`] (key provider and caching), [`registry`]
//! (which structures exist under which key), [`db`] (statement execution),
//! [`sql`] (identifier quoting) and [`config`].
//!
//! # Example
//!
//! ```no_run
//! use shadow_audit_core::{config::Config, db, AuditLifecycleManager, ReadOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let pool = db::create_pool(&config.database).await?;
//! let manager = AuditLifecycleManager::from_pool(pool, &config.audit)?;
//!
//! manager.bootstrap().await?;
//! let orders = manager.parse_table("orders")?;
//! manager.create(&orders).await?;
//!
//! let rows = manager.reader().read_rows(&orders, &ReadOptions::default()).await?;
//! println!("{} audit rows", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cipher;
pub mod config;
pub mod db;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod sensitive;
pub mod sql;

pub use builder::{AuditNames, AuditStructure, AuditStructureBuilder};
pub use cipher::{decrypt_name, encrypt_name, CipherError, EncryptionKey, NameCipher};
pub use error::{AuditError, AuditResult};
pub use keys::{DbKeyProvider, KeyCachePolicy, KeyProvider, StaticKeyProvider};
pub use lifecycle::{
    AuditLifecycleManager, AuditState, AuditStatus, BulkFailure, BulkOutcome, ControlObjects,
    RemoveOptions,
};
pub use reader::{
    AuditColumn, AuditFilter, AuditReader, AuditRows, CellValue, ColumnRole, ReadOptions,
    SortDirection, SortState,
};
pub use registry::{RegistryEntry, ShadowRegistry};
pub use schema::{Catalog, ColumnDescriptor, PgCatalog};
