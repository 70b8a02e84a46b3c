//! Encryption key provisioning
//!
//! The key lives in a secret table inside the audited database. Components
//! never read it themselves: they ask an injected [`KeyProvider`], whose
//! [`KeyCachePolicy`] decides how often the table is consulted.

use async_trait::async_trait;
use base64::Engine;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cipher::EncryptionKey;
use crate::db::{DbError, SqlExecutor, SqlParam};
use crate::error::{AuditError, AuditResult};
use crate::sql::QualifiedName;

/// Whether a loaded key may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCachePolicy {
    /// Read the secret table on every call.
    Disabled,
    /// Reuse a loaded key until it is older than the given age.
    Ttl(Duration),
}

/// Source of the current encryption key
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// The key to use now. Fails closed when no key is available.
    async fn current_key(&self) -> AuditResult<EncryptionKey>;

    /// Discard anything cached and load the key again.
    async fn refresh(&self) -> AuditResult<EncryptionKey>;
}

/// A fixed key, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: Option<EncryptionKey>,
}

impl StaticKeyProvider {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key: Some(key) }
    }

    /// A provider that never has a key.
    pub fn missing() -> Self {
        Self { key: None }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn current_key(&self) -> AuditResult<EncryptionKey> {
        self.key
            .clone()
            .ok_or_else(|| AuditError::encryption("no encryption key configured"))
    }

    async fn refresh(&self) -> AuditResult<EncryptionKey> {
        self.current_key().await
    }
}

/// Reads the newest row of the secret table.
pub struct DbKeyProvider {
    executor: Arc<dyn SqlExecutor>,
    secret_table: QualifiedName,
    policy: KeyCachePolicy,
    cache: Mutex<Option<(EncryptionKey, Instant)>>,
}

impl DbKeyProvider {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        secret_table: QualifiedName,
        policy: KeyCachePolicy,
    ) -> Self {
        Self {
            executor,
            secret_table,
            policy,
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<EncryptionKey> {
        let KeyCachePolicy::Ttl(ttl) = self.policy else {
            return None;
        };
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_ref()
            .filter(|(_, loaded_at)| loaded_at.elapsed() < ttl)
            .map(|(key, _)| key.clone())
    }

    fn store(&self, key: &EncryptionKey) {
        if matches!(self.policy, KeyCachePolicy::Ttl(_)) {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            *cache = Some((key.clone(), Instant::now()));
        }
    }

    async fn load(&self) -> AuditResult<EncryptionKey> {
        let sql = format!(
            "SELECT secret FROM {} ORDER BY id DESC LIMIT 1",
            self.secret_table
        );
        let rows = self.executor.fetch(&sql, &[]).await.map_err(|e| match e {
            DbError::Connection(_) => AuditError::from(e),
            other => AuditError::encryption(format!(
                "failed to read encryption key from {}: {}",
                self.secret_table, other
            )),
        })?;

        let secret = rows
            .first()
            .and_then(|row| row.get_str("secret"))
            .ok_or_else(|| {
                AuditError::encryption(format!(
                    "no encryption key found in {}; run `shadow-audit key init`",
                    self.secret_table
                ))
            })?;

        let key = EncryptionKey::new(secret)?;
        debug!(fingerprint = %key.fingerprint(), "Loaded encryption key");
        Ok(key)
    }
}

#[async_trait]
impl KeyProvider for DbKeyProvider {
    async fn current_key(&self) -> AuditResult<EncryptionKey> {
        if let Some(key) = self.cached() {
            return Ok(key);
        }
        let key = self.load().await?;
        self.store(&key);
        Ok(key)
    }

    async fn refresh(&self) -> AuditResult<EncryptionKey> {
        let key = self.load().await?;
        self.store(&key);
        Ok(key)
    }
}

/// A fresh random secret: two v4 UUIDs (244 random bits), base64-encoded.
pub fn generate_key() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Number of keys ever stored in the secret table.
pub async fn key_count(executor: &dyn SqlExecutor, secret_table: &QualifiedName) -> AuditResult<i64> {
    let rows = executor
        .fetch(&format!("SELECT count(*)::int8 AS n FROM {}", secret_table), &[])
        .await?;
    Ok(rows.first().and_then(|r| r.get_i64("n")).unwrap_or(0))
}

/// Store `key` as the newest secret. Existing audit structures keep the names
/// derived from the previous key.
pub async fn install_key(
    executor: &dyn SqlExecutor,
    secret_table: &QualifiedName,
    key: &EncryptionKey,
) -> AuditResult<()> {
    executor
        .execute(
            &format!("INSERT INTO {} (secret) VALUES ($1)", secret_table),
            &[SqlParam::from(key.expose())],
        )
        .await?;

    info!(fingerprint = %key.fingerprint(), table = %secret_table, "Installed encryption key");
    Ok(())
}
