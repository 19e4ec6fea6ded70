//! Read-through cache in front of the ledger database.
//!
//! The cache is never the system of record. Every caller must stay correct
//! when it always misses, so [`CacheLayer`] logs and swallows backend
//! failures and reports them as misses.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

pub use memory::MemoryCache;

/// Cache failures. Never surfaced past [`CacheLayer`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache capability with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// A cache that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Cache key of an account projection.
pub fn account_key(user_id: &str) -> String {
    user_id.to_string()
}

/// Cache key of an owner's certificate list.
pub fn certificates_key(user_id: &str) -> String {
    format!("{user_id}-certs")
}

/// Typed JSON access to a [`Cache`] that degrades every failure to a miss.
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<dyn Cache>,
    ttl: Duration,
}

impl CacheLayer {
    pub fn new(inner: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { inner, ttl }
    }

    /// A layer over [`NoopCache`].
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCache), Duration::ZERO)
    }

    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.inner.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to store");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    pub async fn write<T: Serialize + Sync>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                let e = CacheError::Serialization(e.to_string());
                warn!(key, error = %e, "Skipping cache write");
                return;
            }
        };

        if let Err(e) = self.inner.set(key, raw, self.ttl).await {
            warn!(key, error = %e, "Cache write failed, dropping entry");
            self.invalidate(key).await;
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.inner.delete(key).await {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }
}
