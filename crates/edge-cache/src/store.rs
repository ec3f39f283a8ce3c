//! Cache store abstraction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edge_core::BufferedResponse;

use crate::key::CacheKey;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Store lock was poisoned by a panicking writer.
    #[error("cache store lock poisoned")]
    Poisoned,
}

/// A stored response and its lifetime.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    /// The stored response, diagnostic headers included.
    pub response: BufferedResponse,
    /// Time-to-live.
    pub ttl: Duration,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Create an entry stored now.
    pub fn new(response: BufferedResponse, ttl: Duration) -> Self {
        Self {
            response,
            ttl,
            stored_at: Utc::now(),
        }
    }

    /// When the entry expires. `None` if the TTL is too large to represent.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        self.stored_at.checked_add_signed(ttl)
    }

    /// Check if the entry has expired at a given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| now >= exp).unwrap_or(false)
    }

    /// Check if the entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Key-value store for cached responses.
///
/// The edge platform owns lifetime and consistency; implementations only
/// need to stop returning an entry once its TTL has passed.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a live entry.
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>>;

    /// Store a response for `ttl`.
    async fn store(&self, key: &CacheKey, response: BufferedResponse, ttl: Duration) -> CacheResult<()>;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>> {
        (**self).lookup(key).await
    }

    async fn store(&self, key: &CacheKey, response: BufferedResponse, ttl: Duration) -> CacheResult<()> {
        (**self).store(key, response, ttl).await
    }
}

/// In-memory cache store (for development/testing).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for the key string.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.get(key).map(|entry| !entry.is_expired()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>> {
        let entry = {
            let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
            entries.get(key.as_str()).cloned()
        };

        match entry {
            Some(entry) if entry.is_expired() => {
                let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
                entries.remove(key.as_str());
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn store(&self, key: &CacheKey, response: BufferedResponse, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.as_str().to_string(), CachedEntry::new(response, ttl));
        Ok(())
    }
}
