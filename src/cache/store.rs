//! Key-value store abstraction backing the membership and report caches.
//!
//! The store is a black box with atomic per-key get/set and expiry. Values are
//! opaque strings (serialized JSON); callers own the encoding.

use crate::cache::clock::{Clock, SystemClock};
use crate::PeerLensError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// The `KvStore` trait defines the interface for cache storage backends.
///
/// Implementations must never expose a partially written value: a `get` racing
/// a `set` on the same key sees either the old or the new value.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value that has not yet expired.
    async fn get(&self, key: &str) -> Result<Option<String>, PeerLensError>;

    /// Set a value that expires after `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), PeerLensError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), PeerLensError>;

    /// Drop all expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, PeerLensError>;
}

pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local store.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PeerLensError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), PeerLensError> {
        let expires_at = expiry_after(self.clock.now(), ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PeerLensError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, PeerLensError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    #[tokio::test]
    async fn test_set_get_expire() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryStore::with_clock(clock.clone());

        store
            .set("ixp:3320", "[26,31]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("ixp:3320").await.unwrap(),
            Some("[26,31]".to_string())
        );

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.get("ixp:3320").await.unwrap(), None);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("k", "a".to_string(), ttl).await.unwrap();
        store.set("k", "b".to_string(), ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("b".to_string()));
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
