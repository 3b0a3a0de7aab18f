//! Typed caches on top of a [KvStore].
//!
//! Each cache owns one key space (`ixp:{asn}`, `report:{asn}`) with its own TTL.
//! Values are stored as JSON together with the time they were produced, so a
//! cache can tell a fresh entry from one it only keeps around as a fallback.
//!
//! Store failures never propagate out of a cache: a failed read is a miss and a
//! failed write is logged.

mod clock;
#[cfg(feature = "sqlite")]
mod sqlite;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{KvStore, MemoryStore};

use crate::report::PeeringReport;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A cached value with the time it was fetched or computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub fetched_at: DateTime<Utc>,
    pub value: T,
}

/// A JSON-encoded key space in a [KvStore].
pub struct TypedCache<T> {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    prefix: &'static str,
    /// age under which an entry is fresh
    ttl: Duration,
    /// how long an entry is kept in the store; at least `ttl`
    retention: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            prefix: self.prefix,
            ttl: self.ttl,
            retention: self.retention,
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> TypedCache<T> {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        prefix: &'static str,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            prefix,
            ttl,
            retention: ttl,
            _marker: PhantomData,
        }
    }

    /// Keep entries in the store for `grace` after they stop being fresh.
    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.retention = self.ttl.saturating_add(grace);
        self
    }

    pub fn key(&self, id: impl std::fmt::Display) -> String {
        format!("{}:{}", self.prefix, id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the stored entry regardless of freshness.
    pub async fn get_entry(&self, id: impl std::fmt::Display) -> Option<CacheEntry<T>> {
        let key = self.key(id);
        let raw = match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("cache read failed for {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry<T>>(raw.as_str()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        clock::is_within(entry.fetched_at, self.clock.now(), self.ttl)
    }

    /// Get the value only if it is still fresh.
    pub async fn get_fresh(&self, id: impl std::fmt::Display) -> Option<T> {
        let entry = self.get_entry(id).await?;
        match self.is_fresh(&entry) {
            true => Some(entry.value),
            false => None,
        }
    }

    /// Store a value stamped with the current time.
    pub async fn put(&self, id: impl std::fmt::Display, value: T) {
        let key = self.key(id);
        let entry = CacheEntry {
            fetched_at: self.clock.now(),
            value,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to encode cache entry {}: {}", key, e);
                return;
            }
        };
        match self.store.set(key.as_str(), raw, self.retention).await {
            Ok(()) => debug!("cached {}", key),
            Err(e) => warn!("cache write failed for {}: {}", key, e),
        }
    }

    pub async fn invalidate(&self, id: impl std::fmt::Display) {
        let key = self.key(id);
        if let Err(e) = self.store.delete(key.as_str()).await {
            warn!("cache delete failed for {}: {}", key, e);
        }
    }
}

/// Per-ASN IXP membership sets.
pub type MembershipCache = TypedCache<BTreeSet<u32>>;

/// Finished per-ASN reports.
#[derive(Clone)]
pub struct ReportCache {
    inner: TypedCache<PeeringReport>,
}

impl ReportCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            inner: TypedCache::new(store, clock, "report", ttl),
        }
    }

    /// Get a report computed less than one TTL ago.
    pub async fn get(&self, asn: u32) -> Option<PeeringReport> {
        self.inner.get_fresh(asn).await
    }

    pub async fn put(&self, asn: u32, report: PeeringReport) {
        self.inner.put(asn, report).await
    }

    pub async fn invalidate(&self, asn: u32) {
        self.inner.invalidate(asn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership_cache(clock: Arc<ManualClock>) -> MembershipCache {
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        TypedCache::new(store, clock, "ixp", Duration::from_secs(3600))
            .with_stale_grace(Duration::from_secs(7200))
    }

    #[tokio::test]
    async fn test_fresh_then_stale_then_gone() {
        let clock = Arc::new(ManualClock::default());
        let cache = membership_cache(clock.clone());
        assert_eq!(cache.key(3320), "ixp:3320");

        cache.put(3320, BTreeSet::from([26, 31])).await;
        assert_eq!(cache.get_fresh(3320).await, Some(BTreeSet::from([26, 31])));

        // past the TTL: no longer fresh, still available as fallback
        clock.advance(Duration::from_secs(3601));
        assert_eq!(cache.get_fresh(3320).await, None);
        let entry = cache.get_entry(3320).await.unwrap();
        assert!(!cache.is_fresh(&entry));
        assert_eq!(entry.value, BTreeSet::from([26, 31]));

        // past TTL + grace: dropped by the store
        clock.advance(Duration::from_secs(7200));
        assert!(cache.get_entry(3320).await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        store
            .set("ixp:1136", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache: MembershipCache =
            TypedCache::new(store, clock, "ixp", Duration::from_secs(60));
        assert!(cache.get_entry(1136).await.is_none());
    }
}
