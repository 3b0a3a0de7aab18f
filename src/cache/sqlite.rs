use crate::cache::clock::{Clock, SystemClock};
use crate::cache::store::{expiry_after, KvStore};
use crate::PeerLensError;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed key-value store.
///
/// Every write is a single-row upsert, so readers never observe a partially written value.
#[derive(Clone)]
pub struct SqliteStore {
    /// shared connection pool for reading and writing
    conn_pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub async fn new(path: &str) -> Result<Self, PeerLensError> {
        Self::with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(path: &str, clock: Arc<dyn Clock>) -> Result<Self, PeerLensError> {
        info!("open cache store at {}", path);

        if !Sqlite::database_exists(path).await? {
            Sqlite::create_database(path).await?;
            info!("created cache store at {}", path);
        }
        let conn_pool = SqlitePool::connect(path).await?;

        let store = SqliteStore { conn_pool, clock };
        store.initialize().await?;

        Ok(store)
    }

    async fn initialize(&self) -> Result<(), PeerLensError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kv_expires_at
                ON kv(expires_at);

            PRAGMA journal_mode=WAL;
        "#,
        )
        .execute(&self.conn_pool)
        .await?;
        Ok(())
    }

    /// Retrieves the number of rows in the store, expired or not.
    pub async fn get_entry_count(&self) -> Result<i64, PeerLensError> {
        let count = sqlx::query("SELECT count(*) FROM kv")
            .map(|row: SqliteRow| row.get::<i64, _>(0))
            .fetch_one(&self.conn_pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PeerLensError> {
        let now_ms = self.clock.now().timestamp_millis();
        let value = sqlx::query("SELECT value FROM kv WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_ms)
            .map(|row: SqliteRow| row.get::<String, _>(0))
            .fetch_optional(&self.conn_pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), PeerLensError> {
        let expires_at = expiry_after(self.clock.now(), ttl).timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.conn_pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PeerLensError> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.conn_pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, PeerLensError> {
        let now_ms = self.clock.now().timestamp_millis();
        let result = sqlx::query("DELETE FROM kv WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&self.conn_pool)
            .await?;
        let deleted = result.rows_affected();
        debug!("purged {} expired cache entries", deleted);
        Ok(deleted)
    }
}
