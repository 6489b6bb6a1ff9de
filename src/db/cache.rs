use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::models::CacheRow;
use crate::error::Result;
use crate::types::now_secs;

/// Key/value store backing the fingerprint cache. Writes are upserts; concurrent
/// writers for the same key simply overwrite each other.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheRow>>;
    async fn put(&self, key: &str, computed_at: i64, value: &str) -> Result<()>;
}

pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRow>> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT computed_at, value FROM cache_entries WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn put(&self, key: &str, computed_at: i64, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, computed_at, value)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                computed_at = excluded.computed_at,
                value = excluded.value
            "#,
        )
        .bind(key)
        .bind(computed_at)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Time-boxed memoization of request results keyed by a hash of the request.
///
/// Not a mutual-exclusion cache: two concurrent misses on the same key both run
/// `compute` and the later write wins. Store failures never fail the request;
/// they degrade to a live compute.
pub struct FingerprintCache {
    store: Arc<dyn CacheStore>,
    ttl_secs: u64,
    pub stats: CacheStats,
}

impl FingerprintCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs, stats: CacheStats::default() }
    }

    /// Deterministic key for a request: `<prefix>:<sha256 of its JSON form>`.
    pub fn fingerprint<P: Serialize>(prefix: &str, params: &P) -> Result<String> {
        let encoded = serde_json::to_vec(params)?;
        let digest = Sha256::digest(&encoded);
        Ok(format!("{prefix}:{digest:x}"))
    }

    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute_at(key, now_secs(), compute).await
    }

    pub async fn get_or_compute_at<T, F, Fut>(&self, key: &str, now: u64, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.store.get(key).await {
            Ok(Some(row)) if is_fresh(row.computed_at, now, self.ttl_secs) => {
                match serde_json::from_str::<T>(&row.value) {
                    Ok(value) => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key, age = now as i64 - row.computed_at, "Cache hit");
                        return Ok(value);
                    }
                    Err(e) => warn!(key, "Discarding undecodable cache entry: {e}"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(key, "Cache read failed, computing live: {e}"),
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute().await?;

        match serde_json::to_string(&value) {
            Ok(encoded) => {
                if let Err(e) = self.store.put(key, now as i64, &encoded).await {
                    warn!(key, "Cache write failed: {e}");
                }
            }
            Err(e) => warn!(key, "Cache value not serializable: {e}"),
        }
        Ok(value)
    }
}

fn is_fresh(computed_at: i64, now: u64, ttl_secs: u64) -> bool {
    let age = now as i64 - computed_at;
    age >= 0 && (age as u64) < ttl_secs
}
