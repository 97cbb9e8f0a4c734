//! `PersistentSearchCache` implementation: durable cache of search hit
//! lists keyed by the raw query string. Same JSON-blob-per-row shape
//! as [`crate::quote_cache`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use vnquote_core::{CoreResult, PersistentSearchCache, SearchHit};

use crate::db::{DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::model::search_hits_from_row;

pub struct SqlitePersistentSearchCache {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqlitePersistentSearchCache {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

#[async_trait]
impl PersistentSearchCache for SqlitePersistentSearchCache {
    async fn get(&self, query: &str, now: DateTime<Utc>) -> CoreResult<Option<Vec<SearchHit>>> {
        let pool = self.pool.clone();
        let query = normalize_query(query);
        let now_str = now.to_rfc3339();
        tokio::task::spawn_blocking(move || -> CoreResult<Option<Vec<SearchHit>>> {
            let conn = pool.get().into_core()?;
            let result = conn
                .query_row(
                    "SELECT * FROM search_results WHERE query = ?1 AND expires_at > ?2",
                    params![query, now_str],
                    search_hits_from_row,
                )
                .optional()
                .into_core()?;
            Ok(result)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn put(&self, query: &str, hits: &[SearchHit], expires_at: DateTime<Utc>) -> CoreResult<()> {
        let query = normalize_query(query);
        let hits_json = serde_json::to_string(hits)
            .map_err(|e| vnquote_core::CoreError::Internal(format!("search hits serialization failed: {e}")))?;
        let expires_at_str = expires_at.to_rfc3339();
        self.writer
            .exec(move |conn| {
                conn.execute(
                    "INSERT INTO search_results (query, hits_json, expires_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(query) DO UPDATE SET
                        hits_json = excluded.hits_json, expires_at = excluded.expires_at",
                    params![query, hits_json, expires_at_str],
                )
                .into_core()?;
                Ok(())
            })
            .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let now_str = now.to_rfc3339();
        self.writer
            .exec(move |conn| conn.execute("DELETE FROM search_results WHERE expires_at <= ?1", params![now_str]).into_core())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use chrono::TimeZone;
    use vnquote_core::AssetType;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap()
    }

    fn sample_hits() -> Vec<SearchHit> {
        vec![SearchHit {
            symbol: "VNM".to_string(),
            name: "Vinamilk".to_string(),
            asset_type: AssetType::Stock,
            asset_class: "EQUITY".to_string(),
            asset_sub_class: "STOCK".to_string(),
            exchange: Some("HOSE".to_string()),
            currency: "VND".to_string(),
            data_source: "SSI".to_string(),
        }]
    }

    async fn test_cache() -> SqlitePersistentSearchCache {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer((*pool).clone());
        SqlitePersistentSearchCache::new(pool, writer)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_before_expiry() {
        let cache = test_cache().await;
        cache.put("vin", &sample_hits(), now() + chrono::Duration::minutes(5)).await.unwrap();

        let hits = cache.get("VIN", now()).await.unwrap().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "VNM");
    }

    #[tokio::test]
    async fn query_normalization_is_case_and_whitespace_insensitive() {
        let cache = test_cache().await;
        cache.put("  VIN  ", &sample_hits(), now() + chrono::Duration::minutes(5)).await.unwrap();

        assert!(cache.get("vin", now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_after_expiry_returns_none() {
        let cache = test_cache().await;
        cache.put("vin", &sample_hits(), now() - chrono::Duration::minutes(1)).await.unwrap();

        assert!(cache.get("vin", now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_expired_removes_only_stale_rows() {
        let cache = test_cache().await;
        cache.put("vin", &sample_hits(), now() - chrono::Duration::minutes(1)).await.unwrap();
        cache.put("vnm", &sample_hits(), now() + chrono::Duration::minutes(5)).await.unwrap();

        let deleted = cache.delete_expired(now()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(cache.get("vnm", now()).await.unwrap().is_some());
    }
}
