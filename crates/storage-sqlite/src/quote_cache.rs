//! `PersistentQuoteCache` implementation: the durable, cross-restart
//! quote cache backing the in-memory tier. Grounded on the teacher's
//! `market_data::repository::MarketDataRepository::upsert_quote`
//! upsert-by-key shape; the payload itself is stored as a single JSON
//! blob (mirroring the teacher's `data_source` JSON passthrough
//! columns) rather than exploded into per-field columns, since the
//! Quote Service always reads/writes whole quotes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use vnquote_core::{AssetType, CoreResult, PersistentQuoteCache, Quote};

use crate::db::{DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::model::{asset_type_to_str, quote_from_row};

pub struct SqlitePersistentQuoteCache {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqlitePersistentQuoteCache {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl PersistentQuoteCache for SqlitePersistentQuoteCache {
    async fn get(&self, symbol: &str, asset_type: AssetType, now: DateTime<Utc>) -> CoreResult<Option<Quote>> {
        let pool = self.pool.clone();
        let symbol = symbol.to_uppercase();
        let asset_type_str = asset_type_to_str(asset_type).to_string();
        let now_str = now.to_rfc3339();
        tokio::task::spawn_blocking(move || -> CoreResult<Option<Quote>> {
            let conn = pool.get().into_core()?;
            let result = conn
                .query_row(
                    "SELECT * FROM quotes WHERE symbol = ?1 AND asset_type = ?2 AND expires_at > ?3",
                    params![symbol, asset_type_str, now_str],
                    quote_from_row,
                )
                .optional()
                .into_core()?;
            Ok(result)
        })
        .await
        .map_err(|e| vnquote_core::CoreError::Internal(format!("blocking task join error: {e}")))?
    }

    async fn put(&self, symbol: &str, asset_type: AssetType, quote: &Quote, expires_at: DateTime<Utc>) -> CoreResult<()> {
        let symbol = symbol.to_uppercase();
        let asset_type_str = asset_type_to_str(asset_type).to_string();
        let quote_json = serde_json::to_string(quote)
            .map_err(|e| vnquote_core::CoreError::Internal(format!("quote serialization failed: {e}")))?;
        let expires_at_str = expires_at.to_rfc3339();
        self.writer
            .exec(move |conn| {
                conn.execute(
                    "INSERT INTO quotes (symbol, asset_type, quote_json, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(symbol, asset_type) DO UPDATE SET
                        quote_json = excluded.quote_json, expires_at = excluded.expires_at",
                    params![symbol, asset_type_str, quote_json, expires_at_str],
                )
                .into_core()?;
                Ok(())
            })
            .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let now_str = now.to_rfc3339();
        self.writer
            .exec(move |conn| conn.execute("DELETE FROM quotes WHERE expires_at <= ?1", params![now_str]).into_core())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap()
    }

    fn sample_quote() -> Quote {
        Quote {
            symbol: "VNM".to_string(),
            asset_type: AssetType::Stock,
            date: now().date_naive(),
            open: Some(dec!(125000)),
            high: Some(dec!(126000)),
            low: Some(dec!(124000)),
            close: Some(dec!(125500)),
            adjclose: Some(dec!(125500)),
            volume: Some(dec!(1000)),
            nav: None,
            buy_price: None,
            sell_price: None,
            currency: "VND".to_string(),
            data_source: "SSI".to_string(),
            degraded: false,
        }
    }

    async fn test_cache() -> SqlitePersistentQuoteCache {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer((*pool).clone());
        SqlitePersistentQuoteCache::new(pool, writer)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_before_expiry() {
        let cache = test_cache().await;
        let quote = sample_quote();
        cache.put("VNM", AssetType::Stock, &quote, now() + chrono::Duration::minutes(5)).await.unwrap();

        let fetched = cache.get("vnm", AssetType::Stock, now()).await.unwrap().unwrap();
        assert_eq!(fetched.close, Some(dec!(125500)));
    }

    #[tokio::test]
    async fn get_after_expiry_returns_none() {
        let cache = test_cache().await;
        let quote = sample_quote();
        cache.put("VNM", AssetType::Stock, &quote, now() - chrono::Duration::minutes(1)).await.unwrap();

        assert!(cache.get("VNM", AssetType::Stock, now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_existing_row_for_same_key() {
        let cache = test_cache().await;
        let mut quote = sample_quote();
        cache.put("VNM", AssetType::Stock, &quote, now() + chrono::Duration::minutes(5)).await.unwrap();
        quote.close = Some(dec!(999999));
        cache.put("VNM", AssetType::Stock, &quote, now() + chrono::Duration::minutes(5)).await.unwrap();

        let fetched = cache.get("VNM", AssetType::Stock, now()).await.unwrap().unwrap();
        assert_eq!(fetched.close, Some(dec!(999999)));
    }

    #[tokio::test]
    async fn delete_expired_removes_only_stale_rows() {
        let cache = test_cache().await;
        let quote = sample_quote();
        cache.put("VNM", AssetType::Stock, &quote, now() - chrono::Duration::minutes(1)).await.unwrap();
        cache.put("VIC", AssetType::Stock, &quote, now() + chrono::Duration::minutes(5)).await.unwrap();

        let deleted = cache.delete_expired(now()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(cache.get("VIC", AssetType::Stock, now()).await.unwrap().is_some());
    }
}
