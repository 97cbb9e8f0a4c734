//! §4.12 Search Cache Interaction (recovered from
//! `original_source/app/cache/search_optimizer.py`): the same two-tier
//! memory + persistent cache shape as quotes, fronting the asset
//! catalog's text search and the provider's own `search` capability.
//! The ranking heuristic itself stays out of scope per spec.md §1; this
//! module only owns the cache interaction around it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use log::warn;

use vnquote_market_data::{MarketProvider, ProviderOutcome};

use crate::clock::Clock;
use crate::errors::CoreResult;
use crate::memory_cache::MemoryCache;
use crate::model::SearchHit;
use crate::store::{AssetCatalog, PersistentSearchCache};

const SEARCH_TTL_MINUTES: i64 = 30;
const DEFAULT_LIMIT: usize = 20;

pub struct SearchService {
    catalog: Arc<dyn AssetCatalog>,
    provider: Arc<dyn MarketProvider>,
    persistent_cache: Arc<dyn PersistentSearchCache>,
    memory_cache: MemoryCache<Vec<SearchHit>>,
    clock: Arc<dyn Clock>,
}

impl SearchService {
    pub fn new(
        catalog: Arc<dyn AssetCatalog>,
        provider: Arc<dyn MarketProvider>,
        persistent_cache: Arc<dyn PersistentSearchCache>,
        clock: Arc<dyn Clock>,
        memory_capacity: usize,
    ) -> Self {
        Self {
            catalog,
            provider,
            persistent_cache,
            memory_cache: MemoryCache::new("searches", memory_capacity, Duration::from_secs((SEARCH_TTL_MINUTES * 60) as u64)),
            clock,
        }
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        self.memory_cache.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.memory_cache.len()
    }

    /// §4.4/§4.11: sweep expired entries out of the in-memory search
    /// cache. Returns the number removed.
    pub fn cleanup_expired_cache(&self) -> usize {
        self.memory_cache.cleanup_expired()
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> CoreResult<Vec<SearchHit>> {
        let key = query.trim().to_uppercase();
        if key.is_empty() {
            return Err(crate::errors::CoreError::InvalidInput("search query must not be empty".into()));
        }
        let limit = limit.unwrap_or(DEFAULT_LIMIT);

        if let Some(hits) = self.memory_cache.get(&key) {
            return Ok(truncate(hits, limit));
        }

        let now = self.clock.now();
        if let Some(hits) = self.persistent_cache.get(&key, now).await? {
            self.memory_cache.put(key.clone(), hits.clone());
            return Ok(truncate(hits, limit));
        }

        let mut hits = self.catalog.search_by_text(&key, limit).await?;
        if hits.is_empty() {
            hits = self.search_via_provider(&key).await;
        }

        let expires_at = now + ChronoDuration::minutes(SEARCH_TTL_MINUTES);
        self.memory_cache.put(key.clone(), hits.clone());
        if let Err(err) = self.persistent_cache.put(&key, &hits, expires_at).await {
            warn!("failed to persist search cache row for '{key}': {err}");
        }

        Ok(truncate(hits, limit))
    }

    async fn search_via_provider(&self, query: &str) -> Vec<SearchHit> {
        match self.provider.search(query).await {
            ProviderOutcome::Ok(rows) => rows
                .into_iter()
                .map(|h| {
                    let (asset_class, asset_sub_class) = h.asset_type.classification();
                    SearchHit {
                        symbol: h.symbol,
                        name: h.name,
                        asset_type: h.asset_type,
                        asset_class: asset_class.to_string(),
                        asset_sub_class: asset_sub_class.to_string(),
                        exchange: h.exchange,
                        currency: crate::model::DEFAULT_CURRENCY.to_string(),
                        data_source: self.provider.id().to_string(),
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn truncate(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;
    use vnquote_market_data::testing::FakeProvider;

    use crate::clock::FixedClock;

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct EmptyCatalog;

    #[async_trait]
    impl AssetCatalog for EmptyCatalog {
        async fn upsert_many(&self, _assets: &[crate::model::Asset]) -> CoreResult<usize> {
            Ok(0)
        }
        async fn get(&self, _symbol: &str) -> CoreResult<Option<crate::model::Asset>> {
            Ok(None)
        }
        async fn search_by_text(&self, _query: &str, _limit: usize) -> CoreResult<Vec<SearchHit>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> CoreResult<usize> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct InMemorySearchCache {
        rows: StdMutex<StdHashMap<String, (Vec<SearchHit>, DateTime<chrono::Utc>)>>,
    }

    #[async_trait]
    impl PersistentSearchCache for InMemorySearchCache {
        async fn get(&self, query: &str, now: DateTime<chrono::Utc>) -> CoreResult<Option<Vec<SearchHit>>> {
            Ok(self.rows.lock().unwrap().get(query).filter(|(_, exp)| *exp > now).map(|(h, _)| h.clone()))
        }
        async fn put(&self, query: &str, hits: &[SearchHit], expires_at: DateTime<chrono::Utc>) -> CoreResult<()> {
            self.rows.lock().unwrap().insert(query.to_string(), (hits.to_vec(), expires_at));
            Ok(())
        }
        async fn delete_expired(&self, now: DateTime<chrono::Utc>) -> CoreResult<usize> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, (_, exp)| *exp > now);
            Ok(before - rows.len())
        }
    }

    #[tokio::test]
    async fn empty_query_is_invalid_input() {
        let svc = SearchService::new(Arc::new(EmptyCatalog), Arc::new(FakeProvider::new()), Arc::new(InMemorySearchCache::default()), Arc::new(FixedClock(today())), 10);
        let err = svc.search("   ", None).await.unwrap_err();
        assert!(matches!(err, crate::errors::CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn falls_back_to_provider_search_when_catalog_is_empty() {
        let provider = Arc::new(FakeProvider::new());
        provider.listings.lock().unwrap().insert(
            vnquote_market_data::AssetType::Stock,
            vec![vnquote_market_data::RawAssetDescriptor {
                symbol: "VNM".into(),
                name: "Vinamilk".into(),
                asset_type: vnquote_market_data::AssetType::Stock,
                exchange: Some("HOSE".into()),
                currency: None,
                data_source: "FAKE".into(),
            }],
        );
        let svc = SearchService::new(Arc::new(EmptyCatalog), provider, Arc::new(InMemorySearchCache::default()), Arc::new(FixedClock(today())), 10);
        let hits = svc.search("VNM", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "VNM");

        let (hits_count, _) = svc.cache_stats();
        assert_eq!(hits_count, 0);
        let cached = svc.search("vnm", None).await.unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn persistent_cache_ttl_is_evaluated_against_the_injected_clock_not_wall_clock() {
        let persistent_cache = Arc::new(InMemorySearchCache::default());
        let clock = Arc::new(FixedClock(today()));
        let svc = SearchService::new(Arc::new(EmptyCatalog), Arc::new(FakeProvider::new()), persistent_cache.clone(), clock.clone(), 10);

        let hits = vec![SearchHit {
            symbol: "VNM".into(),
            name: "Vinamilk".into(),
            asset_type: vnquote_market_data::AssetType::Stock,
            asset_class: "EQUITY".into(),
            asset_sub_class: "COMMON".into(),
            exchange: Some("HOSE".into()),
            currency: "VND".into(),
            data_source: "CACHE".into(),
        }];
        // Still fresh relative to the fixed clock (`today()`, 2025-10-03),
        // but long past relative to real wall-clock time — proves the
        // service reads `self.clock`, not `Utc::now()`, for the TTL check.
        persistent_cache.put("VNM", &hits, today() + chrono::Duration::hours(1)).await.unwrap();

        let result = svc.search("VNM", None).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].symbol, "VNM");
    }
}
