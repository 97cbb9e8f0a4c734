//! The Application Context: an explicitly-constructed struct wiring every
//! component together, replacing the source's global mutable singletons
//! (Design Notes redesign flag). Grounded on the teacher's `AppState`
//! (`apps/server/src/main_lib.rs`), generalized here to live in `core` so
//! it's usable from both the HTTP app and tests/tools without pulling in
//! axum.

use std::sync::Arc;

use vnquote_market_data::MarketProvider;

use crate::clock::Clock;
use crate::historical_service::{HistoricalService, HistoricalServiceConfig, LazyFetchTrigger};
use crate::lazy_fetch::LazyFetchManager;
use crate::maintenance::MaintenanceScheduler;
use crate::rate_limiter::{PerIpRateLimiter, RateLimiter, RateLimiterConfig};
use crate::search_service::SearchService;
use crate::seeder::Seeder;
use crate::store::{AssetCatalog, HistoricalStore, PersistentQuoteCache, PersistentSearchCache};
use crate::quote_service::QuoteService;

/// Tunable knobs that would otherwise be scattered module-level
/// constants or environment lookups, collected the way the teacher's
/// `Config` groups them for its own subsystems.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub rate_limiter: RateLimiterConfig,
    pub max_tracked_ips: usize,
    pub quote_cache_capacity: usize,
    pub search_cache_capacity: usize,
    pub general_cache_capacity: usize,
    pub historical: HistoricalServiceConfigShape,
}

/// A plain-data mirror of [`HistoricalServiceConfig`] so `CoreConfig` can
/// derive `Clone`/`Debug` without requiring those of the service config
/// itself (kept deliberately tiny; see DESIGN.md for why it isn't just
/// reused directly).
#[derive(Clone, Copy, Debug)]
pub struct HistoricalServiceConfigShape {
    pub max_retries: u32,
    pub completeness_threshold: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rate_limiter: RateLimiterConfig::default(),
            max_tracked_ips: 10_000,
            quote_cache_capacity: 500,
            search_cache_capacity: 200,
            general_cache_capacity: 1000,
            historical: HistoricalServiceConfigShape {
                max_retries: 3,
                completeness_threshold: 0.8,
            },
        }
    }
}

/// Everything the HTTP layer (or a CLI tool, or a test) needs to serve a
/// request. Built once at startup and shared via `Arc`.
pub struct AppContext {
    pub provider: Arc<dyn MarketProvider>,
    pub store: Arc<dyn HistoricalStore>,
    pub asset_catalog: Arc<dyn AssetCatalog>,
    pub rate_limiter: Arc<RateLimiter>,
    pub per_ip_rate_limiter: Arc<PerIpRateLimiter>,
    pub lazy_fetch: Arc<LazyFetchManager>,
    pub historical: Arc<HistoricalService>,
    pub quotes: Arc<QuoteService>,
    pub search: Arc<SearchService>,
    pub seeder: Arc<Seeder>,
    pub maintenance: Arc<MaintenanceScheduler>,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        provider: Arc<dyn MarketProvider>,
        store: Arc<dyn HistoricalStore>,
        asset_catalog: Arc<dyn AssetCatalog>,
        persistent_quote_cache: Arc<dyn PersistentQuoteCache>,
        persistent_search_cache: Arc<dyn PersistentSearchCache>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Arc<Self> {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiter.clone()));
        let per_ip_rate_limiter = Arc::new(PerIpRateLimiter::new(config.rate_limiter.clone(), config.max_tracked_ips));

        let lazy_fetch = Arc::new(LazyFetchManager::new(store.clone(), provider.clone(), rate_limiter.clone(), clock.clone()));
        let lazy_fetch_trigger: Arc<dyn LazyFetchTrigger> = lazy_fetch.clone();

        let historical = Arc::new(HistoricalService::new(
            store.clone(),
            provider.clone(),
            rate_limiter.clone(),
            Some(lazy_fetch_trigger),
            clock.clone(),
            HistoricalServiceConfig {
                max_retries: config.historical.max_retries,
                completeness_threshold: config.historical.completeness_threshold,
            },
        ));

        let quotes = Arc::new(QuoteService::new(
            persistent_quote_cache.clone(),
            store.clone(),
            provider.clone(),
            rate_limiter.clone(),
            historical.clone(),
            clock.clone(),
            config.quote_cache_capacity,
        ));

        let search = Arc::new(SearchService::new(
            asset_catalog.clone(),
            provider.clone(),
            persistent_search_cache.clone(),
            clock.clone(),
            config.search_cache_capacity,
        ));

        let seeder = Arc::new(Seeder::new(asset_catalog.clone(), provider.clone()));

        let maintenance = Arc::new(MaintenanceScheduler::new(
            persistent_quote_cache,
            store.clone(),
            per_ip_rate_limiter.clone(),
            seeder.clone(),
            quotes.clone(),
            search.clone(),
        ));

        Arc::new(Self {
            provider,
            store,
            asset_catalog,
            rate_limiter,
            per_ip_rate_limiter,
            lazy_fetch,
            historical,
            quotes,
            search,
            seeder,
            maintenance,
            clock,
        })
    }
}
