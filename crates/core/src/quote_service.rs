//! §4.8 Quote Service + Freshness Coordinator. Fallback chain: memory →
//! persistent → gold-historical-shortcut → provider → most-recent
//! historical → 7-day historical fetch → not-found. Grounded on the
//! teacher's `quotes::mod::QuoteService`, whose read-through + fallback
//! shape this mirrors.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use log::{debug, warn};

use vnquote_market_data::{AssetType, MarketProvider, ProviderOutcome};

use crate::clock::Clock;
use crate::errors::CoreResult;
use crate::historical_service::HistoricalService;
use crate::memory_cache::MemoryCache;
use crate::model::Quote;
use crate::rate_limiter::RateLimiter;
use crate::store::{HistoricalStore, PersistentQuoteCache};

/// Per-asset-type TTL (spec.md §3): FUND 24h, STOCK/INDEX/GOLD 1h.
pub fn ttl_for(asset_type: AssetType) -> chrono::Duration {
    match asset_type {
        AssetType::Fund => ChronoDuration::hours(24),
        AssetType::Stock | AssetType::Index | AssetType::Gold => ChronoDuration::hours(1),
    }
}

const MOST_RECENT_LOOKBACK_DAYS: i64 = 30;

pub struct QuoteService {
    memory_cache: MemoryCache<Quote>,
    persistent_cache: Arc<dyn PersistentQuoteCache>,
    store: Arc<dyn HistoricalStore>,
    provider: Arc<dyn MarketProvider>,
    rate_limiter: Arc<RateLimiter>,
    historical: Arc<HistoricalService>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl QuoteService {
    pub fn new(
        persistent_cache: Arc<dyn PersistentQuoteCache>,
        store: Arc<dyn HistoricalStore>,
        provider: Arc<dyn MarketProvider>,
        rate_limiter: Arc<RateLimiter>,
        historical: Arc<HistoricalService>,
        clock: Arc<dyn Clock>,
        memory_capacity: usize,
    ) -> Self {
        Self {
            memory_cache: MemoryCache::new("quotes", memory_capacity, std::time::Duration::from_secs(3600)),
            persistent_cache,
            store,
            provider,
            rate_limiter,
            historical,
            clock,
            max_retries: 3,
        }
    }

    fn cache_key(symbol: &str, asset_type: AssetType) -> String {
        format!("{}:{}", asset_type.as_str(), symbol.to_uppercase())
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        self.memory_cache.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.memory_cache.len()
    }

    /// §4.4/§4.11: sweep expired entries out of the in-memory quote
    /// cache. Returns the number removed.
    pub fn cleanup_expired_cache(&self) -> usize {
        self.memory_cache.cleanup_expired()
    }

    pub async fn get_quote(&self, symbol: &str, asset_type: AssetType) -> CoreResult<Quote> {
        let symbol = symbol.to_uppercase();
        let key = Self::cache_key(&symbol, asset_type);
        let now = self.clock.now();

        if let Some(quote) = self.memory_cache.get(&key) {
            self.run_freshness_check(&symbol, asset_type, &quote, now);
            return Ok(quote);
        }

        if let Some(quote) = self.persistent_cache.get(&symbol, asset_type, now).await? {
            self.memory_cache.put(key.clone(), quote.clone());
            self.run_freshness_check(&symbol, asset_type, &quote, now);
            return Ok(quote);
        }

        if asset_type == AssetType::Gold {
            if let Some(record) = self.store.most_recent_record(&symbol, asset_type, 1, now.date_naive()).await? {
                let quote: Quote = (&record).into();
                self.cache_quote(&key, &symbol, asset_type, quote.clone(), now).await?;
                return Ok(quote);
            }
        }

        match self.fetch_live_quote(&symbol, asset_type).await {
            Ok(Some(mut quote)) => {
                quote.degraded = false;
                self.cache_quote(&key, &symbol, asset_type, quote.clone(), now).await?;
                return Ok(quote);
            }
            Ok(None) => debug!("provider returned no quote for {symbol}"),
            Err(err) => warn!("provider quote call failed for {symbol}: {err}"),
        }

        if let Some(record) = self.store.most_recent_record(&symbol, asset_type, MOST_RECENT_LOOKBACK_DAYS, now.date_naive()).await? {
            let quote: Quote = (&record).into();
            self.cache_quote(&key, &symbol, asset_type, quote.clone(), now).await?;
            return Ok(quote);
        }

        let week_ago = now.date_naive() - ChronoDuration::days(7);
        let history = self
            .historical
            .get_history(&symbol, asset_type, week_ago, now.date_naive(), Some(false))
            .await?;
        if let Some(record) = history.last() {
            let quote: Quote = record.into();
            self.cache_quote(&key, &symbol, asset_type, quote.clone(), now).await?;
            return Ok(quote);
        }

        Err(crate::errors::CoreError::NotFound(symbol))
    }

    async fn fetch_live_quote(&self, symbol: &str, asset_type: AssetType) -> Result<Option<Quote>, vnquote_market_data::ProviderError> {
        let provider = self.provider.clone();
        let sym = symbol.to_string();
        let raw = self
            .rate_limiter
            .execute_with_retry(self.max_retries, move || {
                let provider = provider.clone();
                let sym = sym.clone();
                async move {
                    match provider.fetch_quote(&sym, asset_type).await {
                        ProviderOutcome::Ok(row) => Ok(Some(row)),
                        ProviderOutcome::Empty => Ok(None),
                        ProviderOutcome::Err(e) => Err(e),
                    }
                }
            })
            .await?;

        Ok(raw.map(|row| {
            let mut record = crate::model::HistoricalRecord {
                symbol: symbol.to_uppercase(),
                asset_type,
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                adjclose: None,
                volume: row.volume,
                nav: row.nav,
                buy_price: row.buy_price,
                sell_price: row.sell_price,
                data_json: row.data_json,
                updated_at: self.clock.now(),
            };
            record.normalize();
            let mut quote: Quote = (&record).into();
            quote.degraded = false;
            quote.data_source = self.provider.id().to_string();
            quote
        }))
    }

    async fn cache_quote(&self, key: &str, symbol: &str, asset_type: AssetType, quote: Quote, now: DateTime<Utc>) -> CoreResult<()> {
        self.memory_cache.put(key.to_string(), quote.clone());
        let expires_at = now + ttl_for(asset_type);
        if let Err(err) = self.persistent_cache.put(symbol, asset_type, &quote, expires_at).await {
            warn!("failed to persist quote cache row for {symbol}: {err}");
        }
        Ok(())
    }

    /// §4.8 Freshness Coordinator: on weekdays, if the cached quote is
    /// more than 30 minutes stale, spawns a background fetch for today.
    /// On weekends, if the cached quote isn't already Friday's, spawns a
    /// fetch for the most recent Friday. Never awaited by the caller —
    /// failures are logged and dropped.
    fn run_freshness_check(&self, symbol: &str, asset_type: AssetType, quote: &Quote, now: DateTime<Utc>) {
        let is_weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
        let target_date = if is_weekend {
            if quote.date.weekday() == Weekday::Fri {
                return;
            }
            most_recent_friday(now.date_naive())
        } else {
            if (now - quote_as_of(quote, now)).num_minutes() <= 30 {
                return;
            }
            now.date_naive()
        };

        debug!("freshness coordinator scheduling top-up for {symbol} ({asset_type}) -> {target_date}");
        let historical = self.historical.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            if let Err(err) = historical.get_history(&symbol, asset_type, target_date, target_date, Some(false)).await {
                warn!("freshness top-up fetch failed for {symbol}: {err}");
            }
        });
    }
}

fn quote_as_of(quote: &Quote, now: DateTime<Utc>) -> DateTime<Utc> {
    quote
        .date
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Utc).single())
        .unwrap_or(now)
}

fn most_recent_friday(as_of: NaiveDate) -> NaiveDate {
    let days_since_friday = (as_of.weekday().num_days_from_monday() as i64 - Weekday::Fri.num_days_from_monday() as i64).rem_euclid(7);
    as_of - ChronoDuration::days(days_since_friday)
}
