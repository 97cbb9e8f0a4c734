//! §4.7 Historical Read-Through Service: cache lookup → plan gaps → fetch
//! with rate limit → persist → merge → return. Grounded on the teacher's
//! `quotes::mod::QuoteSyncService`, which drives the same
//! cache-then-provider-then-merge shape for quote history.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;

use vnquote_market_data::{sjc, AssetType, MarketProvider, ProviderError, ProviderOutcome, RawQuoteRow};

use crate::clock::Clock;
use crate::errors::{CoreError, CoreResult};
use crate::model::HistoricalRecord;
use crate::planner::{self, FetchStrategy};
use crate::policy::AssetCachePolicy;
use crate::rate_limiter::RateLimiter;
use crate::store::HistoricalStore;

/// The earliest date the "fetch whole history" fallback (§4.7 step 1.d)
/// will ask the provider for, when cache coverage is too low to trust
/// gap-by-gap planning.
pub const FULL_HISTORY_FLOOR: &str = "2000-01-01";

/// Decouples the service from the lazy fetch manager per the Design
/// Notes redesign flag: the service only knows it can ask *something*
/// to backfill a range later, never the manager's internals.
pub trait LazyFetchTrigger: Send + Sync {
    fn trigger(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate);
}

/// Default: lazy-fetch mode is on for gold, opt-in for everything else
/// (spec.md §4.7).
pub fn default_lazy_fetch_enabled(asset_type: AssetType) -> bool {
    matches!(asset_type, AssetType::Gold)
}

pub struct HistoricalServiceConfig {
    pub max_retries: u32,
    /// Completeness threshold above which cached data is returned
    /// immediately in lazy-fetch mode (spec.md §4.7: 80%).
    pub completeness_threshold: f64,
}

impl Default for HistoricalServiceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            completeness_threshold: 0.8,
        }
    }
}

pub struct HistoricalService {
    store: Arc<dyn HistoricalStore>,
    provider: Arc<dyn MarketProvider>,
    rate_limiter: Arc<RateLimiter>,
    lazy_fetch: Option<Arc<dyn LazyFetchTrigger>>,
    clock: Arc<dyn Clock>,
    config: HistoricalServiceConfig,
}

impl HistoricalService {
    pub fn new(
        store: Arc<dyn HistoricalStore>,
        provider: Arc<dyn MarketProvider>,
        rate_limiter: Arc<RateLimiter>,
        lazy_fetch: Option<Arc<dyn LazyFetchTrigger>>,
        clock: Arc<dyn Clock>,
        config: HistoricalServiceConfig,
    ) -> Self {
        Self {
            store,
            provider,
            rate_limiter,
            lazy_fetch,
            clock,
            config,
        }
    }

    /// Entry point for `GET /history/{symbol}` and its per-type mirrors.
    /// `requested_symbol` may carry the gold `.C` suffix; the canonical
    /// `VN.GOLD` symbol is used for storage and provider calls, with the
    /// ÷10 conversion applied only on the way out.
    pub async fn get_history(
        &self,
        requested_symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
        lazy_fetch_override: Option<bool>,
    ) -> CoreResult<Vec<HistoricalRecord>> {
        if start > end {
            return Err(CoreError::InvalidInput(format!("start {start} is after end {end}")));
        }

        let (storage_symbol, is_chi): (String, bool) = if asset_type == AssetType::Gold {
            let (canon, chi) = sjc::canonicalize_gold_symbol(requested_symbol);
            (canon.to_string(), chi)
        } else {
            (requested_symbol.to_uppercase(), false)
        };

        let lazy_enabled = lazy_fetch_override.unwrap_or_else(|| default_lazy_fetch_enabled(asset_type));

        let mut records = if lazy_enabled {
            self.get_history_lazy(&storage_symbol, asset_type, start, end).await?
        } else {
            self.get_history_incremental(&storage_symbol, asset_type, start, end).await?
        };

        if is_chi {
            for r in &mut records {
                r.symbol = requested_symbol.to_uppercase();
                apply_chi_conversion(r);
            }
        }
        Ok(records)
    }

    async fn get_history_lazy(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<HistoricalRecord>> {
        let cached = self.store.cached_records_in_range(symbol, asset_type, start, end).await?;
        let expected = expected_day_count(asset_type, start, end);
        let completeness = if expected > 0 { cached.len() as f64 / expected as f64 } else { 1.0 };

        if completeness >= self.config.completeness_threshold {
            if (cached.len() as i64) < expected {
                self.maybe_trigger_lazy_fetch(symbol, asset_type, start, end);
            }
            return Ok(cached);
        }

        let wide_start: NaiveDate = FULL_HISTORY_FLOOR.parse().expect("constant date literal");
        let wide_end = self.clock.today().max(end);

        match self.fetch_via_limiter(symbol, asset_type, wide_start, wide_end).await {
            Ok(rows) => {
                let records = self.store_rows(symbol, asset_type, rows).await?;
                let merged = merge_records(cached, records);
                let subset: Vec<HistoricalRecord> = merged.into_iter().filter(|r| r.date >= start && r.date <= end).collect();
                Ok(subset)
            }
            Err(err) => {
                warn!("full-history fallback failed for {symbol}: {err}");
                self.maybe_trigger_lazy_fetch(symbol, asset_type, start, end);
                Ok(cached)
            }
        }
    }

    async fn get_history_incremental(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<HistoricalRecord>> {
        let cached_dates = self.store.cached_dates_in_range(symbol, asset_type, start, end).await?;
        let gaps = planner::plan_gaps(start, end, &cached_dates);
        let cached_records = self.store.cached_records_in_range(symbol, asset_type, start, end).await?;

        if gaps.is_empty() {
            return Ok(cached_records);
        }

        let requested_days = planner::DateRange::new(start, end).day_count();
        let missing_days: i64 = gaps.iter().map(|g| g.day_count()).sum();
        let strategy = planner::choose_strategy(requested_days, missing_days);

        let policy = crate::policy::default_policy_for(asset_type);
        let mut fetched = Vec::new();

        match strategy {
            FetchStrategy::FullRange => {
                if let Ok(rows) = self.fetch_via_limiter(symbol, asset_type, start, end).await {
                    fetched.extend(self.store_rows(symbol, asset_type, rows).await?);
                }
                self.apply_mark_fetched(symbol, asset_type, start, end, policy).await?;
            }
            FetchStrategy::Gaps => {
                for gap in &gaps {
                    match self.fetch_via_limiter(symbol, asset_type, gap.start, gap.end).await {
                        Ok(rows) => fetched.extend(self.store_rows(symbol, asset_type, rows).await?),
                        Err(err) => debug!("gap fetch failed for {symbol} {:?}: {err}", gap),
                    }
                    self.apply_mark_fetched(symbol, asset_type, gap.start, gap.end, policy).await?;
                }
            }
        }

        Ok(merge_records(cached_records, fetched))
    }

    async fn fetch_via_limiter(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawQuoteRow>, ProviderError> {
        let provider = self.provider.clone();
        let symbol = symbol.to_string();
        self.rate_limiter
            .execute_with_retry(self.config.max_retries, move || {
                let provider = provider.clone();
                let symbol = symbol.clone();
                async move {
                    match provider.fetch_history(&symbol, asset_type, start, end).await {
                        ProviderOutcome::Ok(rows) => Ok(rows),
                        ProviderOutcome::Empty => Ok(Vec::new()),
                        ProviderOutcome::Err(e) => Err(e),
                    }
                }
            })
            .await
    }

    async fn store_rows(&self, symbol: &str, asset_type: AssetType, rows: Vec<RawQuoteRow>) -> CoreResult<Vec<HistoricalRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let records: Vec<HistoricalRecord> = rows.into_iter().map(|row| raw_to_record(symbol, asset_type, row, now)).collect();
        self.store.store(&records).await?;
        Ok(records)
    }

    async fn apply_mark_fetched(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
        policy: &dyn AssetCachePolicy,
    ) -> CoreResult<()> {
        let now = self.clock.now();
        self.store.mark_fetched(symbol, asset_type, start, end, policy, now).await?;
        Ok(())
    }

    fn maybe_trigger_lazy_fetch(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate) {
        if let Some(trigger) = &self.lazy_fetch {
            trigger.trigger(symbol, asset_type, start, end);
        }
    }
}

/// Real-trading-day count used in the completeness calculation: all
/// calendar days for asset types that trade seven days a week (gold),
/// weekdays only otherwise.
fn expected_day_count(asset_type: AssetType, start: NaiveDate, end: NaiveDate) -> i64 {
    if asset_type.trades_seven_days() {
        planner::DateRange::new(start, end).day_count()
    } else {
        planner::weekday_count(start, end)
    }
}

/// §4.7 normalization: stocks/indices ×1000; fund `nav` mirrored into
/// `close`; gold `close` derived from buy/sell. `data_json` carries the
/// provider's raw payload verbatim.
fn raw_to_record(symbol: &str, asset_type: AssetType, row: RawQuoteRow, now: DateTime<Utc>) -> HistoricalRecord {
    let mut record = HistoricalRecord {
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
        updated_at: now,
    };
    record.normalize();
    record
}

/// Divide every monetary field by 10 for the Chỉ egress conversion.
/// `volume` is deliberately untouched.
fn apply_chi_conversion(record: &mut HistoricalRecord) {
    let ten = Decimal::from(10);
    record.open = record.open.map(|v| v / ten);
    record.high = record.high.map(|v| v / ten);
    record.low = record.low.map(|v| v / ten);
    record.close = record.close.map(|v| v / ten);
    record.adjclose = record.adjclose.map(|v| v / ten);
    record.buy_price = record.buy_price.map(|v| v / ten);
    record.sell_price = record.sell_price.map(|v| v / ten);
}

/// Merge cached and freshly-fetched records by date; on conflict the
/// newly-fetched record wins (spec.md §4.7 step 2.e). Sorted ascending.
fn merge_records(cached: Vec<HistoricalRecord>, fetched: Vec<HistoricalRecord>) -> Vec<HistoricalRecord> {
    let mut by_date: HashMap<NaiveDate, HistoricalRecord> = HashMap::new();
    for r in cached {
        by_date.insert(r.date, r);
    }
    for r in fetched {
        by_date.insert(r.date, r);
    }
    let mut out: Vec<HistoricalRecord> = by_date.into_values().collect();
    out.sort_by_key(|r| r.date);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::HistoricalStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use vnquote_market_data::testing::FakeProvider;

    /// An in-memory `HistoricalStore` fake, good enough for this
    /// module's tests without depending on `vnquote-storage-sqlite`.
    #[derive(Default)]
    struct InMemoryStore {
        rows: StdMutex<HashMap<(String, NaiveDate), HistoricalRecord>>,
    }

    #[async_trait]
    impl HistoricalStore for InMemoryStore {
        async fn store(&self, records: &[HistoricalRecord]) -> CoreResult<()> {
            let mut rows = self.rows.lock().unwrap();
            for r in records {
                rows.insert((r.symbol.clone(), r.date), r.clone());
            }
            Ok(())
        }

        async fn cached_dates_in_range(
            &self,
            symbol: &str,
            _asset_type: AssetType,
            start: NaiveDate,
            end: NaiveDate,
        ) -> CoreResult<HashSet<NaiveDate>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|r| r.symbol == symbol && r.date >= start && r.date <= end && !r.is_placeholder())
                .map(|r| r.date)
                .collect())
        }

        async fn cached_records_in_range(
            &self,
            symbol: &str,
            _asset_type: AssetType,
            start: NaiveDate,
            end: NaiveDate,
        ) -> CoreResult<Vec<HistoricalRecord>> {
            let rows = self.rows.lock().unwrap();
            let mut out: Vec<HistoricalRecord> = rows
                .values()
                .filter(|r| r.symbol == symbol && r.date >= start && r.date <= end && !r.is_placeholder())
                .cloned()
                .collect();
            out.sort_by_key(|r| r.date);
            Ok(out)
        }

        async fn most_recent_record(
            &self,
            symbol: &str,
            _asset_type: AssetType,
            lookback_days: i64,
            as_of: NaiveDate,
        ) -> CoreResult<Option<HistoricalRecord>> {
            let floor = as_of - chrono::Duration::days(lookback_days);
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|r| r.symbol == symbol && r.date >= floor && r.date <= as_of && !r.is_placeholder())
                .max_by_key(|r| r.date)
                .cloned())
        }

        async fn mark_fetched(
            &self,
            symbol: &str,
            asset_type: AssetType,
            start: NaiveDate,
            end: NaiveDate,
            policy: &dyn AssetCachePolicy,
            now: DateTime<Utc>,
        ) -> CoreResult<usize> {
            let cached = self.cached_dates_in_range(symbol, asset_type, start, end).await?;
            let missing: Vec<NaiveDate> = planner::enumerate_dates(start, end).into_iter().filter(|d| !cached.contains(d)).collect();
            let placeholders = policy.mark_fetched(symbol, asset_type, &missing, now);
            let count = placeholders.len();
            let mut rows = self.rows.lock().unwrap();
            for r in placeholders {
                rows.entry((r.symbol.clone(), r.date)).or_insert(r);
            }
            Ok(count)
        }

        async fn delete_placeholders_older_than(&self, _before: DateTime<Utc>) -> CoreResult<usize> {
            Ok(0)
        }
    }

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn service(provider: Arc<FakeProvider>) -> HistoricalService {
        HistoricalService::new(
            Arc::new(InMemoryStore::default()),
            provider,
            Arc::new(RateLimiter::new(crate::rate_limiter::RateLimiterConfig {
                max_per_minute: 1000,
                max_per_hour: 10000,
                min_interval_ms: 0,
                max_queue: 10,
                enabled: true,
            })),
            None,
            Arc::new(FixedClock(today())),
            HistoricalServiceConfig::default(),
        )
    }

    #[tokio::test]
    async fn cold_history_fetches_all_weekdays_and_normalizes_stock_prices() {
        let provider = Arc::new(FakeProvider::new());
        for (day, close) in [(29, 125), (30, 126)] {
            provider.seed_history(
                "VNM",
                RawQuoteRow {
                    date: d(2025, 9, day),
                    close: Some(Decimal::from(close)),
                    ..Default::default()
                },
            );
        }
        for (day, close) in [(1, 127), (2, 128), (3, 129)] {
            provider.seed_history(
                "VNM",
                RawQuoteRow {
                    date: d(2025, 10, day),
                    close: Some(Decimal::from(close)),
                    ..Default::default()
                },
            );
        }
        let svc = service(provider);
        let records = svc
            .get_history("VNM", AssetType::Stock, d(2025, 9, 29), d(2025, 10, 3), Some(false))
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].close, Some(dec!(125000)));
        assert_eq!(records[4].close, Some(dec!(129000)));
    }

    #[tokio::test]
    async fn partial_hit_only_fetches_the_gap() {
        let provider = Arc::new(FakeProvider::new());
        for (day, close) in [(1, 127), (2, 128), (3, 129)] {
            provider.seed_history(
                "VNM",
                RawQuoteRow {
                    date: d(2025, 10, day),
                    close: Some(Decimal::from(close)),
                    ..Default::default()
                },
            );
        }
        let svc = service(provider.clone());
        svc.store
            .store(&[
                HistoricalRecord {
                    close: Some(dec!(125000)),
                    ..HistoricalRecord::placeholder("VNM", AssetType::Stock, d(2025, 9, 29), today())
                },
                HistoricalRecord {
                    close: Some(dec!(126000)),
                    ..HistoricalRecord::placeholder("VNM", AssetType::Stock, d(2025, 9, 30), today())
                },
            ])
            .await
            .unwrap();

        let records = svc
            .get_history("VNM", AssetType::Stock, d(2025, 9, 29), d(2025, 10, 3), Some(false))
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(provider.history_call_count(), 1);
    }

    #[tokio::test]
    async fn gold_chi_conversion_divides_monetary_fields_by_ten() {
        let svc = service(Arc::new(FakeProvider::new()));
        svc.store
            .store(&[HistoricalRecord {
                buy_price: Some(dec!(80_000_000)),
                sell_price: Some(dec!(82_000_000)),
                close: Some(dec!(82_000_000)),
                ..HistoricalRecord::placeholder("VN.GOLD", AssetType::Gold, d(2025, 10, 1), today())
            }])
            .await
            .unwrap();

        let records = svc
            .get_history("VN.GOLD.C", AssetType::Gold, d(2025, 10, 1), d(2025, 10, 1), Some(false))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].buy_price, Some(dec!(8_000_000)));
        assert_eq!(records[0].sell_price, Some(dec!(8_200_000)));
        assert_eq!(records[0].close, Some(dec!(8_200_000)));
        assert_eq!(records[0].symbol, "VN.GOLD.C");
    }

    #[tokio::test]
    async fn start_after_end_is_invalid_input() {
        let svc = service(Arc::new(FakeProvider::new()));
        let err = svc
            .get_history("VNM", AssetType::Stock, d(2025, 10, 3), d(2025, 10, 1), Some(false))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
