//! §4.10 Data Seeder: startup/on-demand population of the asset catalog,
//! plus the standalone one-shot gold seeder. Grounded on the teacher's
//! provider listing → canonical-shape mapping pattern in
//! `quotes::mod::QuoteSyncService` (batched upsert, per-category error
//! isolation).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Datelike, NaiveDate};
use log::{info, warn};

use vnquote_market_data::{AssetType, MarketProvider, ProviderOutcome};

use crate::clock::Clock;
use crate::errors::CoreResult;
use crate::model::{Asset, HistoricalRecord};
use crate::store::{AssetCatalog, HistoricalStore};

const SEED_GATE_ROW_COUNT: usize = 100;
const UPSERT_BATCH_SIZE: usize = 100;

/// Indices the seeder always inserts regardless of what the provider's
/// listing returns (spec.md §4.10).
pub const CURATED_INDICES: &[&str] = &["VNINDEX", "VN30", "HNX", "HNX30", "UPCOM"];

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct SeedProgress {
    pub stocks: usize,
    pub funds: usize,
    pub indices: usize,
    pub gold: usize,
    pub errors: Vec<String>,
}

pub struct Seeder {
    catalog: Arc<dyn AssetCatalog>,
    provider: Arc<dyn MarketProvider>,
    progress: Arc<std::sync::Mutex<SeedProgress>>,
}

impl Seeder {
    pub fn new(catalog: Arc<dyn AssetCatalog>, provider: Arc<dyn MarketProvider>) -> Self {
        Self {
            catalog,
            provider,
            progress: Arc::new(std::sync::Mutex::new(SeedProgress::default())),
        }
    }

    pub fn progress(&self) -> SeedProgress {
        self.progress.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Runs the seed unless the catalog already holds more than
    /// [`SEED_GATE_ROW_COUNT`] rows, unless `force` is set.
    pub async fn seed_if_needed(&self, force: bool) -> CoreResult<SeedProgress> {
        if !force && self.catalog.count().await? > SEED_GATE_ROW_COUNT {
            info!("catalog already seeded, skipping (pass force=true to override)");
            return Ok(self.progress());
        }
        self.seed_all().await
    }

    pub async fn seed_all(&self) -> CoreResult<SeedProgress> {
        *self.progress.lock().unwrap_or_else(|p| p.into_inner()) = SeedProgress::default();

        let categories = [AssetType::Stock, AssetType::Fund, AssetType::Index, AssetType::Gold];
        for asset_type in categories {
            if let Err(err) = self.seed_category(asset_type).await {
                warn!("seeding {asset_type} failed: {err}");
                self.progress.lock().unwrap_or_else(|p| p.into_inner()).errors.push(format!("{asset_type}: {err}"));
            }
        }

        self.seed_curated_indices().await;
        Ok(self.progress())
    }

    async fn seed_category(&self, asset_type: AssetType) -> CoreResult<()> {
        let listing = match self.provider.fetch_listing(asset_type).await {
            ProviderOutcome::Ok(rows) => rows,
            ProviderOutcome::Empty => return Ok(()),
            ProviderOutcome::Err(err) => return Err(err.into()),
        };

        let assets: Vec<Asset> = listing
            .into_iter()
            .map(|d| {
                let mut asset = Asset::new(d.symbol, d.name, d.asset_type, d.data_source);
                asset.exchange = d.exchange;
                if let Some(currency) = d.currency {
                    asset.currency = currency;
                }
                asset
            })
            .collect();

        let mut inserted = 0usize;
        for batch in assets.chunks(UPSERT_BATCH_SIZE) {
            inserted += self.catalog.upsert_many(batch).await?;
        }

        let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        match asset_type {
            AssetType::Stock => progress.stocks += inserted,
            AssetType::Fund => progress.funds += inserted,
            AssetType::Index => progress.indices += inserted,
            AssetType::Gold => progress.gold += inserted,
        }
        Ok(())
    }

    async fn seed_curated_indices(&self) {
        let curated: Vec<Asset> = CURATED_INDICES
            .iter()
            .map(|sym| Asset::new(*sym, *sym, AssetType::Index, "CURATED"))
            .collect();
        if let Err(err) = self.catalog.upsert_many(&curated).await {
            warn!("failed to insert curated indices: {err}");
        }
    }
}

/// §4.10's standalone one-shot gold seeder: walks weekday-by-weekday from
/// `start` to `today`, fetching each date's spot via
/// `fetch_gold_spot_by_date`, resuming from the max stored date on
/// restart. Bulk infrastructure, invoked on demand, not on the read path.
pub struct GoldSeeder {
    store: Arc<dyn HistoricalStore>,
    provider: Arc<dyn MarketProvider>,
    clock: Arc<dyn Clock>,
    rows_written: AtomicUsize,
}

impl GoldSeeder {
    pub fn new(store: Arc<dyn HistoricalStore>, provider: Arc<dyn MarketProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            provider,
            clock,
            rows_written: AtomicUsize::new(0),
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Resumes from the day after the latest stored gold record, or
    /// `default_start` if nothing is stored yet.
    pub async fn run(&self, default_start: NaiveDate) -> CoreResult<usize> {
        let today = self.clock.today();
        let resume_from = self
            .store
            .most_recent_record(vnquote_market_data::sjc::GOLD_BASE_SYMBOL, AssetType::Gold, 3650, today)
            .await?
            .map(|r| r.date + chrono::Duration::days(1))
            .unwrap_or(default_start);

        let mut written = 0usize;
        let mut date = resume_from;
        while date <= today {
            if !matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
                match self.provider.fetch_gold_spot_by_date(date).await {
                    ProviderOutcome::Ok(row) => {
                        let mut record = HistoricalRecord {
                            symbol: vnquote_market_data::sjc::GOLD_BASE_SYMBOL.to_string(),
                            asset_type: AssetType::Gold,
                            date: row.date,
                            open: row.open,
                            high: row.high,
                            low: row.low,
                            close: row.close,
                            adjclose: None,
                            volume: row.volume,
                            nav: None,
                            buy_price: row.buy_price,
                            sell_price: row.sell_price,
                            data_json: row.data_json,
                            updated_at: self.clock.now(),
                        };
                        record.normalize();
                        self.store.store(&[record]).await?;
                        written += 1;
                        self.rows_written.fetch_add(1, Ordering::Relaxed);
                    }
                    ProviderOutcome::Empty => {}
                    ProviderOutcome::Err(err) => warn!("gold seed failed for {date}: {err}"),
                }
            }
            date += chrono::Duration::days(1);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::collections::{HashMap as StdHashMap, HashSet};
    use std::sync::Mutex as StdMutex;
    use vnquote_market_data::testing::FakeProvider;
    use vnquote_market_data::RawAssetDescriptor;

    #[derive(Default)]
    struct InMemoryCatalog {
        rows: StdMutex<StdHashMap<String, Asset>>,
    }

    #[async_trait]
    impl AssetCatalog for InMemoryCatalog {
        async fn upsert_many(&self, assets: &[Asset]) -> CoreResult<usize> {
            let mut rows = self.rows.lock().unwrap();
            for a in assets {
                rows.insert(a.symbol.clone(), a.clone());
            }
            Ok(assets.len())
        }
        async fn get(&self, symbol: &str) -> CoreResult<Option<Asset>> {
            Ok(self.rows.lock().unwrap().get(symbol).cloned())
        }
        async fn search_by_text(&self, _query: &str, _limit: usize) -> CoreResult<Vec<crate::model::SearchHit>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> CoreResult<usize> {
            Ok(self.rows.lock().unwrap().len())
        }
    }

    #[derive(Default)]
    struct InMemoryStore {
        rows: StdMutex<StdHashMap<(String, NaiveDate), HistoricalRecord>>,
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
        async fn cached_dates_in_range(&self, _s: &str, _t: AssetType, _start: NaiveDate, _end: NaiveDate) -> CoreResult<HashSet<NaiveDate>> {
            Ok(HashSet::new())
        }
        async fn cached_records_in_range(&self, _s: &str, _t: AssetType, _start: NaiveDate, _end: NaiveDate) -> CoreResult<Vec<HistoricalRecord>> {
            Ok(Vec::new())
        }
        async fn most_recent_record(&self, symbol: &str, _t: AssetType, _lookback: i64, _as_of: NaiveDate) -> CoreResult<Option<HistoricalRecord>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.values().filter(|r| r.symbol == symbol).max_by_key(|r| r.date).cloned())
        }
        async fn mark_fetched(&self, _s: &str, _t: AssetType, _start: NaiveDate, _end: NaiveDate, _p: &dyn crate::policy::AssetCachePolicy, _now: DateTime<Utc>) -> CoreResult<usize> {
            Ok(0)
        }
        async fn delete_placeholders_older_than(&self, _before: DateTime<Utc>) -> CoreResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn seed_all_inserts_curated_indices_and_category_listings() {
        let provider = Arc::new(FakeProvider::new());
        provider.listings.lock().unwrap().insert(
            AssetType::Stock,
            vec![RawAssetDescriptor {
                symbol: "VNM".into(),
                name: "Vinamilk".into(),
                asset_type: AssetType::Stock,
                exchange: Some("HOSE".into()),
                currency: None,
                data_source: "FAKE".into(),
            }],
        );
        let catalog = Arc::new(InMemoryCatalog::default());
        let seeder = Seeder::new(catalog.clone(), provider);
        let progress = seeder.seed_all().await.unwrap();
        assert_eq!(progress.stocks, 1);
        assert!(catalog.get("VNINDEX").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn gold_seeder_resumes_from_max_stored_date() {
        let provider = Arc::new(FakeProvider::new());
        provider.seed_history(
            vnquote_market_data::sjc::GOLD_BASE_SYMBOL,
            vnquote_market_data::RawQuoteRow {
                date: NaiveDate::from_ymd_opt(2025, 10, 2).unwrap(),
                buy_price: Some(Decimal::from(80_000_000)),
                sell_price: Some(Decimal::from(82_000_000)),
                ..Default::default()
            },
        );
        let store: Arc<dyn HistoricalStore> = Arc::new(InMemoryStore::default());
        store
            .store(&[HistoricalRecord {
                close: Some(Decimal::from(81_000_000)),
                ..HistoricalRecord::placeholder(
                    vnquote_market_data::sjc::GOLD_BASE_SYMBOL,
                    AssetType::Gold,
                    NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
                    Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
                )
            }])
            .await
            .unwrap();

        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap()));
        let seeder = GoldSeeder::new(store, provider, clock);
        let written = seeder.run(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(seeder.rows_written(), 1);
    }
}
