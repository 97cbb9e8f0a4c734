//! §4.3 Persistent Historical Store and its sibling persistence traits
//! (§3: `PersistentQuoteRow`, `SearchCacheEntry`, asset catalog). These
//! are the seams `vnquote-storage-sqlite` implements; grounded on the
//! teacher's `quotes::store::QuoteStore` trait split between a storage
//! trait and the service that calls it.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::CoreResult;
use crate::model::{Asset, HistoricalRecord, Quote, SearchHit};
use vnquote_market_data::AssetType;

/// The durable per-(symbol, asset_type, date) record table. Never
/// expires; writes are upserts keyed by the primary key.
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    async fn store(&self, records: &[HistoricalRecord]) -> CoreResult<()>;

    async fn cached_dates_in_range(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<HashSet<NaiveDate>>;

    /// Real records only, i.e. placeholders are filtered out. Ordered by
    /// date ascending.
    async fn cached_records_in_range(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<HistoricalRecord>>;

    /// The single most recent non-placeholder record within
    /// `lookback_days` of `as_of`.
    async fn most_recent_record(
        &self,
        symbol: &str,
        asset_type: AssetType,
        lookback_days: i64,
        as_of: NaiveDate,
    ) -> CoreResult<Option<HistoricalRecord>>;

    /// Policy-dependent: writes placeholder rows for every missing date
    /// in `[start, end]` using `policy`'s `mark_fetched`, and returns how
    /// many rows were written. Asset-specific (no-placeholder) policies
    /// return 0 without writing anything.
    async fn mark_fetched(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
        policy: &dyn crate::policy::AssetCachePolicy,
        now: DateTime<Utc>,
    ) -> CoreResult<usize>;

    /// Delete persisted records with `updated_at` older than `before` —
    /// used by Background Maintenance's quote-row sweep equivalent for
    /// whatever retention the deployment chooses. Historical records
    /// themselves never expire per spec.md §3; this exists for
    /// operational cleanup of abandoned placeholder rows only.
    async fn delete_placeholders_older_than(&self, before: DateTime<Utc>) -> CoreResult<usize>;
}

/// The persistent quote cache (`PersistentQuoteRow`, §3): survives
/// restarts, shared across workers, separate TTL from the in-memory
/// cache.
#[async_trait]
pub trait PersistentQuoteCache: Send + Sync {
    async fn get(&self, symbol: &str, asset_type: AssetType, now: DateTime<Utc>) -> CoreResult<Option<Quote>>;
    async fn put(&self, symbol: &str, asset_type: AssetType, quote: &Quote, expires_at: DateTime<Utc>) -> CoreResult<()>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<usize>;
}

/// The persistent search cache (`SearchCacheEntry`, §3).
#[async_trait]
pub trait PersistentSearchCache: Send + Sync {
    async fn get(&self, query: &str, now: DateTime<Utc>) -> CoreResult<Option<Vec<SearchHit>>>;
    async fn put(&self, query: &str, hits: &[SearchHit], expires_at: DateTime<Utc>) -> CoreResult<()>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> CoreResult<usize>;
}

/// The asset catalog: canonical identity rows populated by the Seeder
/// and by search/quote lookup side effects.
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    async fn upsert_many(&self, assets: &[Asset]) -> CoreResult<usize>;
    async fn get(&self, symbol: &str) -> CoreResult<Option<Asset>>;
    async fn search_by_text(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchHit>>;
    async fn count(&self) -> CoreResult<usize>;
}
