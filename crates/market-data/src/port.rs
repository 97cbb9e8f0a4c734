//! The Provider Port: the only way the rest of the system talks to a
//! remote market-data source. One real implementation per provider
//! (SJC for gold, a vnstock-like source for stocks/funds/indices);
//! [`crate::testing::FakeProvider`] substitutes for tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::ProviderError;
use crate::models::{AssetType, RawAssetDescriptor, RawQuoteRow, RawSearchHit};

/// Result of a single provider call. Distinguishes "got data" from
/// "asked and there legitimately is none" from the various failure
/// modes, so callers never have to guess what an empty `Vec` means.
#[derive(Debug, Clone)]
pub enum ProviderOutcome<T> {
    Ok(T),
    Empty,
    Err(ProviderError),
}

impl<T> ProviderOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }
}

pub type QuoteOutcome = ProviderOutcome<RawQuoteRow>;
pub type HistoryOutcome = ProviderOutcome<Vec<RawQuoteRow>>;
pub type ListingOutcome = ProviderOutcome<Vec<RawAssetDescriptor>>;
pub type SearchOutcome = ProviderOutcome<Vec<RawSearchHit>>;

/// Outbound capability the caching core depends on. Implement this trait
/// to add a new upstream; the core never depends on a concrete provider.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Unique identifier for logging / `data_source` stamping.
    fn id(&self) -> &'static str;

    /// Latest quote for `symbol`.
    async fn fetch_quote(&self, symbol: &str, asset_type: AssetType) -> QuoteOutcome;

    /// Rows for every date the provider has in `[start, end]` (inclusive).
    async fn fetch_history(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HistoryOutcome;

    /// Full listing of known instruments for one asset type.
    async fn fetch_listing(&self, asset_type: AssetType) -> ListingOutcome;

    /// One SJC gold spot row for a specific date. Gold-only; other asset
    /// types never call this.
    async fn fetch_gold_spot_by_date(&self, date: NaiveDate) -> QuoteOutcome;

    /// Free-text search, used by the Search Cache (§4.12). Default
    /// implementation degrades to an empty result: not every provider
    /// need support search.
    async fn search(&self, _query: &str) -> SearchOutcome {
        ProviderOutcome::Empty
    }
}
