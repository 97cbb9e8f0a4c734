//! A fake [`crate::port::MarketProvider`] for use in `core`/`server`
//! tests. Records every call it receives so tests can assert on the
//! minimal-fetch behavior the planner/read-through service promise.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::errors::ProviderError;
use crate::models::{AssetType, RawAssetDescriptor, RawQuoteRow, RawSearchHit};
use crate::port::{HistoryOutcome, ListingOutcome, MarketProvider, ProviderOutcome, QuoteOutcome, SearchOutcome};

#[derive(Default)]
pub struct FakeProvider {
    /// Canned rows, keyed by (symbol, date).
    pub history_rows: Mutex<HashMap<(String, NaiveDate), RawQuoteRow>>,
    /// Canned latest quote, keyed by symbol.
    pub quotes: Mutex<HashMap<String, RawQuoteRow>>,
    /// Canned listings, keyed by asset type.
    pub listings: Mutex<HashMap<AssetType, Vec<RawAssetDescriptor>>>,
    /// If set, every `fetch_history` call fails with this instead.
    pub force_history_error: Mutex<Option<ProviderError>>,
    /// If set, every `fetch_quote` call fails with this instead.
    pub force_quote_error: Mutex<Option<ProviderError>>,
    /// Every `fetch_history` call made, as `(symbol, start, end)`.
    pub history_calls: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
    /// Every `fetch_quote` call made, as the symbol.
    pub quote_calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_history(&self, symbol: &str, row: RawQuoteRow) {
        self.history_rows
            .lock()
            .unwrap()
            .insert((symbol.to_string(), row.date), row);
    }

    pub fn seed_quote(&self, symbol: &str, row: RawQuoteRow) {
        self.quotes.lock().unwrap().insert(symbol.to_string(), row);
    }

    pub fn history_call_count(&self) -> usize {
        self.history_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MarketProvider for FakeProvider {
    fn id(&self) -> &'static str {
        "FAKE"
    }

    async fn fetch_quote(&self, symbol: &str, _asset_type: AssetType) -> QuoteOutcome {
        self.quote_calls.lock().unwrap().push(symbol.to_string());
        if let Some(err) = self.force_quote_error.lock().unwrap().clone() {
            return ProviderOutcome::Err(err);
        }
        match self.quotes.lock().unwrap().get(symbol) {
            Some(row) => ProviderOutcome::Ok(row.clone()),
            None => ProviderOutcome::Empty,
        }
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        _asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HistoryOutcome {
        self.history_calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), start, end));
        if let Some(err) = self.force_history_error.lock().unwrap().clone() {
            return ProviderOutcome::Err(err);
        }
        let rows = self.history_rows.lock().unwrap();
        let mut matched: Vec<RawQuoteRow> = rows
            .iter()
            .filter(|((sym, date), _)| sym == symbol && *date >= start && *date <= end)
            .map(|(_, row)| row.clone())
            .collect();
        matched.sort_by_key(|r| r.date);
        if matched.is_empty() {
            ProviderOutcome::Empty
        } else {
            ProviderOutcome::Ok(matched)
        }
    }

    async fn fetch_listing(&self, asset_type: AssetType) -> ListingOutcome {
        match self.listings.lock().unwrap().get(&asset_type) {
            Some(rows) if !rows.is_empty() => ProviderOutcome::Ok(rows.clone()),
            _ => ProviderOutcome::Empty,
        }
    }

    async fn fetch_gold_spot_by_date(&self, date: NaiveDate) -> QuoteOutcome {
        self.fetch_history(
            crate::sjc::GOLD_BASE_SYMBOL,
            AssetType::Gold,
            date,
            date,
        )
        .await
        .into_option()
        .and_then(|mut rows| rows.pop())
        .map(ProviderOutcome::Ok)
        .unwrap_or(ProviderOutcome::Empty)
    }

    async fn search(&self, query: &str) -> SearchOutcome {
        let upper = query.to_uppercase();
        let hits: Vec<RawSearchHit> = self
            .listings
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|a| a.symbol.contains(&upper) || a.name.to_uppercase().contains(&upper))
            .map(|a| RawSearchHit {
                symbol: a.symbol.clone(),
                name: a.name.clone(),
                asset_type: a.asset_type,
                exchange: a.exchange.clone(),
            })
            .collect();
        if hits.is_empty() {
            ProviderOutcome::Empty
        } else {
            ProviderOutcome::Ok(hits)
        }
    }
}
