//! Domain model: §3 of the spec. `Asset`, `HistoricalRecord`,
//! `Quote` (the canonical read-path payload), `SearchHit`, and the
//! `RangeFetchTask` state machine tracked by the lazy fetch manager.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use vnquote_market_data::AssetType;

pub const DEFAULT_CURRENCY: &str = "VND";

/// Canonical identity of a tradable instrument.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    pub asset_class: String,
    pub asset_sub_class: String,
    pub exchange: Option<String>,
    pub currency: String,
    pub data_source: String,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Asset {
    /// Build an `Asset`, deriving `asset_class`/`asset_sub_class` from
    /// `asset_type` per the fixed table invariant in spec.md §3.
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, asset_type: AssetType, data_source: impl Into<String>) -> Self {
        let (class, sub_class) = asset_type.classification();
        Self {
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            asset_type,
            asset_class: class.to_string(),
            asset_sub_class: sub_class.to_string(),
            exchange: None,
            currency: DEFAULT_CURRENCY.to_string(),
            data_source: data_source.into(),
            metadata: None,
        }
    }
}

/// An immutable point-in-time observation, keyed by (symbol, asset_type, date).
///
/// A record with every price field `None` or zero is a *placeholder*: it
/// exists only to prove the system already asked the provider for that
/// date. See [`HistoricalRecord::is_placeholder`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub symbol: String,
    pub asset_type: AssetType,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub adjclose: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub nav: Option<Decimal>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    /// Verbatim provider payload for forward-compatible fields.
    pub data_json: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl HistoricalRecord {
    pub fn placeholder(symbol: impl Into<String>, asset_type: AssetType, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            asset_type,
            date,
            open: None,
            high: None,
            low: None,
            close: None,
            adjclose: None,
            volume: None,
            nav: None,
            buy_price: None,
            sell_price: None,
            data_json: None,
            updated_at: now,
        }
    }

    /// True when every price field is either absent or zero — the
    /// placeholder definition from spec.md §3.
    pub fn is_placeholder(&self) -> bool {
        let zero_or_none = |v: &Option<Decimal>| v.is_none() || *v == Some(Decimal::ZERO);
        zero_or_none(&self.open)
            && zero_or_none(&self.high)
            && zero_or_none(&self.low)
            && zero_or_none(&self.close)
            && zero_or_none(&self.nav)
            && zero_or_none(&self.buy_price)
            && zero_or_none(&self.sell_price)
    }

    /// Apply the normalization rules of §4.7: stock/index prices arrive
    /// in thousands of VND (×1000); fund NAV is mirrored into `close`;
    /// gold `close` is derived as sell price if positive, else buy price.
    pub fn normalize(&mut self) {
        match self.asset_type {
            AssetType::Stock | AssetType::Index => {
                let scale = Decimal::from(1000);
                self.open = self.open.map(|v| v * scale);
                self.high = self.high.map(|v| v * scale);
                self.low = self.low.map(|v| v * scale);
                self.close = self.close.map(|v| v * scale);
                self.adjclose = self.close;
            }
            AssetType::Fund => {
                self.close = self.nav;
                self.adjclose = self.close;
            }
            AssetType::Gold => {
                let sell_positive = self.sell_price.map(|v| v > Decimal::ZERO).unwrap_or(false);
                self.close = if sell_positive { self.sell_price } else { self.buy_price };
                self.adjclose = self.close;
            }
        }
    }
}

/// The canonical read-path quote payload returned from the Quote Service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub asset_type: AssetType,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub adjclose: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub nav: Option<Decimal>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    pub currency: String,
    pub data_source: String,
    /// True if this quote came from a fallback path (most-recent
    /// historical record, or a historical read-through) rather than a
    /// live provider call.
    pub degraded: bool,
}

impl From<&HistoricalRecord> for Quote {
    fn from(r: &HistoricalRecord) -> Self {
        Self {
            symbol: r.symbol.clone(),
            asset_type: r.asset_type,
            date: r.date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            adjclose: r.adjclose,
            volume: r.volume,
            nav: r.nav,
            buy_price: r.buy_price,
            sell_price: r.sell_price,
            currency: DEFAULT_CURRENCY.to_string(),
            data_source: "CACHE".to_string(),
            degraded: true,
        }
    }
}

/// A ranked search result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    pub asset_class: String,
    pub asset_sub_class: String,
    pub exchange: Option<String>,
    pub currency: String,
    pub data_source: String,
}

/// Lazy fetch task state machine, keyed by (symbol, asset_type, start, end).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RangeFetchTask {
    pub symbol: String,
    pub asset_type: AssetType,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub state: TaskState,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// The key that identifies a lazy-fetch task and enforces the "at most
/// one active task per key" invariant.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TaskKey {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TaskKey {
    pub fn new(symbol: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            start,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 0).unwrap()
    }

    #[test]
    fn placeholder_detects_all_zero_or_none() {
        let r = HistoricalRecord::placeholder("VNM", AssetType::Stock, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), now());
        assert!(r.is_placeholder());
    }

    #[test]
    fn real_record_is_not_placeholder() {
        let mut r = HistoricalRecord::placeholder("VNM", AssetType::Stock, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), now());
        r.close = Some(dec!(125));
        assert!(!r.is_placeholder());
    }

    #[test]
    fn stock_normalization_multiplies_by_1000() {
        let mut r = HistoricalRecord::placeholder("VNM", AssetType::Stock, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), now());
        r.close = Some(dec!(125));
        r.normalize();
        assert_eq!(r.close, Some(dec!(125000)));
        assert_eq!(r.adjclose, Some(dec!(125000)));
    }

    #[test]
    fn fund_close_mirrors_nav() {
        let mut r = HistoricalRecord::placeholder("VESAF", AssetType::Fund, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), now());
        r.nav = Some(dec!(23456.78));
        r.normalize();
        assert_eq!(r.close, Some(dec!(23456.78)));
    }

    #[test]
    fn gold_close_prefers_sell_price() {
        let mut r = HistoricalRecord::placeholder("VN.GOLD", AssetType::Gold, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), now());
        r.buy_price = Some(dec!(80_000_000));
        r.sell_price = Some(dec!(82_000_000));
        r.normalize();
        assert_eq!(r.close, Some(dec!(82_000_000)));
    }

    #[test]
    fn gold_close_falls_back_to_buy_when_sell_zero() {
        let mut r = HistoricalRecord::placeholder("VN.GOLD", AssetType::Gold, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(), now());
        r.buy_price = Some(dec!(80_000_000));
        r.sell_price = Some(Decimal::ZERO);
        r.normalize();
        assert_eq!(r.close, Some(dec!(80_000_000)));
    }
}
