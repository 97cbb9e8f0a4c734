//! Shared response shapes and small parsing helpers used by more than
//! one route module.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vnquote_core::{AssetType, CoreError, HistoricalRecord, Quote};

#[derive(Serialize)]
pub struct QuoteResponse {
    pub symbol: String,
    pub asset_type: AssetType,
    pub asset_class: String,
    pub asset_sub_class: String,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub adjclose: Option<Decimal>,
    pub volume: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_price: Option<Decimal>,
    pub currency: String,
    pub data_source: String,
}

impl From<Quote> for QuoteResponse {
    fn from(q: Quote) -> Self {
        let (asset_class, asset_sub_class) = q.asset_type.classification();
        Self {
            symbol: q.symbol,
            asset_type: q.asset_type,
            asset_class: asset_class.to_string(),
            asset_sub_class: asset_sub_class.to_string(),
            date: q.date,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            adjclose: q.adjclose,
            volume: q.volume,
            nav: q.nav,
            buy_price: q.buy_price,
            sell_price: q.sell_price,
            currency: q.currency,
            data_source: q.data_source,
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub symbol: String,
    pub history: Vec<HistoryRow>,
    pub asset_class: String,
    pub asset_sub_class: String,
    pub currency: String,
    pub data_source: String,
}

#[derive(Serialize)]
pub struct HistoryRow {
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub adjclose: Option<Decimal>,
    pub volume: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_price: Option<Decimal>,
}

impl From<&HistoricalRecord> for HistoryRow {
    fn from(r: &HistoricalRecord) -> Self {
        Self {
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
        }
    }
}

pub fn build_history_response(requested_symbol: &str, asset_type: AssetType, data_source: &str, records: &[HistoricalRecord]) -> HistoryResponse {
    let (asset_class, asset_sub_class) = asset_type.classification();
    HistoryResponse {
        symbol: requested_symbol.to_uppercase(),
        history: records.iter().map(HistoryRow::from).collect(),
        asset_class: asset_class.to_string(),
        asset_sub_class: asset_sub_class.to_string(),
        currency: vnquote_core::model::DEFAULT_CURRENCY.to_string(),
        data_source: data_source.to_string(),
    }
}

#[derive(Deserialize)]
pub struct HistoryRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Resolve the `[start, end]` window per spec.md §6: defaults to
/// `(today - 365, today)` when omitted, rejects malformed dates and
/// future end dates.
pub fn resolve_history_range(query: &HistoryRangeQuery, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), CoreError> {
    let start = match &query.start_date {
        Some(raw) => parse_date(raw)?,
        None => today - chrono::Duration::days(365),
    };
    let end = match &query.end_date {
        Some(raw) => parse_date(raw)?,
        None => today,
    };
    if end > today {
        return Err(CoreError::InvalidInput(format!("end_date {end} is in the future")));
    }
    Ok((start, end))
}

fn parse_date(raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| CoreError::InvalidInput(format!("malformed date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 3).unwrap()
    }

    #[test]
    fn defaults_to_trailing_year_window() {
        let (start, end) = resolve_history_range(&HistoryRangeQuery { start_date: None, end_date: None }, today()).unwrap();
        assert_eq!(end, today());
        assert_eq!(start, today() - chrono::Duration::days(365));
    }

    #[test]
    fn malformed_date_is_invalid_input() {
        let query = HistoryRangeQuery { start_date: Some("not-a-date".to_string()), end_date: None };
        assert!(matches!(resolve_history_range(&query, today()), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn future_end_date_is_invalid_input() {
        let query = HistoryRangeQuery { start_date: None, end_date: Some("2099-01-01".to_string()) };
        assert!(matches!(resolve_history_range(&query, today()), Err(CoreError::InvalidInput(_))));
    }
}
