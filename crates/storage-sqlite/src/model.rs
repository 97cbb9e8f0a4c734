//! Row <-> domain conversions. Decimals and dates are stored as `TEXT`
//! (mirroring the teacher's `QuoteDB`, which stores `rust_decimal::Decimal`
//! fields as strings to avoid floating-point round-off); JSON blobs use
//! `serde_json`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rusqlite::Row;

use vnquote_core::{Asset, AssetType, HistoricalRecord, Quote, SearchHit};

use crate::errors::StorageError;

pub fn asset_type_to_str(t: AssetType) -> &'static str {
    match t {
        AssetType::Stock => "STOCK",
        AssetType::Fund => "FUND",
        AssetType::Index => "INDEX",
        AssetType::Gold => "GOLD",
    }
}

pub fn asset_type_from_str(s: &str) -> Result<AssetType, StorageError> {
    match s {
        "STOCK" => Ok(AssetType::Stock),
        "FUND" => Ok(AssetType::Fund),
        "INDEX" => Ok(AssetType::Index),
        "GOLD" => Ok(AssetType::Gold),
        other => Err(StorageError::SerializationError(format!("unknown asset_type '{other}'"))),
    }
}

fn dec_to_opt_str(v: Option<Decimal>) -> Option<String> {
    v.map(|d| d.to_string())
}

fn opt_str_to_dec(s: Option<String>) -> Option<Decimal> {
    s.and_then(|s| Decimal::from_str(&s).ok())
}

pub fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let asset_type_str: String = row.get("asset_type")?;
    let asset_type = asset_type_from_str(&asset_type_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let metadata_json: Option<String> = row.get("metadata_json")?;
    Ok(Asset {
        symbol: row.get("symbol")?,
        name: row.get("name")?,
        asset_type,
        asset_class: row.get("asset_class")?,
        asset_sub_class: row.get("asset_sub_class")?,
        exchange: row.get("exchange")?,
        currency: row.get("currency")?,
        data_source: row.get("data_source")?,
        metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

pub fn historical_record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoricalRecord> {
    let asset_type_str: String = row.get("asset_type")?;
    let asset_type = asset_type_from_str(&asset_type_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let date_str: String = row.get("date")?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let updated_at_str: String = row.get("updated_at")?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let data_json: Option<String> = row.get("data_json")?;
    Ok(HistoricalRecord {
        symbol: row.get("symbol")?,
        asset_type,
        date,
        open: opt_str_to_dec(row.get("open")?),
        high: opt_str_to_dec(row.get("high")?),
        low: opt_str_to_dec(row.get("low")?),
        close: opt_str_to_dec(row.get("close")?),
        adjclose: opt_str_to_dec(row.get("adjclose")?),
        volume: opt_str_to_dec(row.get("volume")?),
        nav: opt_str_to_dec(row.get("nav")?),
        buy_price: opt_str_to_dec(row.get("buy_price")?),
        sell_price: opt_str_to_dec(row.get("sell_price")?),
        data_json: data_json.and_then(|s| serde_json::from_str(&s).ok()),
        updated_at,
    })
}

pub struct HistoricalRecordParams {
    pub symbol: String,
    pub asset_type: String,
    pub date: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub adjclose: Option<String>,
    pub volume: Option<String>,
    pub nav: Option<String>,
    pub buy_price: Option<String>,
    pub sell_price: Option<String>,
    pub data_json: Option<String>,
    pub updated_at: String,
}

impl From<&HistoricalRecord> for HistoricalRecordParams {
    fn from(r: &HistoricalRecord) -> Self {
        Self {
            symbol: r.symbol.clone(),
            asset_type: asset_type_to_str(r.asset_type).to_string(),
            date: r.date.format("%Y-%m-%d").to_string(),
            open: dec_to_opt_str(r.open),
            high: dec_to_opt_str(r.high),
            low: dec_to_opt_str(r.low),
            close: dec_to_opt_str(r.close),
            adjclose: dec_to_opt_str(r.adjclose),
            volume: dec_to_opt_str(r.volume),
            nav: dec_to_opt_str(r.nav),
            buy_price: dec_to_opt_str(r.buy_price),
            sell_price: dec_to_opt_str(r.sell_price),
            data_json: r.data_json.as_ref().map(|v| v.to_string()),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

pub fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<Quote> {
    let quote_json: String = row.get("quote_json")?;
    serde_json::from_str(&quote_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

pub fn search_hits_from_row(row: &Row<'_>) -> rusqlite::Result<Vec<SearchHit>> {
    let hits_json: String = row.get("hits_json")?;
    serde_json::from_str(&hits_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}
