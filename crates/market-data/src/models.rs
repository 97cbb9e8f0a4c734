//! Domain-agnostic wire shapes returned by a provider, plus the closed
//! asset-type classification table.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four asset classes this service fronts. Closed by design: adding a
/// fifth requires a code change, not a data migration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Stock,
    Fund,
    Index,
    Gold,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "STOCK",
            Self::Fund => "FUND",
            Self::Index => "INDEX",
            Self::Gold => "GOLD",
        }
    }

    /// (asset_class, asset_sub_class) is determined by asset_type via a
    /// fixed table; see DATA MODEL invariant in spec.md §3.
    pub fn classification(&self) -> (&'static str, &'static str) {
        match self {
            Self::Stock => ("EQUITY", "COMMON_STOCK"),
            Self::Fund => ("FUND", "MUTUAL_FUND"),
            Self::Index => ("INDEX", "MARKET_INDEX"),
            Self::Gold => ("COMMODITY", "PRECIOUS_METAL"),
        }
    }

    /// Gold and only gold trades/quotes on weekends in this system.
    pub fn trades_seven_days(&self) -> bool {
        matches!(self, Self::Gold)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STOCK" => Ok(Self::Stock),
            "FUND" => Ok(Self::Fund),
            "INDEX" => Ok(Self::Index),
            "GOLD" => Ok(Self::Gold),
            other => Err(format!("unknown asset type: {other}")),
        }
    }
}

/// A single day's worth of provider-reported fields. Every field is
/// optional because the populated subset depends on `AssetType`: stocks
/// and indices carry OHLCV; funds carry `nav`; gold carries
/// `buy_price`/`sell_price`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawQuoteRow {
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub nav: Option<Decimal>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    /// Verbatim provider payload for forward-compatible fields.
    pub data_json: Option<serde_json::Value>,
}

/// A provider-sourced asset descriptor returned from a listing call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawAssetDescriptor {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub data_source: String,
}

/// A single search hit as the provider reports it, pre-ranking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawSearchHit {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    pub exchange: Option<String>,
}
