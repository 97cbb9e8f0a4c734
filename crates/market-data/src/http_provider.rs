//! A real, network-backed [`MarketProvider`]. Grounded on the teacher's
//! `provider::yahoo::YahooProvider` (`reqwest::Client` held on the
//! struct, one JSON endpoint per capability, provider-native errors
//! mapped into the crate's own error type at the boundary).
//!
//! The upstream's actual wire format is out of this service's scope
//! (spec.md §1); this client instead expects a small JSON contract of
//! its own — one endpoint per [`MarketProvider`] method, each returning
//! (or wrapping) the crate's [`RawQuoteRow`]/[`RawAssetDescriptor`]/
//! [`RawSearchHit`] shapes directly. Point `base_url` at an adapter that
//! speaks this contract in front of the real vnstock/SJC sources.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};

use crate::errors::{parse_rate_limit, ProviderError};
use crate::models::{AssetType, RawAssetDescriptor, RawQuoteRow, RawSearchHit};
use crate::port::{HistoryOutcome, ListingOutcome, MarketProvider, ProviderOutcome, QuoteOutcome, SearchOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpMarketProvider {
    client: Client,
    base_url: String,
    id: &'static str,
}

impl HttpMarketProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            id: "VNSTOCK",
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::Transient(format!("request to {url} failed: {e}"))
            } else {
                ProviderError::Transient(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await.map_err(|e| ProviderError::Transient(e.to_string()))?;
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| ProviderError::Transient(format!("malformed response from {url}: {e}")))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                let body = response.text().await.unwrap_or_default();
                let retry_after_secs = parse_rate_limit(&body).unwrap_or(crate::errors::DEFAULT_RATE_LIMIT_WAIT_SECS);
                Err(ProviderError::RateLimited { retry_after_secs })
            }
            status if status.is_server_error() => Err(ProviderError::Transient(format!("{url} returned {status}"))),
            status => Err(ProviderError::Permanent(format!("{url} returned {status}"))),
        }
    }
}

#[async_trait]
impl MarketProvider for HttpMarketProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn fetch_quote(&self, symbol: &str, asset_type: AssetType) -> QuoteOutcome {
        let path = format!("/quote/{}?asset_type={}", symbol, asset_type.as_str());
        match self.get_json::<RawQuoteRow>(&path).await {
            Ok(Some(row)) => ProviderOutcome::Ok(row),
            Ok(None) => ProviderOutcome::Empty,
            Err(err) => ProviderOutcome::Err(err),
        }
    }

    async fn fetch_history(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate) -> HistoryOutcome {
        let path = format!(
            "/history/{}?asset_type={}&start={}&end={}",
            symbol,
            asset_type.as_str(),
            start,
            end
        );
        match self.get_json::<Vec<RawQuoteRow>>(&path).await {
            Ok(Some(rows)) if rows.is_empty() => ProviderOutcome::Empty,
            Ok(Some(rows)) => ProviderOutcome::Ok(rows),
            Ok(None) => ProviderOutcome::Empty,
            Err(err) => ProviderOutcome::Err(err),
        }
    }

    async fn fetch_listing(&self, asset_type: AssetType) -> ListingOutcome {
        let path = format!("/listing?asset_type={}", asset_type.as_str());
        match self.get_json::<Vec<RawAssetDescriptor>>(&path).await {
            Ok(Some(rows)) if rows.is_empty() => ProviderOutcome::Empty,
            Ok(Some(rows)) => ProviderOutcome::Ok(rows),
            Ok(None) => ProviderOutcome::Empty,
            Err(err) => ProviderOutcome::Err(err),
        }
    }

    async fn fetch_gold_spot_by_date(&self, date: NaiveDate) -> QuoteOutcome {
        let path = format!("/gold/spot/{date}");
        match self.get_json::<RawQuoteRow>(&path).await {
            Ok(Some(row)) => ProviderOutcome::Ok(row),
            Ok(None) => ProviderOutcome::Empty,
            Err(err) => ProviderOutcome::Err(err),
        }
    }

    async fn search(&self, query: &str) -> SearchOutcome {
        let path = format!("/search?query={}", urlencoding_lite(query));
        match self.get_json::<Vec<RawSearchHit>>(&path).await {
            Ok(Some(rows)) if rows.is_empty() => ProviderOutcome::Empty,
            Ok(Some(rows)) => ProviderOutcome::Ok(rows),
            Ok(None) => ProviderOutcome::Empty,
            Err(err) => ProviderOutcome::Err(err),
        }
    }
}

/// Minimal percent-encoding for query strings, avoiding a dependency on
/// a dedicated URL-encoding crate for this one call site.
fn urlencoding_lite(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoding_lite_escapes_spaces_and_unicode() {
        assert_eq!(urlencoding_lite("VNM"), "VNM");
        assert_eq!(urlencoding_lite("vn index"), "vn%20index");
        assert_eq!(urlencoding_lite("vàng"), "v%C3%A0ng");
    }

    #[test]
    fn new_builds_with_trimmed_base_url() {
        let provider = HttpMarketProvider::new("https://example.test/api/").unwrap();
        assert_eq!(provider.base_url, "https://example.test/api");
        assert_eq!(provider.id(), "VNSTOCK");
    }
}
