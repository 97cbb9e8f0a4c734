//! Provider Port for the VN market data cache service.
//!
//! This crate defines the abstract outbound interface ([`port::MarketProvider`])
//! that the caching core in `vnquote-core` depends on, the provider error
//! taxonomy ([`errors::ProviderError`]) plus rate-limit text detection,
//! SJC gold symbol/unit helpers, and a fake provider for tests.
//!
//! Nothing in this crate knows about caching, TTLs, or planning — that's
//! `vnquote-core`. This crate only knows how to talk to (or fake talking
//! to) an upstream.

pub mod errors;
pub mod http_provider;
pub mod models;
pub mod port;
pub mod sjc;
pub mod testing;

pub use errors::{ProviderError, RetryClass};
pub use http_provider::HttpMarketProvider;
pub use models::{AssetType, RawAssetDescriptor, RawQuoteRow, RawSearchHit};
pub use port::{HistoryOutcome, ListingOutcome, MarketProvider, ProviderOutcome, QuoteOutcome, SearchOutcome};
