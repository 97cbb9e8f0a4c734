//! Core error taxonomy — the six kinds of spec.md §7. Grounded on the
//! teacher's `quotes::errors::MarketDataError`, which bridges a lower
//! crate's detailed error type into the domain's own taxonomy.

use thiserror::Error;
use vnquote_market_data::ProviderError;

#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Symbol unknown in the catalog, or no data in any fallback.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed date, empty query, future date, unknown gold symbol.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required dependency could not be initialized, or the provider
    /// path has exhausted retries.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Connection aborted, timeout, 5xx-equivalent. Recovered locally
    /// with backoff; only surfaces if every retry and fallback failed.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// Detected from provider response text; recovered locally by
    /// sleeping the parsed/default wait and retrying.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Unexpected failure. Logged with context upstream; never reveals
    /// internals to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => CoreError::TransientProvider(msg),
            ProviderError::RateLimited { retry_after_secs } => CoreError::RateLimited { retry_after_secs },
            ProviderError::Permanent(msg) => CoreError::NotFound(msg),
        }
    }
}
