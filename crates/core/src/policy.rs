//! §4.6 Asset Cache Policies: one strategy trait, `mark_fetched`, rather
//! than a class hierarchy per asset type (Design Notes redesign flag).
//! Grounded on the teacher's provider `capabilities.rs`/`traits.rs` split
//! between a shared behavior surface and a type-specific hook.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{AssetType, HistoricalRecord};

/// What a policy does when the Historical Read-Through Service asks it
/// to record that a window was attempted: either nothing (daily-traded
/// instruments, where an absent date just means "not a trading day"), or
/// zero-valued placeholder rows for every date not already present, so a
/// later planner run sees the window as covered.
pub trait AssetCachePolicy: Send + Sync {
    /// Given the dates in `[start, end]` that are still missing after a
    /// fetch attempt, return the placeholder records (if any) that
    /// should be upserted to suppress repeated attempts.
    fn mark_fetched(&self, symbol: &str, asset_type: AssetType, missing_dates: &[NaiveDate], now: DateTime<Utc>) -> Vec<HistoricalRecord>;
}

/// STOCK, FUND, INDEX, GOLD: absent dates stay absent. The planner will
/// simply re-evaluate them on the next request.
pub struct NoPlaceholderPolicy;

impl AssetCachePolicy for NoPlaceholderPolicy {
    fn mark_fetched(&self, _symbol: &str, _asset_type: AssetType, _missing_dates: &[NaiveDate], _now: DateTime<Utc>) -> Vec<HistoricalRecord> {
        Vec::new()
    }
}

/// The legacy shared policy: writes zero-valued placeholder rows for
/// every date still missing, so `cachedDatesInRange` treats the window
/// as covered on the next call.
pub struct LegacySharedPolicy;

impl AssetCachePolicy for LegacySharedPolicy {
    fn mark_fetched(&self, symbol: &str, asset_type: AssetType, missing_dates: &[NaiveDate], now: DateTime<Utc>) -> Vec<HistoricalRecord> {
        missing_dates
            .iter()
            .map(|&date| HistoricalRecord::placeholder(symbol, asset_type, date, now))
            .collect()
    }
}

/// Look up the policy for an asset type per spec.md §4.6: every current
/// asset type uses the no-placeholder behavior; the legacy policy exists
/// only for callers that explicitly ask for it (none do by default).
pub fn default_policy_for(_asset_type: AssetType) -> &'static dyn AssetCachePolicy {
    &NoPlaceholderPolicy
}
