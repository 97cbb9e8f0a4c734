//! §4.9 Lazy Fetch Manager: background workers that backfill missing
//! ranges in small chunks after a partial cache hit. Grounded on the
//! teacher's `registry::rate_limiter` active-map discipline for the
//! concurrency shape, using `dashmap::DashMap` for the one genuinely
//! concurrent map this crate needs (see SPEC_FULL.md §4.9 note).

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use log::{debug, warn};
use tokio::task::JoinHandle;

use vnquote_market_data::{AssetType, MarketProvider, ProviderOutcome};

use crate::clock::Clock;
use crate::historical_service::LazyFetchTrigger;
use crate::model::{HistoricalRecord, TaskKey, TaskState};
use crate::planner;
use crate::policy::default_policy_for;
use crate::rate_limiter::RateLimiter;
use crate::store::HistoricalStore;

const GOLD_CHUNK_DAYS: i64 = 3;
const FUND_CHUNK_DAYS: i64 = 14;
const DEFAULT_CHUNK_DAYS: i64 = 14;
const WORKER_DELAY_FLOOR: Duration = Duration::from_secs(2);
const RATE_LIMIT_DELAY_CAP: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct TaskStatus {
    pub state: TaskState,
    pub total_chunks: usize,
    pub completed_chunks: usize,
}

pub struct LazyFetchManager {
    active: Arc<DashMap<TaskKey, TaskStatus>>,
    store: Arc<dyn HistoricalStore>,
    provider: Arc<dyn MarketProvider>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl LazyFetchManager {
    pub fn new(store: Arc<dyn HistoricalStore>, provider: Arc<dyn MarketProvider>, rate_limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            active: Arc::new(DashMap::new()),
            store,
            provider,
            rate_limiter,
            clock,
        }
    }

    /// If a task with this key is already active, drop the request.
    /// Otherwise insert it and spawn a detached worker. Returns the
    /// spawned handle for tests; production callers ignore it.
    pub fn trigger(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate) -> Option<JoinHandle<()>> {
        let key = TaskKey::new(symbol, start, end);
        let inserted = {
            use dashmap::mapref::entry::Entry;
            match self.active.entry(key.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(v) => {
                    v.insert(TaskStatus {
                        state: TaskState::Queued,
                        total_chunks: 0,
                        completed_chunks: 0,
                    });
                    true
                }
            }
        };
        if !inserted {
            debug!("lazy fetch task for {symbol} [{start},{end}] already active, dropping trigger");
            return None;
        }

        let active = self.active.clone();
        let store = self.store.clone();
        let provider = self.provider.clone();
        let rate_limiter = self.rate_limiter.clone();
        let clock = self.clock.clone();
        let symbol = symbol.to_uppercase();

        Some(tokio::spawn(async move {
            run_worker(active, store, provider, rate_limiter, clock, key, symbol, asset_type).await;
        }))
    }

    pub fn status(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Option<TaskStatus> {
        self.active.get(&TaskKey::new(symbol, start, end)).map(|r| r.clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl LazyFetchTrigger for LazyFetchManager {
    fn trigger(&self, symbol: &str, asset_type: AssetType, start: NaiveDate, end: NaiveDate) {
        LazyFetchManager::trigger(self, symbol, asset_type, start, end);
    }
}

fn chunk_days_for(asset_type: AssetType) -> i64 {
    match asset_type {
        AssetType::Gold => GOLD_CHUNK_DAYS,
        AssetType::Fund => FUND_CHUNK_DAYS,
        _ => DEFAULT_CHUNK_DAYS,
    }
}

fn partition_into_chunks(gap: planner::DateRange, chunk_days: i64) -> Vec<planner::DateRange> {
    let mut chunks = Vec::new();
    let mut start = gap.start;
    while start <= gap.end {
        let end = (start + chrono::Duration::days(chunk_days - 1)).min(gap.end);
        chunks.push(planner::DateRange::new(start, end));
        start = end + chrono::Duration::days(1);
    }
    chunks
}

/// Tier-based adaptive delay from recent call volume (spec.md §4.9),
/// with a 2s background-worker floor always enforced.
fn adaptive_delay(calls_last_minute: usize) -> Duration {
    let tiered = if calls_last_minute > 40 {
        Duration::from_secs(5)
    } else if calls_last_minute > 25 {
        Duration::from_secs(3)
    } else if calls_last_minute > 15 {
        Duration::from_secs(2)
    } else {
        Duration::from_secs(1)
    };
    tiered.max(WORKER_DELAY_FLOOR)
}

async fn run_worker(
    active: Arc<DashMap<TaskKey, TaskStatus>>,
    store: Arc<dyn HistoricalStore>,
    provider: Arc<dyn MarketProvider>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    key: TaskKey,
    symbol: String,
    asset_type: AssetType,
) {
    if let Some(mut status) = active.get_mut(&key) {
        status.state = TaskState::Running;
    }

    let cached_dates = match store.cached_dates_in_range(&symbol, asset_type, key.start, key.end).await {
        Ok(d) => d,
        Err(err) => {
            warn!("lazy fetch: failed to read cached dates for {symbol}: {err}");
            active.remove(&key);
            return;
        }
    };
    let gaps = planner::plan_gaps(key.start, key.end, &cached_dates);
    let chunk_days = chunk_days_for(asset_type);
    let chunks: Vec<planner::DateRange> = gaps.into_iter().flat_map(|g| partition_into_chunks(g, chunk_days)).collect();

    if let Some(mut status) = active.get_mut(&key) {
        status.total_chunks = chunks.len();
    }

    let mut extended_delay = WORKER_DELAY_FLOOR;
    let mut terminal_failure = false;

    for chunk in chunks {
        let result = fetch_chunk(&rate_limiter, &provider, &symbol, asset_type, chunk).await;
        match result {
            Ok(rows) if !rows.is_empty() => {
                let now = clock.now();
                let records: Vec<HistoricalRecord> = rows
                    .into_iter()
                    .map(|row| {
                        let mut r = HistoricalRecord {
                            symbol: symbol.clone(),
                            asset_type,
                            date: row.date,
                            open: row.open,
                            high: row.high,
                            low: row.low,
                            close: row.close,
                            adjclose: None,
                            volume: row.volume,
                            nav: row.nav,
                            buy_price: row.buy_price,
                            sell_price: row.sell_price,
                            data_json: row.data_json,
                            updated_at: now,
                        };
                        r.normalize();
                        r
                    })
                    .collect();
                if let Err(err) = store.store(&records).await {
                    warn!("lazy fetch: failed to store chunk for {symbol}: {err}");
                }
                let policy = default_policy_for(asset_type);
                let _ = store.mark_fetched(&symbol, asset_type, chunk.start, chunk.end, policy, now).await;
                extended_delay = WORKER_DELAY_FLOOR;
            }
            Ok(_) => {
                let policy = default_policy_for(asset_type);
                let _ = store.mark_fetched(&symbol, asset_type, chunk.start, chunk.end, policy, clock.now()).await;
            }
            Err(vnquote_market_data::ProviderError::RateLimited { .. }) => {
                extended_delay = (extended_delay * 2).min(RATE_LIMIT_DELAY_CAP);
            }
            Err(err) => {
                warn!("lazy fetch: terminal error fetching chunk for {symbol}: {err}");
                terminal_failure = true;
                break;
            }
        }

        if let Some(mut status) = active.get_mut(&key) {
            status.completed_chunks += 1;
        }

        let calls = rate_limiter.calls_in_last_minute();
        tokio::time::sleep(adaptive_delay(calls).max(extended_delay)).await;
    }

    if let Some(mut status) = active.get_mut(&key) {
        status.state = if terminal_failure { TaskState::Failed } else { TaskState::Completed };
    }
    active.remove(&key);
}

async fn fetch_chunk(
    rate_limiter: &RateLimiter,
    provider: &Arc<dyn MarketProvider>,
    symbol: &str,
    asset_type: AssetType,
    chunk: planner::DateRange,
) -> Result<Vec<vnquote_market_data::RawQuoteRow>, vnquote_market_data::ProviderError> {
    let provider = provider.clone();
    let symbol = symbol.to_string();
    rate_limiter
        .execute_with_retry(2, move || {
            let provider = provider.clone();
            let symbol = symbol.clone();
            async move {
                match provider.fetch_history(&symbol, asset_type, chunk.start, chunk.end).await {
                    ProviderOutcome::Ok(rows) => Ok(rows),
                    ProviderOutcome::Empty => Ok(Vec::new()),
                    ProviderOutcome::Err(e) => Err(e),
                }
            }
        })
        .await
}
