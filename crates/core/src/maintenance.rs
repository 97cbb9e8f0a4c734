//! §4.11 Background Maintenance: periodic expiry sweeps, listing/quote
//! refresh, and per-IP rate-limiter cleanup, all cooperatively
//! cancellable. Grounded on the teacher's `apps/server/src/scheduler.rs`
//! tokio-interval-loop pattern.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::interval;

use crate::quote_service::QuoteService;
use crate::rate_limiter::PerIpRateLimiter;
use crate::search_service::SearchService;
use crate::seeder::Seeder;
use crate::store::{HistoricalStore, PersistentQuoteCache};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);
const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
const IP_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A curated set of quotes refreshed every hour regardless of traffic,
/// so popular symbols stay warm (spec.md §4.11).
pub const POPULAR_SYMBOLS: &[(&str, vnquote_market_data::AssetType)] = &[
    ("VNINDEX", vnquote_market_data::AssetType::Index),
    ("VNM", vnquote_market_data::AssetType::Stock),
    ("VN.GOLD", vnquote_market_data::AssetType::Gold),
];

pub struct MaintenanceScheduler {
    persistent_quote_cache: Arc<dyn PersistentQuoteCache>,
    store: Arc<dyn HistoricalStore>,
    per_ip_limiter: Arc<PerIpRateLimiter>,
    seeder: Arc<Seeder>,
    quotes: Arc<QuoteService>,
    search: Arc<SearchService>,
    shutdown: Arc<AtomicBool>,
}

impl MaintenanceScheduler {
    pub fn new(
        persistent_quote_cache: Arc<dyn PersistentQuoteCache>,
        store: Arc<dyn HistoricalStore>,
        per_ip_limiter: Arc<PerIpRateLimiter>,
        seeder: Arc<Seeder>,
        quotes: Arc<QuoteService>,
        search: Arc<SearchService>,
    ) -> Self {
        Self {
            persistent_quote_cache,
            store,
            per_ip_limiter,
            seeder,
            quotes,
            search,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Spawns the three periodic loops. Each checks the shutdown flag
    /// between iterations and between ticks; none forcibly aborts
    /// in-flight work.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let sweep = self.clone();
        let refresh = self.clone();
        let ip_cleanup = self.clone();
        vec![
            tokio::spawn(async move { sweep.run_expiry_sweep_loop().await }),
            tokio::spawn(async move { refresh.run_listing_refresh_loop().await }),
            tokio::spawn(async move { ip_cleanup.run_ip_cleanup_loop().await }),
        ]
    }

    async fn run_expiry_sweep_loop(&self) {
        let mut ticker = interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if self.is_shutting_down() {
                return;
            }
            let quote_swept = self.quotes.cleanup_expired_cache();
            let search_swept = self.search.cleanup_expired_cache();
            info!(
                "maintenance: swept {quote_swept} expired quote / {search_swept} expired search memory-cache entries ({} quote / {} search entries remain)",
                self.quotes.cache_len(),
                self.search.cache_len()
            );
            let now = chrono::Utc::now();
            match self.persistent_quote_cache.delete_expired(now).await {
                Ok(n) => info!("maintenance: swept {n} expired persistent quote rows"),
                Err(err) => warn!("maintenance: persistent quote sweep failed: {err}"),
            }
            match self.store.delete_placeholders_older_than(now - chrono::Duration::days(90)).await {
                Ok(n) => info!("maintenance: swept {n} stale placeholder rows"),
                Err(err) => warn!("maintenance: placeholder sweep failed: {err}"),
            }
        }
    }

    async fn run_listing_refresh_loop(&self) {
        let mut ticker = interval(REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            if self.is_shutting_down() {
                return;
            }
            if let Err(err) = self.seeder.seed_if_needed(true).await {
                warn!("maintenance: listing refresh failed: {err}");
            }
            for (symbol, asset_type) in POPULAR_SYMBOLS {
                if let Err(err) = self.quotes.get_quote(symbol, *asset_type).await {
                    warn!("maintenance: popular-quote refresh failed for {symbol}: {err}");
                }
            }
        }
    }

    async fn run_ip_cleanup_loop(&self) {
        let mut ticker = interval(IP_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            if self.is_shutting_down() {
                return;
            }
            self.per_ip_limiter.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_flag_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let clone = flag.clone();
        flag.store(true, Ordering::SeqCst);
        assert!(clone.load(Ordering::SeqCst));
    }
}
