//! §4.2 Rate Limiter: a global sliding-window limiter plus per-IP child
//! limiters. Grounded on the teacher's `registry::rate_limiter::RateLimiter`
//! for its concurrency shape (poison-recovering `std::sync::Mutex`,
//! `configure`/metrics methods) — the algorithm itself is sliding-window
//! timestamp queues, as spec.md §4.2 and §3 (`CallTimestamp log`) require,
//! not the teacher's token bucket.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use vnquote_market_data::ProviderError;

/// Configuration for a single rate limiter instance.
#[derive(Clone, Debug)]
pub struct RateLimiterConfig {
    pub max_per_minute: u32,
    pub max_per_hour: u32,
    pub min_interval_ms: u64,
    /// Currently unused (spec.md §4.2 notes it as reserved).
    pub max_queue: usize,
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 30,
            max_per_hour: 600,
            min_interval_ms: 250,
            max_queue: 100,
            enabled: true,
        }
    }
}

#[derive(Default)]
struct CallLog {
    minute_window: VecDeque<Instant>,
    hour_window: VecDeque<Instant>,
    last_call_time: Option<Instant>,
}

impl CallLog {
    /// Drop entries older than their respective windows. Invariant from
    /// spec.md §3: after each observation, the queues contain only
    /// entries within their window.
    fn clean(&mut self, now: Instant) {
        while let Some(&front) = self.minute_window.front() {
            if now.duration_since(front) > Duration::from_secs(60) {
                self.minute_window.pop_front();
            } else {
                break;
            }
        }
        while let Some(&front) = self.hour_window.front() {
            if now.duration_since(front) > Duration::from_secs(3600) {
                self.hour_window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter: one global instance, or one per tracked
/// IP (see [`PerIpRateLimiter`]).
pub struct RateLimiter {
    config: RateLimiterConfig,
    log: Mutex<CallLog>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            log: Mutex::new(CallLog::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallLog> {
        self.log.lock().unwrap_or_else(|poisoned| {
            warn!("rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// After cleaning entries older than their windows, true if either
    /// window is at capacity or the minimum inter-call interval hasn't
    /// elapsed.
    pub fn should_throttle(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let now = Instant::now();
        let mut log = self.lock();
        log.clean(now);

        if log.minute_window.len() as u32 >= self.config.max_per_minute {
            return true;
        }
        if log.hour_window.len() as u32 >= self.config.max_per_hour {
            return true;
        }
        if let Some(last) = log.last_call_time {
            if now.duration_since(last) < Duration::from_millis(self.config.min_interval_ms) {
                return true;
            }
        }
        false
    }

    /// Time until the oldest entry in the currently-saturated window
    /// expires, capped at 5s for a minute-cap trip or 60s for an
    /// hour-cap trip.
    fn backoff(&self) -> Duration {
        let now = Instant::now();
        let mut log = self.lock();
        log.clean(now);

        if log.minute_window.len() as u32 >= self.config.max_per_minute {
            if let Some(&oldest) = log.minute_window.front() {
                let remaining = Duration::from_secs(60).saturating_sub(now.duration_since(oldest));
                return remaining.min(Duration::from_secs(5));
            }
        }
        if log.hour_window.len() as u32 >= self.config.max_per_hour {
            if let Some(&oldest) = log.hour_window.front() {
                let remaining = Duration::from_secs(3600).saturating_sub(now.duration_since(oldest));
                return remaining.min(Duration::from_secs(60));
            }
        }
        if let Some(last) = log.last_call_time {
            let elapsed = now.duration_since(last);
            let min_interval = Duration::from_millis(self.config.min_interval_ms);
            if elapsed < min_interval {
                return min_interval - elapsed;
            }
        }
        Duration::from_millis(50)
    }

    /// Loop while throttled, sleeping the computed backoff each round.
    /// Returns `false` if `timeout` is exceeded before a slot opens.
    pub async fn wait_for_slot(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.should_throttle() {
            if Instant::now() >= deadline {
                return false;
            }
            let wait = self.backoff().min(deadline.saturating_duration_since(Instant::now()));
            debug!("rate limiter: waiting {:?} for a slot", wait);
            tokio::time::sleep(wait).await;
        }
        true
    }

    /// Record a call at `now` into both windows.
    pub fn record_call(&self) {
        let now = Instant::now();
        let mut log = self.lock();
        log.clean(now);
        log.minute_window.push_back(now);
        log.hour_window.push_back(now);
        log.last_call_time = Some(now);
    }

    /// Calls made within the live minute window right now (used by the
    /// lazy fetch manager's adaptive delay, §4.9).
    pub fn calls_in_last_minute(&self) -> usize {
        let now = Instant::now();
        let mut log = self.lock();
        log.clean(now);
        log.minute_window.len()
    }

    /// Wrap a provider call with rate-limit-aware retry: acquire a slot,
    /// invoke `f`, and on a rate-limited error, sleep the parsed
    /// retry-after (plus a small safety margin) and retry; on a generic
    /// transient failure, back off exponentially capped at 10s.
    pub async fn execute_with_retry<F, Fut, T>(&self, max_retries: u32, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            self.wait_for_slot(Duration::from_secs(60)).await;
            self.record_call();
            match f().await {
                Ok(v) => return Ok(v),
                Err(ProviderError::RateLimited { retry_after_secs }) => {
                    if attempt >= max_retries {
                        return Err(ProviderError::RateLimited { retry_after_secs });
                    }
                    let wait = Duration::from_secs(retry_after_secs) + Duration::from_millis(500);
                    debug!("provider rate limited us, sleeping {:?}", wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(ProviderError::Transient(msg)) => {
                    if attempt >= max_retries {
                        return Err(ProviderError::Transient(msg));
                    }
                    let backoff_secs = 2u64.saturating_pow(attempt).min(10);
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    attempt += 1;
                }
                Err(err @ ProviderError::Permanent(_)) => return Err(err),
            }
        }
    }
}

/// Keyed map of per-IP child limiters. The global limiter and the
/// caller's per-IP limiter are checked in series; both must permit a call.
pub struct PerIpRateLimiter {
    config: RateLimiterConfig,
    max_tracked_ips: usize,
    limiters: Mutex<HashMap<String, (RateLimiter, Instant)>>,
}

impl PerIpRateLimiter {
    pub fn new(config: RateLimiterConfig, max_tracked_ips: usize) -> Self {
        Self {
            config,
            max_tracked_ips,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (RateLimiter, Instant)>> {
        self.limiters.lock().unwrap_or_else(|poisoned| {
            warn!("per-IP rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// True if the per-IP limiter for `ip` would throttle a call right now.
    pub fn should_throttle(&self, ip: &str) -> bool {
        let mut limiters = self.lock();
        let now = Instant::now();
        let entry = limiters
            .entry(ip.to_string())
            .or_insert_with(|| (RateLimiter::new(self.config.clone()), now));
        entry.1 = now;
        entry.0.should_throttle()
    }

    pub fn record_call(&self, ip: &str) {
        let mut limiters = self.lock();
        let now = Instant::now();
        let entry = limiters
            .entry(ip.to_string())
            .or_insert_with(|| (RateLimiter::new(self.config.clone()), now));
        entry.1 = now;
        entry.0.record_call();
    }

    /// Remove IPs idle for more than an hour, and if the tracked set
    /// still exceeds `max_tracked_ips`, evict the oldest-by-last-call
    /// entries. Intended to run every 5 minutes from Background
    /// Maintenance.
    pub fn cleanup(&self) {
        let mut limiters = self.lock();
        let now = Instant::now();
        limiters.retain(|_, (_, last_seen)| now.duration_since(*last_seen) <= Duration::from_secs(3600));

        if limiters.len() > self.max_tracked_ips {
            let mut by_age: Vec<(String, Instant)> =
                limiters.iter().map(|(ip, (_, seen))| (ip.clone(), *seen)).collect();
            by_age.sort_by_key(|(_, seen)| *seen);
            let excess = limiters.len() - self.max_tracked_ips;
            for (ip, _) in by_age.into_iter().take(excess) {
                limiters.remove(&ip);
            }
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimiterConfig {
        RateLimiterConfig {
            max_per_minute: 3,
            max_per_hour: 1000,
            min_interval_ms: 0,
            max_queue: 10,
            enabled: true,
        }
    }

    #[test]
    fn throttles_after_max_per_minute_calls() {
        let limiter = RateLimiter::new(fast_config());
        for _ in 0..3 {
            assert!(!limiter.should_throttle());
            limiter.record_call();
        }
        assert!(limiter.should_throttle());
    }

    #[test]
    fn min_interval_throttles_rapid_calls() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_per_minute: 1000,
            max_per_hour: 1000,
            min_interval_ms: 10_000,
            max_queue: 10,
            enabled: true,
        });
        limiter.record_call();
        assert!(limiter.should_throttle());
    }

    #[test]
    fn disabled_limiter_never_throttles() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            enabled: false,
            ..fast_config()
        });
        for _ in 0..100 {
            limiter.record_call();
        }
        assert!(!limiter.should_throttle());
    }

    #[tokio::test]
    async fn wait_for_slot_times_out_when_never_free() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_per_minute: 1,
            max_per_hour: 1,
            min_interval_ms: 0,
            max_queue: 10,
            enabled: true,
        });
        limiter.record_call();
        let ok = limiter.wait_for_slot(Duration::from_millis(50)).await;
        assert!(!ok);
    }

    #[test]
    fn per_ip_limiters_are_isolated() {
        let per_ip = PerIpRateLimiter::new(fast_config(), 100);
        for _ in 0..3 {
            per_ip.record_call("1.1.1.1");
        }
        assert!(per_ip.should_throttle("1.1.1.1"));
        assert!(!per_ip.should_throttle("2.2.2.2"));
    }

    #[test]
    fn cleanup_evicts_over_capacity_by_oldest() {
        let per_ip = PerIpRateLimiter::new(fast_config(), 2);
        per_ip.record_call("a");
        per_ip.record_call("b");
        per_ip.record_call("c");
        per_ip.cleanup();
        assert_eq!(per_ip.tracked_count(), 2);
    }
}
