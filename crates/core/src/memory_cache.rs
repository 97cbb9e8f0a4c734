//! §4.3 In-Process Memory Cache: a small bounded, TTL-aware cache used
//! for quotes, search results, and general lookups. Grounded on the
//! teacher's `registry::rate_limiter` mutex-map discipline, generalized
//! here into a generic LRU-ish store since the teacher has no direct
//! equivalent of this component.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::warn;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    hits: u64,
    misses: u64,
}

/// A bounded, TTL-expiring cache keyed by `String`. When insertion would
/// exceed `capacity`, the oldest 10% by last-access time is evicted
/// (spec.md §4.3's "evict the oldest 10% of entries" rule).
pub struct MemoryCache<V> {
    name: &'static str,
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        Self {
            name,
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("memory cache '{}' mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Returns the cached value if present and not expired. Expired
    /// entries are treated as a miss and removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let now = Instant::now();
        let expired = inner
            .entries
            .get(key)
            .map(|e| now.duration_since(e.inserted_at) > self.ttl)
            .unwrap_or(false);
        if expired {
            inner.entries.remove(key);
        }
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = now;
                inner.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        let mut inner = self.lock();
        let now = Instant::now();
        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key.clone().into()) {
            evict_oldest_tenth(&mut inner.entries);
        }
        inner.entries.insert(
            key.into(),
            Entry {
                value,
                inserted_at: now,
                last_accessed: now,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` counters for the admin stats endpoint.
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.lock();
        (inner.hits, inner.misses)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// §4.4/§4.11: sweep every entry whose TTL has elapsed and remove it,
    /// independent of access. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let ttl = self.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now.duration_since(entry.inserted_at) <= ttl);
        before - inner.entries.len()
    }
}

fn evict_oldest_tenth<V>(entries: &mut HashMap<String, Entry<V>>) {
    let evict_count = (entries.len() / 10).max(1);
    let mut by_access: Vec<(String, Instant)> = entries
        .iter()
        .map(|(k, e)| (k.clone(), e.last_accessed))
        .collect();
    by_access.sort_by_key(|(_, accessed)| *accessed);
    for (key, _) in by_access.into_iter().take(evict_count) {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache: MemoryCache<i32> = MemoryCache::new("test", 10, Duration::from_secs(60));
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        let (hits, misses) = cache.stats();
        assert_eq!((hits, misses), (1, 0));
    }

    #[test]
    fn missing_key_counts_as_miss() {
        let cache: MemoryCache<i32> = MemoryCache::new("test", 10, Duration::from_secs(60));
        assert_eq!(cache.get("missing"), None);
        let (hits, misses) = cache.stats();
        assert_eq!((hits, misses), (0, 1));
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let cache: MemoryCache<i32> = MemoryCache::new("test", 10, Duration::from_millis(10));
        cache.put("a", 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn over_capacity_evicts_oldest_tenth() {
        let cache: MemoryCache<i32> = MemoryCache::new("test", 10, Duration::from_secs(60));
        for i in 0..10 {
            cache.put(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 10);
        cache.put("k10", 10);
        assert!(cache.len() <= 10);
        assert_eq!(cache.get("k0"), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache: MemoryCache<i32> = MemoryCache::new("test", 10, Duration::from_secs(60));
        cache.put("a", 1);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn cleanup_expired_sweeps_stale_entries_without_being_accessed() {
        let cache: MemoryCache<i32> = MemoryCache::new("test", 10, Duration::from_millis(10));
        cache.put("stale", 1);
        std::thread::sleep(Duration::from_millis(30));
        cache.put("fresh", 2);
        let removed = cache.cleanup_expired();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }
}
