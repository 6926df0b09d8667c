//! In-memory result cache
//!
//! Capacity-bounded LRU store whose entries additionally expire after a
//! fixed TTL. Safe for concurrent use without caller-side locking.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::{CacheStats, ResolvedVideo};

/// Store abstraction injected into [`VideoResolver`](crate::VideoResolver)
pub trait ResultCache: Send + Sync {
    /// Live entry for `key`; stale entries behave as absent
    fn get(&self, key: &str) -> Option<Vec<ResolvedVideo>>;

    /// Insert or replace the entry for `key`
    fn put(&self, key: &str, videos: Vec<ResolvedVideo>);

    /// Remove a single entry
    fn evict(&self, key: &str);

    /// Remove every entry
    fn clear(&self);

    /// Diagnostics over live entries
    fn stats(&self) -> CacheStats;
}

/// Source of "now" for TTL checks
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic TTL tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move time forward by `by`
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    videos: Vec<ResolvedVideo>,
    created_at: Instant,
}

/// LRU + TTL implementation of [`ResultCache`]
pub struct LruTtlCache<C: Clock = SystemClock> {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    clock: C,
}

impl LruTtlCache<SystemClock> {
    /// Create a cache using the system clock
    ///
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, SystemClock)
    }
}

impl<C: Clock> LruTtlCache<C> {
    pub fn with_clock(capacity: usize, ttl: Duration, clock: C) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    fn is_stale(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) >= self.ttl
    }

    /// Number of stored entries, including stale ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: Clock> ResultCache for LruTtlCache<C> {
    fn get(&self, key: &str) -> Option<Vec<ResolvedVideo>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let stale = match entries.get(key) {
            Some(entry) if !self.is_stale(entry, now) => return Some(entry.videos.clone()),
            Some(_) => true,
            None => false,
        };

        if stale {
            tracing::debug!(key, "dropping expired cache entry");
            entries.pop(key);
        }
        None
    }

    fn put(&self, key: &str, videos: Vec<ResolvedVideo>) {
        let entry = CacheEntry {
            videos,
            created_at: self.clock.now(),
        };
        if let Some((evicted, _)) = self.entries.lock().push(key.to_string(), entry)
            && evicted != key
        {
            tracing::debug!(key = %evicted, "evicted least recently used cache entry");
        }
    }

    fn evict(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| self.is_stale(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }

        let entry_count = entries.len();
        let (total_url_count, total_age) = entries.iter().fold(
            (0usize, 0f64),
            |(urls, age), (_, entry)| {
                (
                    urls + entry.videos.len(),
                    age + now.saturating_duration_since(entry.created_at).as_secs_f64(),
                )
            },
        );

        CacheStats {
            entry_count,
            total_url_count,
            average_age_seconds: if entry_count == 0 {
                0.0
            } else {
                total_age / entry_count as f64
            },
        }
    }
}
