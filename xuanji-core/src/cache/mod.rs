//! In-memory cache-aside layer.
//!
//! Entries are bounded by count with strict LRU eviction, and each entry also
//! carries an absolute TTL. Whichever limit is hit first removes the entry.
//! The cache is advisory: clearing it never affects correctness.
//!
//! Values are stored type-erased so one cache can serve every repository;
//! [`CacheLayer::get`] downcasts and treats a type mismatch as a miss.

mod key;

pub use key::{fingerprint, CacheKey, KeyScope};

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,
    /// TTL applied when `put` is called without one.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            default_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Cumulative counters plus current size.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub size: usize,
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    stats: CacheStats,
}

impl Inner {
    fn remove_matching(&mut self, pred: impl Fn(&CacheKey) -> bool) -> usize {
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.entries.pop(key);
        }
        doomed.len()
    }
}

/// Shared cache handle. Clones share the same entries.
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<Mutex<Inner>>,
    default_ttl: Duration,
}

impl CacheLayer {
    pub fn new(config: &CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(cap),
                stats: CacheStats::default(),
            })),
            default_ttl: config.default_ttl(),
        }
    }

    // Cached data is disposable, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a clone of the cached value, promoting the key to most recent.
    pub fn get<V>(&self, key: &CacheKey) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };
        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }

        let hit = inner
            .entries
            .get(key)
            .and_then(|entry| entry.value.downcast_ref::<V>().cloned());
        match hit {
            Some(value) => {
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Inserts or replaces `key`. At capacity the least recently used entry
    /// is evicted first. `ttl` of `None` uses the configured default.
    pub fn put<V>(&self, key: CacheKey, value: V, ttl: Option<Duration>)
    where
        V: Send + Sync + 'static,
    {
        let now = Instant::now();
        let entry = Entry {
            value: Arc::new(value),
            expires_at: now + ttl.unwrap_or(self.default_ttl),
        };

        let mut inner = self.lock();
        let replaced_key = key.clone();
        if let Some((old_key, _)) = inner.entries.push(key, entry) {
            if old_key != replaced_key {
                tracing::debug!(key = %old_key, "evicted least recently used cache entry");
                inner.stats.evictions += 1;
            }
        }
        inner.stats.insertions += 1;
    }

    /// Removes one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut inner = self.lock();
        let removed = inner.entries.pop(key).is_some();
        if removed {
            inner.stats.invalidations += 1;
        }
        removed
    }

    /// Removes the entry for one row plus every derived (list, page, count)
    /// entry of the same table, since any of them may embed the row.
    pub fn invalidate_entity(&self, table: &str, id: &str) -> usize {
        let mut inner = self.lock();
        let removed = inner.remove_matching(|k| {
            k.table() == table
                && match k.scope() {
                    KeyScope::Entity(entity_id) => entity_id == id,
                    KeyScope::Query(_) => true,
                }
        });
        inner.stats.invalidations += removed as u64;
        removed
    }

    /// Removes every entry belonging to `table`.
    pub fn invalidate_table(&self, table: &str) -> usize {
        let mut inner = self.lock();
        let removed = inner.remove_matching(|k| k.table() == table);
        inner.stats.invalidations += removed as u64;
        if removed > 0 {
            tracing::debug!(table, removed, "invalidated cached table");
        }
        removed
    }

    /// Drops entries past their TTL. Idempotent.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let doomed: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        inner.stats.expirations += doomed.len() as u64;
        doomed.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            size: inner.entries.len(),
            ..inner.stats
        }
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("stats", &self.stats())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
