//! In-memory caching layer for slow external lookups
//!
//! Every cache in the service is a [`TtlCache`]: a bounded map whose
//! entries expire a fixed duration after insertion. Time is read from
//! `tokio::time::Instant` so tests can drive it with a paused clock.

use regex::Regex;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// Cached item with its insertion time
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    /// Monotonic insertion counter, breaks timestamp ties during eviction
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Point-in-time statistics, derived from the current contents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub name: String,
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// Share of stored entries that are still valid, in percent
    pub hit_rate: f64,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

/// Thread-safe cache with a fixed TTL and a max-entry bound.
///
/// Expired entries are never returned, even before a sweep removes them.
/// When an insertion would exceed `max_entries`, expired entries are purged
/// first and then the oldest remaining entries until there is room.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
    next_seq: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Get a value if present and not expired
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let cache = self.entries.read().ok()?;
        let entry = cache.get(key)?;

        if entry.is_expired(Instant::now(), self.ttl) {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Insert or refresh a value, resetting its timestamp
    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut cache) = self.entries.write() {
            let now = Instant::now();

            if !cache.contains_key(&key) && cache.len() >= self.max_entries {
                cache.retain(|_, entry| !entry.is_expired(now, self.ttl));

                while cache.len() >= self.max_entries {
                    let Some(oldest_key) = cache
                        .iter()
                        .min_by_key(|(_, e)| (e.inserted_at, e.seq))
                        .map(|(k, _)| k.clone())
                    else {
                        break;
                    };
                    cache.remove(&oldest_key);
                }
            }

            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            cache.insert(
                key,
                CacheEntry {
                    value,
                    inserted_at: now,
                    seq,
                },
            );
        }
    }

    /// Remove an entry before it expires (e.g. after the source changed)
    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .write()
            .map(|mut cache| cache.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Remove every entry whose key satisfies `predicate`
    pub fn invalidate_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        if let Ok(mut cache) = self.entries.write() {
            let before = cache.len();
            cache.retain(|k, _| !predicate(k));
            before - cache.len()
        } else {
            0
        }
    }

    /// Clear all expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        if let Ok(mut cache) = self.entries.write() {
            let now = Instant::now();
            let before = cache.len();
            cache.retain(|_, entry| !entry.is_expired(now, self.ttl));
            before - cache.len()
        } else {
            0
        }
    }

    /// Clear entire cache
    pub fn clear(&self) {
        if let Ok(mut cache) = self.entries.write() {
            cache.clear();
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (total, valid) = self
            .entries
            .read()
            .map(|cache| {
                let now = Instant::now();
                let valid = cache
                    .values()
                    .filter(|e| !e.is_expired(now, self.ttl))
                    .count();
                (cache.len(), valid)
            })
            .unwrap_or((0, 0));

        let hit_rate = if total == 0 {
            0.0
        } else {
            valid as f64 / total as f64 * 100.0
        };

        CacheStats {
            name: self.name.to_string(),
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
            hit_rate,
            max_entries: self.max_entries,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    /// Remove every key whose rendered form starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_where(|k| k.to_string().starts_with(prefix))
    }

    /// Remove every key whose rendered form matches `pattern`
    pub fn invalidate_matching(&self, pattern: &Regex) -> usize {
        self.invalidate_where(|k| pattern.is_match(&k.to_string()))
    }
}

/// Type-erased view of a cache for the operational admin surface
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &'static str;
    fn stats(&self) -> CacheStats;
    fn invalidate_matching(&self, pattern: &Regex) -> usize;
    fn cleanup(&self) -> usize;
    fn clear(&self);
}

impl<K, V> ManagedCache for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync,
    V: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        TtlCache::name(self)
    }

    fn stats(&self) -> CacheStats {
        TtlCache::stats(self)
    }

    fn invalidate_matching(&self, pattern: &Regex) -> usize {
        TtlCache::invalidate_matching(self, pattern)
    }

    fn cleanup(&self) -> usize {
        TtlCache::cleanup(self)
    }

    fn clear(&self) {
        TtlCache::clear(self)
    }
}
