//! Query Result Cache (C2): a bounded LRU with TTL over retrieval results,
//! invalidated per project.
//!
//! # Workload
//!
//! Retrieval (`ctx.get`, `mem.search`) vastly outnumbers mutation
//! (`mem.ingest`, `mem.fact.add`, `mem.ep.add`) in steady state, and the
//! same handful of queries tend to repeat within a session. A small
//! project-keyed LRU with a short TTL captures that locality cheaply: a
//! cache hit skips the C4/C5/C6 fanout and any embedding call entirely.
//!
//! Invalidation is **per project**, not global: a write to project A must
//! not evict project B's warm entries. We keep a secondary index from
//! `project_id` to the set of cache keys it contributed, so
//! [`QueryCache::invalidate_project`] only touches that project's rows.
//!
//! ```
//! use memory_core::cache::{CacheKey, QueryCache};
//!
//! let cache: QueryCache<String> = QueryCache::new();
//! let key = CacheKey::new("proj-abc12345", "what language?", 5);
//! assert!(cache.get(&key).is_none());
//! cache.put("proj-abc12345", key.clone(), "python".to_string());
//! assert_eq!(cache.get(&key).as_deref(), Some(&"python".to_string()));
//!
//! cache.invalidate_project("proj-abc12345");
//! assert!(cache.get(&key).is_none());
//! ```

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::RwLock;

use crate::constants::{DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL_SECONDS};

/// Deterministic key identifying one cacheable query. Two requests with the
/// same `(project_id, query, top_k)` collide to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: u64,
}

impl CacheKey {
    /// Build a key from the fields that determine a query's result set.
    #[must_use]
    pub fn new(project_id: &str, query: &str, top_k: usize) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(project_id.as_bytes());
        hasher.update(b"\u{1}");
        hasher.update(query.as_bytes());
        hasher.update(b"\u{1}");
        hasher.update(top_k.to_le_bytes());
        let digest = hasher.finalize();
        // Truncate to 64 bits; collision-resistant enough for an in-process
        // cache whose worst case on collision is an extra store round-trip.
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self {
            hash: u64::from_le_bytes(bytes),
        }
    }
}

struct Entry<T> {
    value: T,
    project_id: String,
    inserted_at: Instant,
}

/// Point-in-time hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheMetrics {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Entries evicted to make room for a new insert.
    pub evictions: u64,
    /// Entries removed by explicit or project invalidation.
    pub invalidations: u64,
}

impl CacheMetrics {
    /// Fraction of lookups that were hits, `0.0` if there have been none.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded LRU cache of query results, keyed by [`CacheKey`] and
/// invalidated per project.
pub struct QueryCache<T> {
    cache: RwLock<LruCache<CacheKey, Entry<T>>>,
    project_index: RwLock<HashMap<String, HashSet<CacheKey>>>,
    ttl: Duration,
    metrics: RwLock<CacheMetrics>,
}

impl<T: Clone> QueryCache<T> {
    /// Build a cache with the default capacity (500) and TTL (300s).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CACHE_MAX_SIZE, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Build a cache with an explicit capacity and TTL.
    #[must_use]
    pub fn with_capacity_and_ttl(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is nonzero"));
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            project_index: RwLock::new(HashMap::new()),
            ttl,
            metrics: RwLock::new(CacheMetrics::default()),
        }
    }

    /// Look up `key`, returning `None` on a miss or an expired entry. An
    /// expired entry found on lookup is removed immediately (lazy expiry).
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        let mut cache = self.cache.write();
        let Some(entry) = cache.peek(key) else {
            drop(cache);
            self.metrics.write().misses += 1;
            return None;
        };
        if entry.inserted_at.elapsed() > self.ttl {
            let project_id = entry.project_id.clone();
            cache.pop(key);
            drop(cache);
            self.forget_from_index(&project_id, key);
            self.metrics.write().misses += 1;
            return None;
        }
        let value = cache.get(key).map(|e| e.value.clone());
        drop(cache);
        let mut metrics = self.metrics.write();
        if value.is_some() {
            metrics.hits += 1;
        } else {
            metrics.misses += 1;
        }
        value
    }

    /// Insert or overwrite `key`'s value, attributing it to `project_id`
    /// for later [`QueryCache::invalidate_project`] calls.
    pub fn put(&self, project_id: &str, key: CacheKey, value: T) {
        let entry = Entry {
            value,
            project_id: project_id.to_string(),
            inserted_at: Instant::now(),
        };
        let evicted = self.cache.write().push(key.clone(), entry);
        if let Some((evicted_key, evicted_entry)) = evicted {
            if evicted_key != key {
                self.forget_from_index(&evicted_entry.project_id, &evicted_key);
                self.metrics.write().evictions += 1;
            }
        }
        self.project_index
            .write()
            .entry(project_id.to_string())
            .or_default()
            .insert(key);
    }

    /// Remove a single entry by key, if present.
    pub fn invalidate(&self, key: &CacheKey) {
        let Some(entry) = self.cache.write().pop(key) else {
            return;
        };
        self.forget_from_index(&entry.project_id, key);
        self.metrics.write().invalidations += 1;
    }

    /// Remove every entry attributed to `project_id`.
    pub fn invalidate_project(&self, project_id: &str) {
        let Some(keys) = self.project_index.write().remove(project_id) else {
            return;
        };
        let mut cache = self.cache.write();
        let mut removed = 0u64;
        for key in keys {
            if cache.pop(&key).is_some() {
                removed += 1;
            }
        }
        drop(cache);
        self.metrics.write().invalidations += removed;
    }

    /// Remove every entry in the cache, regardless of project.
    pub fn invalidate_all(&self) {
        let mut cache = self.cache.write();
        let removed = cache.len() as u64;
        cache.clear();
        drop(cache);
        self.project_index.write().clear();
        self.metrics.write().invalidations += removed;
    }

    /// Current point-in-time metrics.
    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.read()
    }

    /// Reset hit/miss/eviction/invalidation counters without touching
    /// stored entries.
    pub fn clear_metrics(&self) {
        *self.metrics.write() = CacheMetrics::default();
    }

    /// Number of entries currently stored, including any not-yet-expired
    /// ones whose TTL has technically elapsed but haven't been looked up.
    #[must_use]
    pub fn size(&self) -> usize {
        self.cache.read().len()
    }

    fn forget_from_index(&self, project_id: &str, key: &CacheKey) {
        let mut index = self.project_index.write();
        if let Some(keys) = index.get_mut(project_id) {
            keys.remove(key);
            if keys.is_empty() {
                index.remove(project_id);
            }
        }
    }
}

impl<T: Clone> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_set_within_ttl_returns_the_stored_value() {
        let cache: QueryCache<i32> = QueryCache::with_capacity_and_ttl(10, Duration::from_secs(60));
        let key = CacheKey::new("proj-abc12345", "q", 5);
        cache.put("proj-abc12345", key.clone(), 42);
        assert_eq!(cache.get(&key), Some(42));
        assert_eq!(cache.metrics().hits, 1);
    }

    #[test]
    fn miss_after_ttl_elapses() {
        let cache: QueryCache<i32> = QueryCache::with_capacity_and_ttl(10, Duration::from_millis(1));
        let key = CacheKey::new("proj-abc12345", "q", 5);
        cache.put("proj-abc12345", key.clone(), 42);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[test]
    fn lru_law_evicts_the_least_recently_used_entry() {
        let cache: QueryCache<i32> = QueryCache::with_capacity_and_ttl(2, Duration::from_secs(60));
        let k1 = CacheKey::new("proj-abc12345", "q1", 5);
        let k2 = CacheKey::new("proj-abc12345", "q2", 5);
        let k3 = CacheKey::new("proj-abc12345", "q3", 5);
        cache.put("proj-abc12345", k1.clone(), 1);
        cache.put("proj-abc12345", k2.clone(), 2);
        // touch k1 so k2 becomes the least recently used
        let _ = cache.get(&k1);
        cache.put("proj-abc12345", k3.clone(), 3);
        assert_eq!(cache.get(&k2), None);
        assert_eq!(cache.get(&k1), Some(1));
        assert_eq!(cache.get(&k3), Some(3));
    }

    #[test]
    fn invalidate_removes_only_the_named_key() {
        let cache: QueryCache<i32> = QueryCache::with_capacity_and_ttl(10, Duration::from_secs(60));
        let ka = CacheKey::new("proj-abc12345", "q1", 5);
        let kb = CacheKey::new("proj-abc12345", "q2", 5);
        cache.put("proj-abc12345", ka.clone(), 1);
        cache.put("proj-abc12345", kb.clone(), 2);
        cache.invalidate(&ka);
        assert_eq!(cache.get(&ka), None);
        assert_eq!(cache.get(&kb), Some(2));
    }

    #[test]
    fn invalidate_project_only_touches_that_project() {
        let cache: QueryCache<i32> = QueryCache::with_capacity_and_ttl(10, Duration::from_secs(60));
        let ka = CacheKey::new("proj-a-aaaaaaaa", "q", 5);
        let kb = CacheKey::new("proj-b-bbbbbbbb", "q", 5);
        cache.put("proj-a-aaaaaaaa", ka.clone(), 1);
        cache.put("proj-b-bbbbbbbb", kb.clone(), 2);
        cache.invalidate_project("proj-a-aaaaaaaa");
        assert_eq!(cache.get(&ka), None);
        assert_eq!(cache.get(&kb), Some(2));
    }

    #[test]
    fn isolation_same_query_text_different_project_different_key() {
        let ka = CacheKey::new("proj-a-aaaaaaaa", "same query", 5);
        let kb = CacheKey::new("proj-b-bbbbbbbb", "same query", 5);
        assert_ne!(ka, kb);
    }
}
