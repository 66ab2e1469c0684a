//! Bounded caches keyed by structural hash.
//!
//! Eviction keeps the `bound - 1` newest entries so the entry about to be
//! inserted always fits. Ties on the creation instant are broken by insertion
//! order.

use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

/// Default number of live entries per cache.
pub const MAX_API_CACHED: usize = 3;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub created: Instant,
    seq: u64,
    pub value: T,
}

/// Hash-keyed map that never holds more than `bound` entries.
#[derive(Debug)]
pub struct BoundedCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    bound: usize,
    next_seq: u64,
}

impl<T> BoundedCache<T> {
    pub fn new(bound: usize) -> Self {
        Self { entries: HashMap::new(), bound: bound.max(1), next_seq: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Inserts (or replaces) `key`, evicting the oldest entries first when full.
    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.evict();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, CacheEntry { created: Instant::now(), seq, value });
    }

    /// If at or over the bound, keeps only the `bound - 1` newest entries.
    /// Returns the number of removed entries.
    pub fn evict(&mut self) -> usize {
        if self.entries.len() < self.bound {
            return 0;
        }
        let mut by_age: Vec<(Instant, u64, String)> =
            self.entries.iter().map(|(k, e)| (e.created, e.seq, k.clone())).collect();
        // newest first
        by_age.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        let stale: Vec<String> =
            by_age.into_iter().skip(self.bound - 1).map(|(_, _, k)| k).collect();
        for key in &stale {
            self.entries.remove(key);
        }
        stale.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for BoundedCache<T> {
    fn default() -> Self {
        Self::new(MAX_API_CACHED)
    }
}

/// A [`BoundedCache`] behind an async mutex.
///
/// The lock is held across the build future, so concurrent first callers for
/// the same key wait for one construction instead of racing.
#[derive(Debug)]
pub struct SharedCache<T> {
    inner: tokio::sync::Mutex<BoundedCache<T>>,
}

impl<T: Clone> SharedCache<T> {
    pub fn new(bound: usize) -> Self {
        Self { inner: tokio::sync::Mutex::new(BoundedCache::new(bound)) }
    }

    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, build: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut cache = self.inner.lock().await;
        if let Some(value) = cache.get(key) {
            return Ok(value.clone());
        }
        let value = build().await?;
        cache.insert(key, value.clone());
        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().await.contains_key(key)
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

impl<T: Clone> Default for SharedCache<T> {
    fn default() -> Self {
        Self::new(MAX_API_CACHED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_eviction_keeps_newest() {
        let mut cache = BoundedCache::new(3);
        for i in 0..8 {
            cache.insert(format!("k{}", i), i);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        for key in ["k5", "k6", "k7"] {
            assert!(cache.contains_key(key), "{} should survive", key);
        }
    }

    #[test]
    fn test_evict_frees_exactly_one_slot() {
        let mut cache = BoundedCache::new(3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.evict(), 0);
        cache.insert("c", 3);
        assert_eq!(cache.evict(), 1);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("b", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), Some(&3));
        assert_eq!(cache.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn test_concurrent_builds_are_coalesced() {
        let cache: Arc<SharedCache<usize>> = Arc::new(SharedCache::new(3));
        let builds = Arc::new(AtomicUsize::new(0));

        let build = |builds: Arc<AtomicUsize>| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, ()>(builds.fetch_add(1, Ordering::SeqCst) + 1)
        };

        let (a, b) = tokio::join!(
            cache.get_or_try_insert_with("key", || build(builds.clone())),
            cache.get_or_try_insert_with("key", || build(builds.clone())),
        );
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache: SharedCache<u8> = SharedCache::new(3);
        let err = cache.get_or_try_insert_with("k", || async { Err::<u8, _>("boom") }).await;
        assert_eq!(err, Err("boom"));
        assert!(!cache.contains_key("k").await);
        let ok = cache.get_or_try_insert_with("k", || async { Ok::<_, &str>(7) }).await;
        assert_eq!(ok, Ok(7));
    }
}
