//! Bounded TTL cache for computed scores.

use crate::core::ArcClock;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    score: u8,
    inserted_at_ms: u64,
}

/// A score cache bounded in size and age.
///
/// - an entry older than the TTL is never returned;
/// - expired entries are purged on the next write;
/// - the cache never holds more than `max_size` entries; on overflow the
///   single oldest entry is evicted.
///
/// All operations take one mutex, so the bounds hold under concurrent use.
#[derive(Debug)]
pub struct ScoreCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl_ms: u64,
    max_size: usize,
    clock: ArcClock,
}

impl ScoreCache {
    /// Creates an empty cache. A `max_size` of zero is treated as one.
    pub fn new(max_size: usize, ttl: Duration, clock: ArcClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms: ttl.as_millis().min(u128::from(u64::MAX)) as u64,
            max_size: max_size.max(1),
            clock,
        }
    }

    /// Returns the cached score for `key`, if present and fresh.
    pub fn get(&self, key: &str) -> Option<u8> {
        let now = self.clock.now_ms();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let lookup = entries
            .get(key)
            .map(|entry| (self.is_fresh(entry, now), entry.score));
        match lookup {
            Some((true, score)) => Some(score),
            Some((false, _)) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a score.
    pub fn insert(&self, key: String, score: u8) {
        let now = self.clock.now_ms();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        entries.retain(|_, entry| self.is_fresh(entry, now));

        if !entries.contains_key(&key) {
            while entries.len() >= self.max_size {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at_ms)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                score,
                inserted_at_ms: now,
            },
        );
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Returns the size bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn is_fresh(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.inserted_at_ms) < self.ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use std::sync::Arc;

    fn cache(max_size: usize) -> (ScoreCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = ScoreCache::new(max_size, Duration::from_secs(60), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_get_after_insert() {
        let (cache, _) = cache(10);
        cache.insert("a".to_string(), 42);
        assert_eq!(cache.get("a"), Some(42));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_expired_entry_is_never_returned() {
        let (cache, clock) = cache(10);
        cache.insert("a".to_string(), 42);

        clock.advance(59_999);
        assert_eq!(cache.get("a"), Some(42));

        clock.advance(1);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_expired_entries_purged_on_write() {
        let (cache, clock) = cache(10);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        clock.advance(60_000);

        cache.insert("c".to_string(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_size_bound_evicts_oldest() {
        let (cache, clock) = cache(3);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.insert(key.to_string(), i as u8);
            clock.advance(10);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("d"), Some(3));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let (cache, _) = cache(2);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.insert("a".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_clear() {
        let (cache, _) = cache(2);
        cache.insert("a".to_string(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_respect_size_bound() {
        let (cache, clock) = cache(8);

        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = &cache;
                let clock = &clock;
                scope.spawn(move || {
                    for i in 0..200 {
                        cache.insert(format!("{}-{}", t, i), (i % 100) as u8);
                        if i % 10 == 0 {
                            clock.advance(1);
                        }
                        assert!(cache.len() <= cache.max_size());
                    }
                });
            }
        });

        assert!(cache.len() <= 8);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_concurrent_reads_never_see_expired_entries() {
        let (cache, clock) = cache(64);
        for i in 0..64 {
            cache.insert(format!("k{}", i), i as u8);
        }
        clock.advance(60_000);

        std::thread::scope(|scope| {
            for t in 0..4 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..64 {
                        assert_eq!(cache.get(&format!("k{}", i)), None);
                        cache.insert(format!("fresh-{}-{}", t, i), 1);
                    }
                });
            }
        });

        assert!(cache.len() <= 64);
        assert!((0..64).all(|i| cache.get(&format!("k{}", i)).is_none()));
    }

    #[test]
    fn test_zero_max_size_holds_one() {
        let (cache, _) = cache(0);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.max_size(), 1);
        assert_eq!(cache.len(), 1);
    }
}
