//! Bounded caches with LRU and TTL eviction
//!
//! Three variants back the orchestrator's conversation, agent-state and
//! vector-store maps: [`LruCache`] (size bound, least-recent eviction),
//! [`TtlCache`] (per-entry expiry with lazy deletion) and [`LruTtlCache`]
//! (both). Each cache serializes access under a single mutex; recency is
//! tracked with a monotonic sequence counter so eviction order is
//! deterministic even for back-to-back operations.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct LruEntry<V> {
    value: V,
    seq: u64,
}

struct LruInner<K, V> {
    entries: HashMap<K, LruEntry<V>>,
    next_seq: u64,
}

/// Size-bounded cache evicting the least recently used entry
pub struct LruCache<K, V> {
    max_size: usize,
    inner: Mutex<LruInner<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `max_size` entries
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Get a value, promoting the entry to most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let entry = inner.entries.get_mut(key)?;
        entry.seq = seq;
        Some(entry.value.clone())
    }

    /// Insert or update a value, promoting it and evicting the least
    /// recently used entry on overflow
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let is_new = !inner.entries.contains_key(&key);
        inner.entries.insert(key, LruEntry { value, seq });

        if is_new && inner.entries.len() > self.max_size {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone())
            {
                tracing::debug!("lru cache full, evicting least recently used entry");
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, unordered
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().entries.keys().cloned().collect()
    }
}

struct TtlEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Cache whose entries expire after a time-to-live
///
/// Expired entries are deleted lazily on `get`; `cleanup_expired` purges
/// the remainder in one O(n) sweep.
pub struct TtlCache<K, V> {
    default_ttl: Duration,
    inner: Mutex<HashMap<K, TtlEntry<V>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given default time-to-live
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Get a value if it has not expired; expired entries are removed
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert with the default TTL
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.inner.lock().insert(
            key,
            TtlEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Purge expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let before = inner.len();
        inner.retain(|_, entry| now < entry.expires_at);
        before - inner.len()
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct LruTtlEntry<V> {
    value: V,
    seq: u64,
    expires_at: Instant,
}

struct LruTtlInner<K, V> {
    entries: HashMap<K, LruTtlEntry<V>>,
    next_seq: u64,
}

/// Combined size- and time-bounded cache
///
/// `get` checks expiry first, then promotes; overflow evicts the least
/// recently used entry.
pub struct LruTtlCache<K, V> {
    max_size: usize,
    default_ttl: Duration,
    inner: Mutex<LruTtlInner<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruTtlCache<K, V> {
    /// Create a cache bounded by `max_size` entries and `default_ttl` age
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            inner: Mutex::new(LruTtlInner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Get a value if fresh, promoting it to most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        match inner.entries.get_mut(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                entry.seq = seq;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert with the default TTL
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL, evicting the least recently used entry
    /// on overflow
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let is_new = !inner.entries.contains_key(&key);
        inner.entries.insert(
            key,
            LruTtlEntry {
                value,
                seq,
                expires_at: Instant::now() + ttl,
            },
        );

        if is_new && inner.entries.len() > self.max_size {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Purge expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        before - inner.entries.len()
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, unordered
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_basic_operations() {
        let cache: LruCache<String, i32> = LruCache::new(10);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
        assert!(cache.remove(&"a".to_string()));
        assert!(!cache.remove(&"a".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let cache: LruCache<&str, i32> = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the eviction candidate
        cache.get(&"a");
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_lru_update_does_not_evict() {
        let cache: LruCache<&str, i32> = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_lru_size_never_exceeds_bound() {
        let cache: LruCache<u32, u32> = LruCache::new(100);
        for i in 0..1000 {
            cache.insert(i, i);
            assert!(cache.len() <= 100);
        }
        assert_eq!(cache.len(), 100);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_millis(40));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&"a"), None);
        // Lazy deletion removed the entry on get
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_ttl_cleanup_expired() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_millis(30));
        cache.insert("a", 1);
        cache.insert_with_ttl("b", 2, Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_lru_ttl_checks_expiry_before_promotion() {
        let cache: LruTtlCache<&str, i32> = LruTtlCache::new(10, Duration::from_millis(30));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_lru_ttl_eviction_at_capacity() {
        let cache: LruTtlCache<u32, u32> = LruTtlCache::new(3, Duration::from_secs(60));
        for i in 0..3 {
            cache.insert(i, i);
        }
        cache.get(&0);
        cache.insert(3, 3);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&0), Some(0));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn test_lru_ttl_cleanup_purges_all() {
        let cache: LruTtlCache<u32, u32> = LruTtlCache::new(1000, Duration::from_millis(20));
        for i in 0..50 {
            cache.insert(i, i);
        }
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.cleanup_expired(), 50);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let cache: Arc<LruCache<u32, u32>> = Arc::new(LruCache::new(64));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    cache.insert(t * 1000 + i, i);
                    cache.get(&(t * 1000 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 64);
    }
}
