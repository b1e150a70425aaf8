//! Bounded cache of opened index handles.
//!
//! Opening an index means reading and decoding its whole snapshot, so
//! handles are cached per location. Each key owns a slot with its own mutex:
//! concurrent first access to one key opens the index once while other keys
//! proceed independently. Handles leaving the cache (eviction, invalidation,
//! flush) are passed to the disposer.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{QuarryError, Result};

/// Called with the key and handle of every entry leaving the cache.
pub type Disposer<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

struct Slot<V> {
    value: Mutex<Option<Arc<V>>>,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Slot {
            value: Mutex::new(None),
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cached entries.
    pub size: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that opened a handle.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

/// LRU cache of handles keyed by index location.
pub struct IndexCache<V> {
    entries: Mutex<LruCache<String, Arc<Slot<V>>>>,
    capacity: usize,
    disposer: Option<Disposer<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> std::fmt::Debug for IndexCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("size", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<V> IndexCache<V> {
    /// Create a cache holding at most `capacity` handles.
    pub fn new(capacity: usize) -> Result<Self> {
        let bound = NonZeroUsize::new(capacity)
            .ok_or_else(|| QuarryError::config("cache capacity must be positive"))?;
        Ok(IndexCache {
            entries: Mutex::new(LruCache::new(bound)),
            capacity,
            disposer: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Install the disposer.
    ///
    /// The disposer runs while cache locks are held and must not call back
    /// into the cache.
    pub fn with_disposer<F>(mut self, disposer: F) -> Self
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.disposer = Some(Arc::new(disposer));
        self
    }

    fn dispose(&self, key: &str, slot: &Slot<V>) {
        if let Some(value) = slot.value.lock().take() {
            debug!("disposing cached index handle {key}");
            if let Some(disposer) = &self.disposer {
                disposer(key, &value);
            }
        }
    }

    /// Cached handle for `key`, opening it with `open` on a miss.
    ///
    /// A failed open leaves the key uncached.
    pub fn get_or_open<F>(&self, key: &str, open: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let (slot, evicted) = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(slot) => (Arc::clone(slot), None),
                None => {
                    let slot = Arc::new(Slot::empty());
                    let evicted = entries.push(key.to_string(), Arc::clone(&slot));
                    (slot, evicted)
                }
            }
        };

        if let Some((evicted_key, evicted_slot)) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.dispose(&evicted_key, &evicted_slot);
        }

        let mut value = slot.value.lock();
        if let Some(handle) = value.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(handle));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        match open() {
            Ok(opened) => {
                let handle = Arc::new(opened);
                *value = Some(Arc::clone(&handle));
                debug!("opened index handle {key}");
                Ok(handle)
            }
            Err(e) => {
                drop(value);
                let mut entries = self.entries.lock();
                if entries.peek(key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                    entries.pop(key);
                }
                Err(e)
            }
        }
    }

    /// Cached handle without opening.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let slot = self.entries.lock().get(key).cloned()?;
        slot.value.lock().clone()
    }

    /// Drop and dispose one entry; true when it was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.lock().pop(key);
        match removed {
            Some(slot) => {
                self.dispose(key, &slot);
                true
            }
            None => false,
        }
    }

    /// Dispose every entry, then empty the cache.
    pub fn flush(&self) {
        let mut entries = self.entries.lock();
        for (key, slot) in entries.iter() {
            self.dispose(key, slot);
        }
        entries.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn disposed_log() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str, &String) + Send + Sync + 'static) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |key: &str, _: &String| sink.lock().push(key.to_string()))
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = IndexCache::new(2).unwrap();
        let first = cache.get_or_open("a", || Ok("A".to_string())).unwrap();
        let second = cache
            .get_or_open("a", || Err(QuarryError::index("should not open")))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn test_eviction_disposes_lru_entry() {
        let (log, disposer) = disposed_log();
        let cache = IndexCache::new(2).unwrap().with_disposer(disposer);

        cache.get_or_open("a", || Ok("A".to_string())).unwrap();
        cache.get_or_open("b", || Ok("B".to_string())).unwrap();
        cache.get_or_open("a", || Ok("A".to_string())).unwrap();
        cache.get_or_open("c", || Ok("C".to_string())).unwrap();

        assert_eq!(*log.lock(), vec!["b".to_string()]);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_flush_and_invalidate_dispose() {
        let (log, disposer) = disposed_log();
        let cache = IndexCache::new(4).unwrap().with_disposer(disposer);
        cache.get_or_open("a", || Ok("A".to_string())).unwrap();
        cache.get_or_open("b", || Ok("B".to_string())).unwrap();

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        cache.flush();

        assert!(cache.is_empty());
        let mut disposed = log.lock().clone();
        disposed.sort();
        assert_eq!(disposed, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_failed_open_is_not_cached() {
        let cache: IndexCache<String> = IndexCache::new(2).unwrap();
        assert!(cache.get_or_open("a", || Err(QuarryError::index("boom"))).is_err());
        assert!(cache.is_empty());
        assert!(IndexCache::<String>::new(0).is_err());
    }

    #[test]
    fn test_concurrent_first_access_opens_once() {
        let cache = Arc::new(IndexCache::new(4).unwrap());
        let opens = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let opens = Arc::clone(&opens);
                thread::spawn(move || {
                    cache
                        .get_or_open("shared", || {
                            opens.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(10));
                            Ok("handle".to_string())
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.join().unwrap(), "handle");
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }
}
