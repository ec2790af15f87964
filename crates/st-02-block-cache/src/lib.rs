//! # ST-02 Block Cache - Byte-budgeted LRU of verified content blocks.
//!
//! Lets single-block ("raw") requests short-circuit a full archive fetch.
//! Keys are canonical content identifiers, so entries are immutable once
//! cryptographically verified: there is no invalidation protocol, only
//! eviction for space. The bound is aggregate payload bytes, not entry
//! count.
//!
//! Safe for concurrent use from many request-handling tasks; callers never
//! take a lock themselves.

#![warn(clippy::all)]
#![deny(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Cache statistics for the operational probe.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub insertions: AtomicU64,
    pub evictions: AtomicU64,
}

struct Inner {
    entries: LruCache<String, Bytes>,
    total_bytes: usize,
}

/// Size-accounted, least-recently-used block cache.
pub struct BlockCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
    stats: CacheStats,
}

impl BlockCache {
    /// Create a cache bounded by `max_bytes` of aggregate payload.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            max_bytes,
            stats: CacheStats::default(),
        }
    }

    /// Look up a block by canonical identifier, refreshing its recency.
    pub fn get(&self, canonical_id: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        match inner.entries.get(canonical_id) {
            Some(block) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!(cid = canonical_id, "block cache hit");
                Some(block.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a verified block, evicting least-recently-used entries until
    /// the byte budget holds.
    ///
    /// A payload larger than the whole budget is refused outright rather
    /// than flushing every resident entry for a block that still cannot fit.
    pub fn put(&self, canonical_id: String, payload: Bytes) {
        if payload.len() > self.max_bytes {
            debug!(
                cid = %canonical_id,
                size = payload.len(),
                "refusing block larger than cache budget"
            );
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(previous) = inner.entries.put(canonical_id, payload.clone()) {
            inner.total_bytes -= previous.len();
        }
        inner.total_bytes += payload.len();
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);

        while inner.total_bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted_id, evicted)) => {
                    inner.total_bytes -= evicted.len();
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    trace!(cid = %evicted_id, "evicted block for space");
                }
                None => break,
            }
        }
    }

    /// Aggregate payload bytes currently resident.
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(byte: u8, len: usize) -> Bytes {
        Bytes::from(vec![byte; len])
    }

    #[test]
    fn get_miss_then_hit() {
        let cache = BlockCache::new(1024);
        assert!(cache.get("a").is_none());
        cache.put("a".to_string(), block(1, 10));
        assert_eq!(cache.get("a").unwrap(), block(1, 10));
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn evicts_by_aggregate_size_not_count() {
        let cache = BlockCache::new(100);
        cache.put("a".to_string(), block(1, 40));
        cache.put("b".to_string(), block(2, 40));
        cache.put("c".to_string(), block(3, 40));
        // "a" was least recently used
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.total_bytes() <= 100);
    }

    #[test]
    fn get_refreshes_recency() {
        let cache = BlockCache::new(100);
        cache.put("a".to_string(), block(1, 40));
        cache.put("b".to_string(), block(2, 40));
        // touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        cache.put("c".to_string(), block(3, 40));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn replacing_an_entry_does_not_double_count() {
        let cache = BlockCache::new(100);
        cache.put("a".to_string(), block(1, 60));
        cache.put("a".to_string(), block(2, 30));
        assert_eq!(cache.total_bytes(), 30);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oversized_payload_refused() {
        let cache = BlockCache::new(100);
        cache.put("small".to_string(), block(1, 50));
        cache.put("huge".to_string(), block(2, 101));
        assert!(cache.get("huge").is_none());
        // resident entries were not flushed for it
        assert!(cache.get("small").is_some());
    }

    #[test]
    fn concurrent_access_holds_budget() {
        use std::sync::Arc;
        let cache = Arc::new(BlockCache::new(10_000));
        let mut handles = Vec::new();
        for t in 0..8u8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..200usize {
                    cache.put(format!("{t}-{i}"), block(t, 100));
                    cache.get(&format!("{t}-{}", i / 2));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.total_bytes() <= 10_000);
    }

    proptest::proptest! {
        #[test]
        fn budget_never_exceeded(ops: Vec<(u8, u16)>) {
            let cache = BlockCache::new(500);
            for (key, len) in ops {
                cache.put(format!("k{key}"), block(key, len as usize % 600));
                proptest::prop_assert!(cache.total_bytes() <= 500);
            }
        }
    }
}
