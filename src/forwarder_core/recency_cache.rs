//! Bounded presence set of record digests with least-recently-used eviction.
//!
//! Recency is tracked with a monotonically increasing tick: `entries` maps a
//! digest to its last-use tick and `order` maps ticks back to digests, so the
//! oldest entry is always the first key of `order`.

use super::record::Digest;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Roughly 8MB of overhead per 64k entries.
pub const DEDUP_CACHE_ELEMENTS: usize = 65_536 * 10;

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<Digest, u64>,
    order: BTreeMap<u64, Digest>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, digest: &Digest) -> bool {
        let Some(old) = self.entries.get(digest).copied() else {
            return false;
        };
        let tick = self.next_tick();
        self.order.remove(&old);
        self.order.insert(tick, *digest);
        self.entries.insert(*digest, tick);
        true
    }
}

#[derive(Debug)]
pub struct RecencyCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl Default for RecencyCache {
    fn default() -> Self {
        Self::new(DEDUP_CACHE_ELEMENTS)
    }
}

impl RecencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        // The state is consistent after every method, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `digest` is cached, marking it as most recently used.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.lock().touch(digest)
    }

    /// Adds `digest`, evicting the least recently used entry when full.
    pub fn insert(&self, digest: Digest) {
        let mut state = self.lock();
        if state.touch(&digest) {
            return;
        }

        let tick = state.next_tick();
        state.entries.insert(digest, tick);
        state.order.insert(tick, digest);

        while state.entries.len() > self.capacity {
            match state.order.pop_first() {
                Some((_, evicted)) => {
                    state.entries.remove(&evicted);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder_core::record::digest;

    #[test]
    fn test_evicts_least_recently_inserted() {
        let cache = RecencyCache::new(3);
        let [a, b, c, d] = [digest(b"a"), digest(b"b"), digest(b"c"), digest(b"d")];

        for key in [a, b, c, d] {
            cache.insert(key);
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&a), "a should have been evicted");
        assert!(cache.contains(&d));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let cache = RecencyCache::new(3);
        let [a, b, c, d] = [digest(b"a"), digest(b"b"), digest(b"c"), digest(b"d")];

        cache.insert(a);
        cache.insert(b);
        cache.insert(c);
        assert!(cache.contains(&a));
        cache.insert(d);

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b), "b was the least recently used");
    }

    #[test]
    fn test_reinsert_does_not_grow() {
        let cache = RecencyCache::new(2);
        cache.insert(digest(b"x"));
        cache.insert(digest(b"x"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = RecencyCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(digest(b"x"));
        assert!(cache.contains(&digest(b"x")));
    }

    #[test]
    fn test_concurrent_inserts() {
        let cache = std::sync::Arc::new(RecencyCache::new(1_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.insert(digest(format!("{}-{}", t, i).as_bytes()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
