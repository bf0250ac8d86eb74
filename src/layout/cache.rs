//! Bounded memo table for offset lookups.
//!
//! Positions are cheap to recompute but are requested many times per frame
//! for the same handful of indices, so `OffsetIndex` memoizes them here.
//! Eviction is insertion-ordered; lookups do not promote entries.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

pub(crate) struct PositionCache<K: Hash + Eq + Copy, V: Copy> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Hash + Eq + Copy, V: Copy> PositionCache<K, V> {
    /// A capacity of 0 disables memoization entirely.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, key: K) -> Option<V> {
        self.entries.get(&key).copied()
    }

    /// Remember `value` for `key`, dropping the oldest entries past capacity.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key, value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Forget everything. Called synchronously on every override mutation.
    pub(crate) fn invalidate(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;

    #[test]
    fn test_remembers_positions() {
        let mut cache: PositionCache<i64, f64> = PositionCache::new(4);
        cache.insert(-3, -300.0);
        cache.insert(7, 700.0);
        assert_eq!(cache.get(-3), Some(-300.0));
        assert_eq!(cache.get(7), Some(700.0));
        assert_eq!(cache.get(8), None);
    }

    #[test]
    fn test_drops_oldest_past_capacity() {
        let mut cache: PositionCache<i64, f64> = PositionCache::new(2);
        cache.insert(1, 100.0);
        cache.insert(2, 200.0);
        cache.insert(3, 300.0);
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(3), Some(300.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_overwrites_without_growing() {
        let mut cache: PositionCache<i64, f64> = PositionCache::new(2);
        cache.insert(1, 100.0);
        cache.insert(1, 150.0);
        cache.insert(2, 200.0);
        assert_eq!(cache.get(1), Some(150.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let mut cache: PositionCache<i64, f64> = PositionCache::new(0);
        cache.insert(1, 100.0);
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn test_invalidate_clears() {
        let mut cache: PositionCache<u64, (i64, f64)> = PositionCache::new(8);
        cache.insert(5, (0, 0.0));
        cache.invalidate();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(5), None);
    }
}
