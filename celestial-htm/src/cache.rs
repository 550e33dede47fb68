//! Elastic LRU cache of per-trixel payloads.
//!
//! [`TrixelCache`] holds one [`CacheSlot`] per trixel of a mesh. Slots are
//! filled by the caller on a miss and evicted least-recently-used first when
//! [`prune`](TrixelCache::prune) runs, which a render loop typically does once
//! per frame:
//!
//! ```
//! use celestial_htm::TrixelCache;
//!
//! let mut cache: TrixelCache<Vec<u32>> = TrixelCache::new(512, 64).unwrap();
//! for trixel in [3usize, 17, 200] {
//!     // Hits and misses both go through `get_mut`, so visible trixels stay recent.
//!     let slot = cache.get_mut(trixel);
//!     if !slot.is_set() {
//!         slot.set(vec![trixel as u32]);
//!     }
//! }
//! cache.prune(0);
//! assert_eq!(cache.current_usage(), 3);
//! ```
//!
//! Recency is recorded on every mutable access ([`get_mut`](TrixelCache::get_mut)
//! or `cache[i]` in a mutable place), including accesses that only read the
//! slot. Shared access through `Index` is a peek and never refreshes a slot.
//!
//! When the ceiling equals the number of trixels the cache can never evict, so
//! it skips recency bookkeeping and behaves as a plain array.

use std::collections::{HashSet, VecDeque};
use std::ops::{Index, IndexMut};

use crate::errors::{HtmError, HtmResult};

/// One trixel's payload, or nothing yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSlot<T> {
    data: T,
    is_set: bool,
}

impl<T: Default> CacheSlot<T> {
    pub fn new(data: T) -> Self {
        Self { data, is_set: true }
    }

    pub fn set(&mut self, data: T) {
        self.data = data;
        self.is_set = true;
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Takes the payload out, leaving the slot unset.
    pub fn take(&mut self) -> Option<T> {
        let was_set = std::mem::replace(&mut self.is_set, false);
        let data = std::mem::take(&mut self.data);
        was_set.then_some(data)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone)]
pub struct TrixelCache<T> {
    slots: Vec<CacheSlot<T>>,
    /// Most recent first; may hold duplicates until the next prune.
    recency: VecDeque<usize>,
    cache_size: usize,
    noop: bool,
}

impl<T: Default> TrixelCache<T> {
    /// A cache over `data_size` trixels keeping at most `cache_size` of them
    /// after each prune.
    pub fn new(data_size: usize, cache_size: usize) -> HtmResult<Self> {
        if cache_size > data_size {
            return Err(HtmError::cache_size(cache_size, data_size));
        }
        Ok(Self {
            slots: (0..data_size).map(|_| CacheSlot::default()).collect(),
            recency: VecDeque::new(),
            cache_size,
            noop: cache_size == data_size,
        })
    }

    /// Mutable access to slot `index`, marking it most recently used.
    ///
    /// # Panics
    ///
    /// Panics if `index >= data_size()`.
    pub fn get_mut(&mut self, index: usize) -> &mut CacheSlot<T> {
        if !self.noop {
            self.recency.push_front(index);
        }
        &mut self.slots[index]
    }

    pub fn get(&self, index: usize) -> Option<&CacheSlot<T>> {
        self.slots.get(index)
    }

    /// Evicts least-recently-used slots beyond `max(size(), keep)`.
    ///
    /// A `keep` larger than the ceiling retains more for this call only.
    pub fn prune(&mut self, keep: usize) {
        if self.noop {
            return;
        }

        let mut seen = HashSet::with_capacity(self.recency.len());
        self.recency.retain(|&index| seen.insert(index));

        let limit = self.cache_size.max(keep);
        if self.recency.len() <= limit {
            return;
        }
        for index in self.recency.drain(limit..) {
            self.slots[index].reset();
        }
    }

    /// Changes the ceiling, clearing every slot.
    pub fn resize(&mut self, cache_size: usize) -> HtmResult<()> {
        if cache_size > self.slots.len() {
            return Err(HtmError::cache_size(cache_size, self.slots.len()));
        }
        self.clear();
        self.cache_size = cache_size;
        self.noop = cache_size == self.slots.len();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(CacheSlot::reset);
        self.recency.clear();
    }

    /// Unsets slot `index` without touching recency.
    pub fn reset(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.reset();
        }
    }

    /// The ceiling kept after each prune.
    pub fn size(&self) -> usize {
        self.cache_size
    }

    pub fn data_size(&self) -> usize {
        self.slots.len()
    }

    /// Number of set slots.
    pub fn current_usage(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_set).count()
    }

    /// Indices of set slots, ascending.
    pub fn primed_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_set.then_some(i))
            .collect()
    }

    pub fn noop(&self) -> bool {
        self.noop
    }
}

impl<T> Index<usize> for TrixelCache<T> {
    type Output = CacheSlot<T>;

    fn index(&self, index: usize) -> &CacheSlot<T> {
        &self.slots[index]
    }
}

impl<T: Default> IndexMut<usize> for TrixelCache<T> {
    fn index_mut(&mut self, index: usize) -> &mut CacheSlot<T> {
        self.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_when_ceiling_covers_everything() {
        assert!(TrixelCache::<u8>::new(10, 10).unwrap().noop());
        assert!(!TrixelCache::<u8>::new(10, 3).unwrap().noop());
    }

    #[test]
    fn rejects_oversized_ceiling() {
        let err = TrixelCache::<u8>::new(4, 5).unwrap_err();
        assert!(matches!(
            err,
            HtmError::CacheSizeTooLarge {
                cache_size: 5,
                data_size: 4
            }
        ));
    }

    #[test]
    fn set_then_read() {
        let mut cache = TrixelCache::new(8, 2).unwrap();
        cache[5].set("vega");
        assert!(cache[5].is_set());
        assert_eq!(*cache[5].data(), "vega");
        assert!(!cache[4].is_set());
    }

    #[test]
    fn prune_evicts_least_recent() {
        let mut cache = TrixelCache::new(10, 1).unwrap();
        cache[1].set('A');
        cache[0].set('B');
        cache.prune(0);
        assert!(!cache[1].is_set());
        assert!(cache[0].is_set());
        assert_eq!(*cache[0].data(), 'B');
    }

    #[test]
    fn visible_hits_survive_the_frame_prune() {
        fn frame(cache: &mut TrixelCache<usize>, visible: &[usize]) {
            for &t in visible {
                let slot = cache.get_mut(t);
                if !slot.is_set() {
                    slot.set(t);
                }
            }
            cache.prune(0);
        }

        let mut cache = TrixelCache::new(8, 2).unwrap();
        frame(&mut cache, &[0, 1]);
        frame(&mut cache, &[0, 2]);
        assert_eq!(cache.primed_indices(), vec![0, 2]);
    }

    #[test]
    fn prune_keep_overrides_ceiling() {
        let mut cache = TrixelCache::new(10, 1).unwrap();
        cache[0].set('A');
        cache[1].set('B');
        cache.prune(2);
        assert!(cache[0].is_set());
        assert!(cache[1].is_set());

        // The override lasts for one call only.
        cache.prune(0);
        assert!(cache[1].is_set());
        assert!(!cache[0].is_set());
    }

    #[test]
    fn mutable_reads_refresh_recency() {
        let mut cache = TrixelCache::new(10, 1).unwrap();
        cache[0].set(1);
        cache[1].set(2);
        assert!(cache.get_mut(0).is_set());
        cache.prune(0);
        assert!(cache[0].is_set());
        assert!(!cache[1].is_set());
    }

    #[test]
    fn shared_reads_do_not_refresh() {
        let mut cache = TrixelCache::new(10, 1).unwrap();
        cache[0].set(1);
        cache[1].set(2);
        assert!(cache[0].is_set());
        cache.prune(0);
        assert!(!cache[0].is_set());
        assert!(cache[1].is_set());
    }

    #[test]
    fn duplicate_touches_count_once() {
        let mut cache = TrixelCache::new(10, 2).unwrap();
        for _ in 0..5 {
            cache[3].set(3);
        }
        cache[4].set(4);
        cache.prune(0);
        assert_eq!(cache.primed_indices(), vec![3, 4]);
    }

    #[test]
    fn resize_checks_bounds_and_clears() {
        let mut cache = TrixelCache::new(6, 2).unwrap();
        cache[1].set(10);
        assert!(cache.resize(7).is_err());
        assert!(cache[1].is_set());

        cache.resize(6).unwrap();
        assert_eq!(cache.size(), 6);
        assert!(cache.noop());
        assert_eq!(cache.current_usage(), 0);
    }

    #[test]
    fn clear_unsets_everything() {
        let mut cache = TrixelCache::new(6, 3).unwrap();
        cache[0].set(1);
        cache[5].set(2);
        cache.clear();
        assert_eq!(cache.current_usage(), 0);
        assert!((0..6).all(|i| !cache[i].is_set()));
        assert_eq!(cache.size(), 3);
        assert_eq!(cache.data_size(), 6);
    }

    #[test]
    fn noop_never_evicts() {
        let mut cache = TrixelCache::new(3, 3).unwrap();
        for i in 0..3 {
            cache[i].set(i);
        }
        cache.prune(0);
        assert_eq!(cache.current_usage(), 3);
    }

    #[test]
    fn slot_take_and_reset() {
        let mut cache = TrixelCache::new(4, 1).unwrap();
        cache[2].set(vec![1, 2]);
        assert_eq!(cache.get_mut(2).take(), Some(vec![1, 2]));
        assert!(!cache[2].is_set());
        assert_eq!(cache.get_mut(2).take(), None);

        cache[3].set(vec![9]);
        cache.reset(3);
        assert!(cache.primed_indices().is_empty());
    }
}
