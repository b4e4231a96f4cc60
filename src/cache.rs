//! # Aggregation Cache
//!
//! Aggregating a long zone history is quadratic in geometric operations, so
//! the result is memoized per equipment and analysis window. Entries are
//! handed out as `Arc` clones: a reader holds either the fully-old or the
//! fully-new partition, never a half-replaced one.
//!
//! Invalidation is explicit and whole-equipment: writing new daily zones
//! for an equipment drops every cached window of that equipment. There is
//! no TTL; the LRU capacity only bounds memory when many distinct windows
//! are browsed.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use crate::aggregate::ZoneCell;
use crate::{AnalysisWindow, EquipmentId};

type CacheKey = (EquipmentId, AnalysisWindow);

/// Process-wide memo of aggregated partitions.
pub struct AggregationCache {
    entries: Mutex<LruCache<CacheKey, Arc<Vec<ZoneCell>>>>,
}

impl AggregationCache {
    /// Cache holding at most `capacity` (equipment, window) partitions.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached partition for an equipment and window, if any.
    pub fn get(&self, equipment: EquipmentId, window: AnalysisWindow) -> Option<Arc<Vec<ZoneCell>>> {
        self.lock().get(&(equipment, window)).cloned()
    }

    /// Store a freshly aggregated partition.
    pub fn put(&self, equipment: EquipmentId, window: AnalysisWindow, partition: Vec<ZoneCell>) {
        self.lock().put((equipment, window), Arc::new(partition));
    }

    /// Cached partition, or compute, store and return it.
    ///
    /// Concurrent misses on the same key may compute twice; both runs
    /// produce the same partition, so the last write simply wins.
    pub fn get_or_compute<F>(
        &self,
        equipment: EquipmentId,
        window: AnalysisWindow,
        compute: F,
    ) -> Arc<Vec<ZoneCell>>
    where
        F: FnOnce() -> Vec<ZoneCell>,
    {
        if let Some(hit) = self.get(equipment, window) {
            return hit;
        }
        let partition = Arc::new(compute());
        self.lock().put((equipment, window), Arc::clone(&partition));
        partition
    }

    /// Drop every cached window for an equipment. Call after writing new
    /// daily zones for it.
    pub fn invalidate(&self, equipment: EquipmentId) {
        let mut entries = self.lock();
        let stale: Vec<CacheKey> = entries
            .iter()
            .map(|(key, _)| *key)
            .filter(|(id, _)| *id == equipment)
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, Arc<Vec<ZoneCell>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AggregationCache {
    /// Room for a handful of equipment with a few browsed windows each.
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geo::polygon;
    use std::cell::Cell;

    fn partition() -> Vec<ZoneCell> {
        vec![ZoneCell::daily(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)],
        )]
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = AggregationCache::default();
        let window = AnalysisWindow::all();
        assert!(cache.get(1, window).is_none());

        cache.put(1, window, partition());
        let hit = cache.get(1, window).unwrap();
        assert_eq!(hit.len(), 1);
    }

    #[test]
    fn test_get_or_compute_runs_once() {
        let cache = AggregationCache::default();
        let window = AnalysisWindow::all();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let result = cache.get_or_compute(7, window, || {
                calls.set(calls.get() + 1);
                partition()
            });
            assert_eq!(result.len(), 1);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_invalidate_drops_every_window_of_the_equipment() {
        let cache = AggregationCache::default();
        let whole = AnalysisWindow::all();
        let june = AnalysisWindow::month(2023, 6).unwrap();

        cache.put(1, whole, partition());
        cache.put(1, june, partition());
        cache.put(2, whole, partition());

        cache.invalidate(1);

        assert!(cache.get(1, whole).is_none());
        assert!(cache.get(1, june).is_none());
        assert!(cache.get(2, whole).is_some(), "other equipment untouched");
    }

    #[test]
    fn test_readers_keep_their_snapshot_across_invalidation() {
        let cache = AggregationCache::default();
        let window = AnalysisWindow::all();
        cache.put(1, window, partition());

        let snapshot = cache.get(1, window).unwrap();
        cache.invalidate(1);

        // The reader's Arc still points at the complete old partition
        assert_eq!(snapshot.len(), 1);
        assert!(cache.get(1, window).is_none());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = AggregationCache::new(2);
        let whole = AnalysisWindow::all();

        cache.put(1, whole, partition());
        cache.put(2, whole, partition());
        cache.put(3, whole, partition());

        assert!(cache.get(1, whole).is_none());
        assert!(cache.get(3, whole).is_some());
    }
}
