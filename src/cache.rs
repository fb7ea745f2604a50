//! Bounded recency-ordered cache of decoded planes.
//!
//! Capacity is a configuration constant, not derived from dataset size, which
//! bounds worst-case memory to `capacity * plane_bytes` regardless of volume
//! size. Pure in-memory map; no I/O ever happens inside the cache.

use crate::types::Axis;
use crate::volume::PlaneData;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key: one plane per axis and index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneKey {
    pub axis: Axis,
    pub index: usize,
}

impl PlaneKey {
    pub fn native(index: usize) -> Self {
        Self {
            axis: Axis::Z,
            index,
        }
    }
}

struct Entry {
    plane: Arc<PlaneData>,
    last_used: u64,
}

struct CacheInner {
    map: HashMap<PlaneKey, Entry>,
    clock: u64,
}

/// Recency-ordered plane cache with a fixed capacity.
///
/// Multiple in-flight builds share one cache (an XZ and a YZ build reading
/// the same Z plane); the internal lock keeps recency order consistent under
/// concurrent get/put.
pub struct SliceCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl SliceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::with_capacity(capacity),
                clock: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a plane, refreshing its recency on a hit
    pub fn get(&self, key: &PlaneKey) -> Option<Arc<PlaneData>> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let clock = inner.clock;
        inner.map.get_mut(key).map(|entry| {
            entry.last_used = clock;
            Arc::clone(&entry.plane)
        })
    }

    /// Insert a plane, evicting the least-recently-used entry at capacity.
    ///
    /// Callers holding an `Arc` to an evicted plane keep it alive; eviction
    /// only drops the cache's own reference.
    pub fn put(&self, key: PlaneKey, plane: Arc<PlaneData>) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let clock = inner.clock;

        if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
            if let Some(oldest) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| *k)
            {
                inner.map.remove(&oldest);
            }
        }

        inner.map.insert(
            key,
            Entry {
                plane,
                last_used: clock,
            },
        );
    }
}
