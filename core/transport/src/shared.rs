use std::sync::Arc;

use parking_lot::RwLock;

use crate::{position_map::PositionMap, timeline::MappedPosition};

/// A [`PositionMap`] shared between one writer (the decode thread) and any
/// number of readers.
///
/// Readers either search under a short read lock or take a [`snapshot`]
/// and search that copy without holding anything.
///
/// [`snapshot`]: SharedPositionMap::snapshot
#[derive(Debug, Clone, Default)]
pub struct SharedPositionMap {
    inner: Arc<RwLock<PositionMap>>,
}

impl SharedPositionMap {
    pub fn new(map: PositionMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn insert(&self, source_frame: i64, frame_count: i64, dest_frame: i64, ratio: f64) {
        self.inner
            .write()
            .insert(source_frame, frame_count, dest_frame, ratio);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn search(&self, source_frame: i64) -> MappedPosition {
        self.inner.read().search(source_frame)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Deep copy of the current map.
    pub fn snapshot(&self) -> PositionMap {
        self.inner.read().clone()
    }
}
