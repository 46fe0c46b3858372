//! Scan-time image cache.
//! Filled once while the container is scanned, then frozen; lookups are a
//! vector index by container slot. Nothing is ever evicted.

use std::sync::Arc;

use image::RgbImage;

/// Collects images during the scan
#[derive(Debug, Default)]
pub struct ImageCacheBuilder {
    slots: Vec<Option<Arc<RgbImage>>>,
    bonus_capacity: usize,
    bonus_used: usize,
}

impl ImageCacheBuilder {
    /// Cache that keeps at most `bonus_capacity` frames beyond the mandatory ones
    pub fn new(bonus_capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            bonus_capacity,
            bonus_used: 0,
        }
    }

    fn put(&mut self, slot: usize, image: RgbImage) {
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(Arc::new(image));
    }

    /// Always retained: leading slots cannot be located by decoding
    pub fn insert_mandatory(&mut self, slot: usize, image: RgbImage) {
        self.put(slot, image);
    }

    /// Whether an offered frame would be kept
    pub fn wants_bonus(&self) -> bool {
        self.bonus_used < self.bonus_capacity
    }

    /// Keep the image if bonus room is left, first come first served
    pub fn offer(&mut self, slot: usize, image: RgbImage) -> bool {
        if !self.wants_bonus() {
            return false;
        }
        self.bonus_used += 1;
        self.put(slot, image);
        true
    }

    pub fn build(self) -> ImageCache {
        let cached = self.slots.iter().filter(|s| s.is_some()).count();
        ImageCache { slots: self.slots, cached }
    }
}

/// Frozen slot-to-image table
#[derive(Debug, Clone, Default)]
pub struct ImageCache {
    slots: Vec<Option<Arc<RgbImage>>>,
    cached: usize,
}

impl ImageCache {
    pub fn get(&self, slot: usize) -> Option<Arc<RgbImage>> {
        self.slots.get(slot).and_then(|s| s.clone())
    }

    pub fn contains(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Number of cached images
    pub fn len(&self) -> usize {
        self.cached
    }

    pub fn is_empty(&self) -> bool {
        self.cached == 0
    }
}
