//! Winner index cache.
//!
//! An arena of fixed-width slots, one per sample row. The arena only grows:
//! a smaller batch reuses the leading slots and leaves the rest untouched.
//! `active` records how many slots the latest forward call wrote, and only
//! those are ever handed out for reading.

/// Per-sample winning indices from the most recent forward call.
#[derive(Debug, Clone, Default)]
pub struct WinnerCache {
    /// Row-major `capacity x k` storage
    indices: Vec<usize>,

    /// Slot width
    k: usize,

    /// Slots written by the latest forward call
    active: usize,

    /// Whether any forward call has run yet
    populated: bool,
}

impl WinnerCache {
    /// Empty cache with `k` indices per slot.
    pub fn new(k: usize) -> Self {
        Self {
            indices: Vec::new(),
            k,
            active: 0,
            populated: false,
        }
    }

    /// Slot width.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Slots currently allocated.
    pub fn capacity(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.indices.len() / self.k
        }
    }

    /// Slots written by the latest forward call.
    pub fn active_slots(&self) -> usize {
        self.active
    }

    /// Whether a forward call has populated the cache.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Prepare `batch` slots for overwriting and return them as one mutable
    /// row-major slice.
    ///
    /// Grows the arena if `batch` exceeds the capacity; never shrinks it.
    pub fn begin_forward(&mut self, batch: usize) -> &mut [usize] {
        let needed = batch * self.k;
        if self.indices.len() < needed {
            self.indices.resize(needed, 0);
        }
        self.active = batch;
        self.populated = true;
        &mut self.indices[..needed]
    }

    /// Slots written by the latest forward call, row-major.
    pub fn active(&self) -> &[usize] {
        &self.indices[..self.active * self.k]
    }

    /// Winners of one sample from the latest forward call.
    pub fn slot(&self, sample: usize) -> Option<&[usize]> {
        if sample >= self.active {
            return None;
        }
        let start = sample * self.k;
        Some(&self.indices[start..start + self.k])
    }
}
