//! Fixed-capacity circular history of process-variable samples.
//!
//! The logical length (`size`) can change at runtime up to the compile-time
//! capacity `N`. Resizing keeps the most recent samples in chronological
//! order.

use heapless::Vec;

#[derive(Debug, Clone)]
pub struct RingHistory<const N: usize> {
    samples: Vec<f32, N>,
    size: usize,
    // Next slot to overwrite. While the ring is filling this equals
    // `samples.len()`.
    cursor: usize,
}

impl<const N: usize> RingHistory<N> {
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
            size: 0,
            cursor: 0,
        }
    }

    pub fn with_size(size: usize) -> Self {
        let mut ring = Self::new();
        ring.resize(size);
        ring
    }

    /// Logical length of the ring.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.size > 0 && self.samples.len() == self.size
    }

    /// Write `value` and return the sample it is compared against: the one it
    /// evicted once the ring is full, otherwise the oldest sample held (or
    /// `value` itself for the very first write).
    ///
    /// A zero-sized ring stores nothing and echoes `value` back.
    pub fn push(&mut self, value: f32) -> f32 {
        if self.size == 0 {
            return value;
        }

        if self.samples.len() < self.size {
            let oldest = self.samples.first().copied().unwrap_or(value);
            // Cannot fail: size never exceeds N.
            let _ = self.samples.push(value);
            self.cursor = self.samples.len() % self.size;
            return oldest;
        }

        let evicted = core::mem::replace(&mut self.samples[self.cursor], value);
        self.cursor = (self.cursor + 1) % self.size;
        evicted
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = if self.is_full() {
            self.samples.split_at(self.cursor)
        } else {
            (&self.samples[..], &self.samples[..0])
        };
        older.iter().chain(newer.iter()).copied()
    }

    /// Change the logical length, clamped to `N`. The most recent
    /// `min(len, size)` samples survive and the write cursor is placed
    /// right after the newest one.
    pub fn resize(&mut self, size: usize) {
        let size = size.min(N);
        let keep = self.samples.len().min(size);
        let skip = self.samples.len() - keep;

        let mut ordered: Vec<f32, N> = Vec::new();
        for sample in self.iter().skip(skip) {
            let _ = ordered.push(sample);
        }

        self.samples = ordered;
        self.size = size;
        self.cursor = if size == 0 { 0 } else { self.samples.len() % size };
    }
}

impl<const N: usize> Default for RingHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}
