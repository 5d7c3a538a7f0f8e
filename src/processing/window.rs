//! Per-key sample accumulation

use dashmap::DashMap;
use std::collections::VecDeque;

use crate::types::{RawWindow, SensorKey};

/// Keeps the most recent `capacity` samples for every sensor key.
///
/// Buffers are created on first append and never evicted. Each key's buffer
/// sits behind its own DashMap shard lock, so appends for different keys do
/// not contend.
pub struct WindowBuffer {
    capacity: usize,
    buffers: DashMap<SensorKey, VecDeque<f64>>,
}

impl WindowBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: DashMap::new(),
        }
    }

    /// Extend the key's buffer, dropping the oldest samples past capacity.
    pub fn append(&self, key: &SensorKey, samples: &[f64]) {
        // Anything older than the last `capacity` samples would be evicted anyway
        let samples = &samples[samples.len().saturating_sub(self.capacity)..];

        let mut buf = self
            .buffers
            .entry(key.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        let overflow = (buf.len() + samples.len()).saturating_sub(self.capacity);
        buf.drain(..overflow);
        buf.extend(samples.iter().copied());
    }

    pub fn ready(&self, key: &SensorKey) -> bool {
        self.len(key) >= self.capacity
    }

    /// Owned copy of the last `capacity` samples, or `None` until ready.
    ///
    /// The copy is detached from the live buffer, which keeps filling while
    /// the snapshot is processed.
    pub fn snapshot(&self, key: &SensorKey) -> Option<RawWindow> {
        let buf = self.buffers.get(key)?;
        if buf.len() < self.capacity {
            return None;
        }
        Some(RawWindow::new(buf.iter().copied().collect()))
    }

    pub fn len(&self, key: &SensorKey) -> usize {
        self.buffers.get(key).map_or(0, |b| b.len())
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn key_count(&self) -> usize {
        self.buffers.len()
    }
}
