use dashmap::DashMap;

use crate::types::{SensorKey, TrendLevel};

/// Consecutive non-NORMAL trend observations per key.
#[derive(Default)]
pub struct PersistenceCounter {
    counts: DashMap<SensorKey, u32>,
}

impl PersistenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment on a non-normal level, reset on NORMAL; returns the new count.
    pub fn update(&self, key: &SensorKey, level: TrendLevel) -> u32 {
        let mut count = self.counts.entry(key.clone()).or_insert(0);
        *count = if level.is_normal() { 0 } else { count.saturating_add(1) };
        *count
    }

    pub fn get(&self, key: &SensorKey) -> u32 {
        self.counts.get(key).map_or(0, |c| *c)
    }
}
