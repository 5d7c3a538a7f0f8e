//! Adaptive Baseline - per-key EWMA statistics and deviation scoring
//!
//! Every (sensor key, feature) pair keeps an exponentially weighted mean and
//! variance. Raw features are normalized against those statistics into a
//! deviation score; learning is gated by the caller so that only windows
//! already judged NORMAL are absorbed into the baseline.
//!
//! ## Update rule
//!
//! ```text
//! first observation:  mean = x, var = 0
//! afterwards:         d = x - mean
//!                     mean += alpha * d
//!                     var = (1 - alpha) * (var + alpha * d^2)
//! ```
//!
//! ## Persistence
//!
//! `save_to_file` / `load_from_file` write a schema-versioned JSON snapshot so
//! learned baselines survive a restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::BaselineConfig;
use crate::types::{FeatureVector, SensorKey};

/// Schema version for persistence compatibility
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Schema version mismatch: file has v{0}, expected v{1}")]
    SchemaMismatch(u32, u32),
}

// ============================================================================
// Per-feature statistics
// ============================================================================

/// Running EWMA statistics for one (key, feature) pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl BaselineStats {
    fn observe(&mut self, value: f64, alpha: f64) {
        if self.count == 0 {
            self.mean = value;
            self.variance = 0.0;
        } else {
            let delta = value - self.mean;
            self.mean += alpha * delta;
            self.variance = (1.0 - alpha) * (self.variance + alpha * delta * delta);
        }
        self.count = self.count.saturating_add(1);
    }

    /// Standard deviation with the variance floored at `floor`.
    pub fn effective_std(&self, floor: f64) -> f64 {
        self.variance.max(floor).sqrt()
    }
}

// ============================================================================
// Adaptive Baseline
// ============================================================================

/// Concurrent per-key baseline store.
///
/// Each key's feature map sits behind its own DashMap shard, so updates for
/// different sensors proceed in parallel.
pub struct AdaptiveBaseline {
    alpha: f64,
    min_samples: u64,
    variance_floor: f64,
    stats: DashMap<SensorKey, HashMap<String, BaselineStats>>,
}

impl AdaptiveBaseline {
    pub fn new(config: &BaselineConfig) -> Self {
        Self {
            alpha: config.alpha,
            min_samples: config.min_samples,
            variance_floor: config.variance_floor,
            stats: DashMap::new(),
        }
    }

    /// Learn from `features` unless `allow_update` is false.
    ///
    /// With learning disallowed nothing changes, not even the count.
    pub fn update(&self, key: &SensorKey, features: &FeatureVector, allow_update: bool) {
        if !allow_update {
            return;
        }
        let mut per_key = self.stats.entry(key.clone()).or_default();
        for (name, &value) in features {
            if !value.is_finite() {
                continue;
            }
            match per_key.get_mut(name) {
                Some(s) => s.observe(value, self.alpha),
                None => {
                    let mut s = BaselineStats::default();
                    s.observe(value, self.alpha);
                    per_key.insert(name.clone(), s);
                }
            }
        }
    }

    /// Deviation score per feature.
    ///
    /// Features with fewer than `min_samples` observations (or none) score 0.0.
    pub fn normalize(&self, key: &SensorKey, features: &FeatureVector) -> FeatureVector {
        let per_key = self.stats.get(key);
        features
            .iter()
            .map(|(name, &value)| {
                let z = per_key
                    .as_ref()
                    .and_then(|m| m.get(name))
                    .filter(|s| s.count >= self.min_samples)
                    .map_or(0.0, |s| (value - s.mean) / s.effective_std(self.variance_floor));
                (name.clone(), z)
            })
            .collect()
    }

    pub fn stats(&self, key: &SensorKey, feature: &str) -> Option<BaselineStats> {
        self.stats.get(key).and_then(|m| m.get(feature).copied())
    }

    /// Whether every feature of `key` has reached `min_samples`.
    pub fn is_warm(&self, key: &SensorKey) -> bool {
        self.stats
            .get(key)
            .is_some_and(|m| !m.is_empty() && m.values().all(|s| s.count >= self.min_samples))
    }

    pub fn key_count(&self) -> usize {
        self.stats.len()
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Write all statistics to a JSON file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<(), BaselineError> {
        let mut entries: Vec<PersistedEntry> = self
            .stats
            .iter()
            .flat_map(|kv| {
                let key = kv.key().clone();
                kv.value()
                    .iter()
                    .map(|(feature, stats)| PersistedEntry {
                        asset: key.asset.clone(),
                        point: key.point.clone(),
                        feature: feature.clone(),
                        stats: *stats,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.asset, &a.point, &a.feature).cmp(&(&b.asset, &b.point, &b.feature))
        });

        let state = BaselineState {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            entries,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&state)?;
        std::fs::write(path, json)?;
        info!(
            path = %path.display(),
            keys = self.stats.len(),
            entries = state.entries.len(),
            "Baseline state saved"
        );
        Ok(())
    }

    /// Restore a baseline from a file written by [`Self::save_to_file`].
    pub fn load_from_file(config: &BaselineConfig, path: &Path) -> Result<Self, BaselineError> {
        let json = std::fs::read_to_string(path)?;
        let state: BaselineState = serde_json::from_str(&json)?;
        if state.schema_version != SCHEMA_VERSION {
            return Err(BaselineError::SchemaMismatch(state.schema_version, SCHEMA_VERSION));
        }

        let baseline = Self::new(config);
        for entry in state.entries {
            baseline
                .stats
                .entry(SensorKey::new(entry.asset, entry.point))
                .or_default()
                .insert(entry.feature, entry.stats);
        }
        info!(
            path = %path.display(),
            keys = baseline.stats.len(),
            saved_at = %state.saved_at,
            "Baseline state loaded"
        );
        Ok(baseline)
    }

    /// Load from file if it exists and is valid, otherwise start empty.
    pub fn load_or_new(config: &BaselineConfig, path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No baseline state file found, starting fresh");
            return Self::new(config);
        }
        Self::load_from_file(config, path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring unusable baseline state");
            Self::new(config)
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    asset: String,
    point: String,
    feature: String,
    stats: BaselineStats,
}

#[derive(Debug, Serialize, Deserialize)]
struct BaselineState {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    entries: Vec<PersistedEntry>,
}
