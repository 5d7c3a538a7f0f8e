use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

use crate::config::{TrendConfig, VelocityZoneConfig};
use crate::types::{
    dominant_feature, feature_names, FeatureVector, SensorKey, TrendLevel, VelocityZone,
};

// ============================================================================
// Trend Result
// ============================================================================

/// Classification of one feature vector plus the derived flags the FSM reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendResult {
    pub level: TrendLevel,
    pub score: f64,
    pub dominant_feature: Option<String>,
    /// High-frequency indicator at or above the watch threshold
    pub hf_high: bool,
    /// Envelope (bearing) indicator at or above its threshold
    pub envelope_high: bool,
    pub velocity_zone: VelocityZone,
    /// External hard-limit flag, passed through unchanged
    pub temperature_alarm: bool,
}

// ============================================================================
// Trend Detector
// ============================================================================

/// Scores feature vectors against two ascending thresholds.
///
/// A bounded history of accepted vectors is kept per key for slope-style
/// extensions; the current scoring rule does not read it.
pub struct TrendDetector {
    config: TrendConfig,
    history: DashMap<SensorKey, VecDeque<FeatureVector>>,
}

impl TrendDetector {
    pub fn new(config: &TrendConfig) -> Self {
        Self {
            config: config.clone(),
            history: DashMap::new(),
        }
    }

    /// Classify `scored` (raw or normalized, per configuration).
    ///
    /// `raw` supplies the physical velocity for the ISO zone. A vector without
    /// the score feature is NORMAL with score 0 and no dominant feature.
    pub fn update(
        &self,
        key: &SensorKey,
        scored: &FeatureVector,
        raw: &FeatureVector,
        temperature_alarm: bool,
    ) -> TrendResult {
        let velocity_zone = classify_velocity(
            raw.get(feature_names::OVERALL_VEL_RMS_MM_S).copied(),
            &self.config.velocity_zones,
        );

        let Some(&signal) = scored.get(&self.config.score_feature) else {
            trace!(%key, feature = %self.config.score_feature, "Score feature absent, trend NORMAL");
            return TrendResult {
                velocity_zone,
                temperature_alarm,
                ..TrendResult::default()
            };
        };

        {
            let mut hist = self.history.entry(key.clone()).or_default();
            hist.push_back(scored.clone());
            while hist.len() > self.config.history_size {
                hist.pop_front();
            }
        }

        let score = signal.abs();
        let level = if score >= self.config.warning_threshold {
            TrendLevel::Warning
        } else if score >= self.config.watch_threshold {
            TrendLevel::Watch
        } else {
            TrendLevel::Normal
        };

        let envelope_high = scored
            .get(&self.config.envelope_feature)
            .is_some_and(|v| v.abs() >= self.config.envelope_threshold);

        TrendResult {
            level,
            score,
            dominant_feature: dominant_feature(scored),
            hf_high: score >= self.config.watch_threshold,
            envelope_high,
            velocity_zone,
            temperature_alarm,
        }
    }

    pub fn history_len(&self, key: &SensorKey) -> usize {
        self.history.get(key).map_or(0, |h| h.len())
    }
}

/// Zone from velocity RMS; upper boundaries are inclusive.
fn classify_velocity(velocity_mm_s: Option<f64>, zones: &VelocityZoneConfig) -> VelocityZone {
    match velocity_mm_s {
        Some(v) if v.is_nan() => VelocityZone::A,
        None => VelocityZone::A,
        Some(v) if v <= zones.ab_mm_s => VelocityZone::A,
        Some(v) if v <= zones.bc_mm_s => VelocityZone::B,
        Some(v) if v <= zones.cd_mm_s => VelocityZone::C,
        Some(_) => VelocityZone::D,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> TrendDetector {
        TrendDetector::new(&TrendConfig::default())
    }

    fn key() -> SensorKey {
        SensorKey::new("COMP-2", "GEAR")
    }

    fn fv(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_missing_score_feature_is_normal() {
        let d = detector();
        let raw = fv(&[(feature_names::OVERALL_VEL_RMS_MM_S, 20.0)]);
        let r = d.update(&key(), &fv(&[("rms", 9.0)]), &raw, true);
        assert_eq!(r.level, TrendLevel::Normal);
        assert_eq!(r.score, 0.0);
        assert!(r.dominant_feature.is_none());
        assert!(!r.hf_high && !r.envelope_high);
        // Derived facts that do not depend on the score still come through
        assert_eq!(r.velocity_zone, VelocityZone::D);
        assert!(r.temperature_alarm);
        assert_eq!(d.history_len(&key()), 0);
    }

    #[test]
    fn test_levels_from_thresholds() {
        let d = detector();
        let raw = FeatureVector::new();
        let level = |z: f64| {
            d.update(&key(), &fv(&[(feature_names::ACC_HF_RMS_G, z)]), &raw, false)
                .level
        };
        assert_eq!(level(0.5), TrendLevel::Normal);
        assert_eq!(level(3.0), TrendLevel::Watch);
        assert_eq!(level(-4.0), TrendLevel::Watch);
        assert_eq!(level(5.0), TrendLevel::Warning);
    }

    #[test]
    fn test_flags() {
        let d = detector();
        let scored = fv(&[
            (feature_names::ACC_HF_RMS_G, 3.5),
            (feature_names::ENVELOPE_RMS, 4.0),
            ("rms", -6.0),
        ]);
        let r = d.update(&key(), &scored, &FeatureVector::new(), false);
        assert!(r.hf_high);
        assert!(r.envelope_high);
        assert_eq!(r.dominant_feature.as_deref(), Some("rms"));
        assert_eq!(r.velocity_zone, VelocityZone::A);
    }

    #[test]
    fn test_velocity_zone_boundaries() {
        let z = VelocityZoneConfig::default();
        assert_eq!(classify_velocity(Some(1.0), &z), VelocityZone::A);
        assert_eq!(classify_velocity(Some(2.8), &z), VelocityZone::A);
        assert_eq!(classify_velocity(Some(5.0), &z), VelocityZone::B);
        assert_eq!(classify_velocity(Some(7.1), &z), VelocityZone::B);
        assert_eq!(classify_velocity(Some(8.0), &z), VelocityZone::C);
        assert_eq!(classify_velocity(Some(18.5), &z), VelocityZone::D);
        assert_eq!(classify_velocity(None, &z), VelocityZone::A);
    }

    #[test]
    fn test_history_is_bounded() {
        let d = TrendDetector::new(&TrendConfig {
            history_size: 3,
            ..TrendConfig::default()
        });
        for i in 0..10 {
            let scored = fv(&[(feature_names::ACC_HF_RMS_G, f64::from(i))]);
            d.update(&key(), &scored, &FeatureVector::new(), false);
        }
        assert_eq!(d.history_len(&key()), 3);
    }
}
