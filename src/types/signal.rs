use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named L1 features for one window.
///
/// Ordered map so serialized snapshots are byte-stable across runs.
pub type FeatureVector = BTreeMap<String, f64>;

/// Stable feature names produced by the extractor.
pub mod feature_names {
    /// Acceleration RMS (g)
    pub const RMS: &str = "rms";
    /// Peak-to-peak acceleration (g)
    pub const PTP: &str = "ptp";
    /// Spectral energy in the low band (relative units)
    pub const ENERGY_LOW: &str = "energy_low";
    /// Spectral energy in the high band (relative units)
    pub const ENERGY_HIGH: &str = "energy_high";
    /// Overall velocity RMS (mm/s), ISO 10816/20816 convention
    pub const OVERALL_VEL_RMS_MM_S: &str = "overall_vel_rms_mm_s";
    /// RMS of the high-band envelope (g)
    pub const ENVELOPE_RMS: &str = "envelope_rms";
    /// RMS of the band-passed high-frequency acceleration (g)
    pub const ACC_HF_RMS_G: &str = "acc_hf_rms_g";

    /// All features in extraction order.
    pub const ALL: [&str; 7] = [
        RMS,
        PTP,
        ENERGY_LOW,
        ENERGY_HIGH,
        OVERALL_VEL_RMS_MM_S,
        ENVELOPE_RMS,
        ACC_HF_RMS_G,
    ];
}

/// Name of the feature with the largest magnitude; the first wins on ties.
pub fn dominant_feature(features: &FeatureVector) -> Option<String> {
    features
        .iter()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(&String, f64)>, (name, v)| match best {
            Some((_, b)) if v.abs() <= b => best,
            _ => Some((name, v.abs())),
        })
        .map(|(name, _)| name.clone())
}

/// One delivery of raw acceleration samples for a sensor key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBatch {
    /// Acceleration samples in g, in arrival order
    #[serde(alias = "acceleration")]
    pub samples: Vec<f64>,
    /// External hard-limit temperature flag, passed through to the FSM
    #[serde(default)]
    pub temperature_alarm: bool,
    /// Producer timestamp, if the transport supplied one
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawBatch {
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            temperature_alarm: false,
            timestamp: None,
        }
    }

    pub fn with_temperature_alarm(mut self, alarm: bool) -> Self {
        self.temperature_alarm = alarm;
        self
    }
}

/// Immutable copy of the most recent W samples for a key.
///
/// Produced by the window buffer; never aliases the live buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWindow {
    samples: Vec<f64>,
}

impl RawWindow {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f64>> for RawWindow {
    fn from(samples: Vec<f64>) -> Self {
        Self::new(samples)
    }
}
