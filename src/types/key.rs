use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one physical sensor channel: a machine plus a measurement location.
///
/// All per-key state in the pipeline (window buffer, baseline, FSM, cooldown)
/// is indexed by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    /// Asset identifier (e.g. "PUMP_01")
    pub asset: String,
    /// Measurement point on the asset (e.g. "DE" for drive end)
    pub point: String,
}

impl SensorKey {
    pub fn new(asset: impl Into<String>, point: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            point: point.into(),
        }
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset, self.point)
    }
}
