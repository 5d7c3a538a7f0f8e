use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DiagnosticError, Diagnoser};
use crate::config::DiagnosticConfig;
use crate::processing::FeatureExtractor;
use crate::types::{
    dominant_feature, feature_names, DiagnosticReport, Evidence, FaultType, FeatureVector,
    RawWindow, RuleId,
};

/// Deterministic rule evaluation over a metrics snapshot.
///
/// | Rule | Condition |
/// |---|---|
/// | `ISO_20816_ZONE_C` | `overall_vel_rms_mm_s > zone_c_velocity_mm_s` |
/// | `ENVELOPE_BPFI_PEAK` | `envelope_rms > envelope_rms_threshold` |
///
/// The envelope rule outranks the velocity rule when classifying.
#[derive(Debug, Clone)]
pub struct DiagnosticEngine {
    zone_c_velocity_mm_s: f64,
    envelope_rms_threshold: f64,
}

impl DiagnosticEngine {
    pub const fn new(config: &DiagnosticConfig) -> Self {
        Self {
            zone_c_velocity_mm_s: config.zone_c_velocity_mm_s,
            envelope_rms_threshold: config.envelope_rms_threshold,
        }
    }

    pub fn run(&self, metrics: &FeatureVector) -> DiagnosticReport {
        let mut rules_triggered = Vec::new();
        let mut attached = BTreeMap::new();

        let rules = [
            (
                RuleId::Iso20816ZoneC,
                feature_names::OVERALL_VEL_RMS_MM_S,
                self.zone_c_velocity_mm_s,
            ),
            (
                RuleId::EnvelopeBpfiPeak,
                feature_names::ENVELOPE_RMS,
                self.envelope_rms_threshold,
            ),
        ];
        for (rule, metric, threshold) in rules {
            if let Some(&value) = metrics.get(metric) {
                if value > threshold {
                    rules_triggered.push(rule);
                    attached.insert(metric.to_string(), value);
                }
            }
        }

        let fault_type = if rules_triggered.contains(&RuleId::EnvelopeBpfiPeak) {
            Some(FaultType::BearingOuterRace)
        } else if rules_triggered.contains(&RuleId::Iso20816ZoneC) {
            Some(FaultType::MechanicalSeverityHigh)
        } else {
            None
        };

        let confidence = if rules_triggered.is_empty() {
            0.0
        } else {
            (0.6 + 0.2 * rules_triggered.len() as f64).min(1.0)
        };

        DiagnosticReport {
            fault_type,
            confidence,
            evidence: Evidence {
                dominant_feature: dominant_feature(&attached),
                rules_triggered,
                metrics: attached,
            },
        }
    }
}

/// Recomputes metrics from the raw window, then runs the engine.
pub struct WindowDiagnoser {
    engine: DiagnosticEngine,
    extractor: Arc<FeatureExtractor>,
}

impl WindowDiagnoser {
    pub fn new(engine: DiagnosticEngine, extractor: Arc<FeatureExtractor>) -> Self {
        Self { engine, extractor }
    }
}

impl Diagnoser for WindowDiagnoser {
    fn diagnose(&self, window: &RawWindow) -> Result<DiagnosticReport, DiagnosticError> {
        let metrics = self.extractor.extract(window)?;
        Ok(self.engine.run(&metrics))
    }
}
