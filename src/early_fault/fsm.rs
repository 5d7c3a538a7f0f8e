use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use tracing::{debug, info};

use super::TrendResult;
use crate::config::EarlyFaultConfig;
use crate::types::{EarlyFaultEvent, SensorKey, Severity, VelocityZone};

// ============================================================================
// Transition rules
// ============================================================================

/// The rule that matched on an update, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    TemperatureOverride,
    VelocityZoneD,
    HfEnvelopeAlarmPersistence,
    HfEnvelopeWarningPersistence,
    VelocityZoneC,
    HfWatchPersistence,
}

impl TransitionReason {
    pub const fn target(self) -> Severity {
        match self {
            Self::TemperatureOverride | Self::VelocityZoneD | Self::HfEnvelopeAlarmPersistence => {
                Severity::Alarm
            }
            Self::HfEnvelopeWarningPersistence | Self::VelocityZoneC => Severity::Warning,
            Self::HfWatchPersistence => Severity::Watch,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TemperatureOverride => "temperature_alarm",
            Self::VelocityZoneD => "velocity_zone_d",
            Self::HfEnvelopeAlarmPersistence => "hf_envelope_alarm_persistence",
            Self::HfEnvelopeWarningPersistence => "hf_envelope_warning_persistence",
            Self::VelocityZoneC => "velocity_zone_c",
            Self::HfWatchPersistence => "hf_watch_persistence",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FsmState {
    severity: Severity,
    /// Consecutive NORMAL trends since the last non-normal observation
    clear_counter: u32,
}

// ============================================================================
// Early-Fault FSM
// ============================================================================

/// Hysteretic per-key severity machine.
///
/// Rules only ever raise severity. Lowering happens one step at a time after
/// `hysteresis_clear` consecutive NORMAL trends with no rule matching.
pub struct EarlyFaultFsm {
    config: EarlyFaultConfig,
    states: DashMap<SensorKey, FsmState>,
}

impl EarlyFaultFsm {
    pub fn new(config: &EarlyFaultConfig) -> Self {
        Self {
            config: config.clone(),
            states: DashMap::new(),
        }
    }

    pub fn update(&self, key: &SensorKey, trend: &TrendResult, persistence: u32) -> EarlyFaultEvent {
        self.update_at(key, trend, persistence, Utc::now())
    }

    /// Advance the key's state once and build the resulting event.
    pub fn update_at(
        &self,
        key: &SensorKey,
        trend: &TrendResult,
        persistence: u32,
        timestamp: DateTime<Utc>,
    ) -> EarlyFaultEvent {
        let matched = self.evaluate(trend, persistence);

        let (previous, current) = {
            let mut state = self.states.entry(key.clone()).or_default();
            let previous = state.severity;
            match matched {
                Some(rule) => {
                    state.severity = state.severity.max(rule.target());
                    state.clear_counter = 0;
                }
                None if trend.level.is_normal() => {
                    state.clear_counter = state.clear_counter.saturating_add(1);
                    if state.clear_counter >= self.config.hysteresis_clear {
                        state.severity = state.severity.step_down();
                        state.clear_counter = 0;
                    }
                }
                None => state.clear_counter = 0,
            }
            (previous, state.severity)
        };

        let confidence = self.confidence(trend, persistence, current);

        if current == previous {
            debug!(
                %key,
                state = %current,
                confidence,
                persistence,
                trend = %trend.level,
                "Early-fault state held"
            );
        } else {
            info!(
                %key,
                from = %previous,
                to = %current,
                reason = matched.map_or("hysteresis_clear", TransitionReason::as_str),
                confidence,
                persistence,
                "Early-fault state changed"
            );
        }

        EarlyFaultEvent {
            state: current,
            confidence,
            dominant_feature: trend.dominant_feature.clone(),
            timestamp,
        }
    }

    /// First matching rule, or `None`.
    fn evaluate(&self, trend: &TrendResult, persistence: u32) -> Option<TransitionReason> {
        let c = &self.config;
        let hf_env = trend.hf_high && trend.envelope_high;

        if trend.temperature_alarm {
            Some(TransitionReason::TemperatureOverride)
        } else if trend.velocity_zone == VelocityZone::D {
            Some(TransitionReason::VelocityZoneD)
        } else if hf_env && persistence >= c.alarm_persistence {
            Some(TransitionReason::HfEnvelopeAlarmPersistence)
        } else if hf_env && persistence >= c.warning_persistence {
            Some(TransitionReason::HfEnvelopeWarningPersistence)
        } else if trend.velocity_zone == VelocityZone::C {
            Some(TransitionReason::VelocityZoneC)
        } else if trend.hf_high && persistence >= c.watch_persistence {
            Some(TransitionReason::HfWatchPersistence)
        } else {
            None
        }
    }

    /// `0.4*severity + 0.4*persistence + 0.2*state`, clamped and rounded to 2 dp.
    fn confidence(&self, trend: &TrendResult, persistence: u32, state: Severity) -> f64 {
        let severity_score = if matches!(trend.velocity_zone, VelocityZone::C | VelocityZone::D) {
            1.0
        } else if trend.envelope_high {
            0.7
        } else if trend.hf_high {
            0.4
        } else {
            0.0
        };
        let persistence_score =
            (f64::from(persistence) / f64::from(self.config.alarm_persistence.max(1))).min(1.0);

        let raw = 0.4 * severity_score + 0.4 * persistence_score + 0.2 * state.state_score();
        (raw.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }

    /// Current severity; keys never seen are NORMAL.
    pub fn severity(&self, key: &SensorKey) -> Severity {
        self.states.get(key).map_or(Severity::Normal, |s| s.severity)
    }

    pub fn clear_counter(&self, key: &SensorKey) -> u32 {
        self.states.get(key).map_or(0, |s| s.clear_counter)
    }

    pub fn key_count(&self) -> usize {
        self.states.len()
    }
}
