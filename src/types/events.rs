use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Severity;

// ============================================================================
// L1: Early-Fault Event
// ============================================================================

/// FSM output for one pipeline pass. Evidence only, not an operator alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyFaultEvent {
    /// Resulting early-fault severity
    pub state: Severity,
    /// Confidence in [0, 1], rounded to 2 decimals
    pub confidence: f64,
    /// Feature with the largest magnitude in the scored vector
    pub dominant_feature: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// L2: Diagnostic Classification
// ============================================================================

/// Fault classes the rule engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultType {
    BearingOuterRace,
    MechanicalSeverityHigh,
}

impl FaultType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BearingOuterRace => "BEARING_OUTER_RACE",
            Self::MechanicalSeverityHigh => "MECHANICAL_SEVERITY_HIGH",
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers of diagnostic rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "ISO_20816_ZONE_C")]
    Iso20816ZoneC,
    #[serde(rename = "ENVELOPE_BPFI_PEAK")]
    EnvelopeBpfiPeak,
}

impl RuleId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Iso20816ZoneC => "ISO_20816_ZONE_C",
            Self::EnvelopeBpfiPeak => "ENVELOPE_BPFI_PEAK",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the engine reached its classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub dominant_feature: Option<String>,
    pub rules_triggered: Vec<RuleId>,
    /// Metric values attached to the triggered rules
    pub metrics: BTreeMap<String, f64>,
}

/// Pure output of the diagnostic engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub fault_type: Option<FaultType>,
    pub confidence: f64,
    pub evidence: Evidence,
}

/// Published L2 result. Failed jobs publish the same shape with empty evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2ResultEvent {
    pub fault_type: Option<FaultType>,
    pub confidence: f64,
    pub evidence: Evidence,
    /// FSM severity that admitted the job
    pub triggered_by: Severity,
    pub timestamp: DateTime<Utc>,
    /// Present only on failure placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl L2ResultEvent {
    pub fn from_report(report: DiagnosticReport, triggered_by: Severity, timestamp: DateTime<Utc>) -> Self {
        Self {
            fault_type: report.fault_type,
            confidence: report.confidence,
            evidence: report.evidence,
            triggered_by,
            timestamp,
            error: None,
        }
    }

    /// Well-formed placeholder for a job that failed after being dequeued.
    pub fn failure(error: impl Into<String>, triggered_by: Severity, timestamp: DateTime<Utc>) -> Self {
        Self {
            fault_type: None,
            confidence: 0.0,
            evidence: Evidence::default(),
            triggered_by,
            timestamp,
            error: Some(error.into()),
        }
    }

    pub const fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// Liveness
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeartbeatStatus {
    Ok,
    /// No raw data within the configured staleness window
    Stale,
}

/// Periodic liveness report with pipeline counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub service: String,
    pub status: HeartbeatStatus,
    pub uptime_secs: u64,
    /// Seconds since the last raw batch, `None` before the first one
    pub last_raw_age_secs: Option<u64>,
    pub raw_batches: u64,
    pub windows_processed: u64,
    pub early_fault_events: u64,
    pub l2_enqueued: u64,
    pub l2_dropped: u64,
    pub l2_completed: u64,
    pub l2_failed: u64,
    pub timestamp: DateTime<Utc>,
}
