use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Early-Fault Severity
// ============================================================================

/// Per-key early-fault severity produced by the FSM.
///
/// Ordered so that `Normal < Watch < Warning < Alarm`; escalation is a max,
/// de-escalation is [`Severity::step_down`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Normal,
    Watch,
    Warning,
    Alarm,
}

impl Severity {
    /// Wire representation (matches the serde encoding).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Watch => "WATCH",
            Self::Warning => "WARNING",
            Self::Alarm => "ALARM",
        }
    }

    /// One severity step lower; `Normal` stays `Normal`.
    pub const fn step_down(self) -> Self {
        match self {
            Self::Alarm => Self::Warning,
            Self::Warning => Self::Watch,
            Self::Watch | Self::Normal => Self::Normal,
        }
    }

    /// Contribution of the resulting state to the confidence score.
    pub const fn state_score(self) -> f64 {
        match self {
            Self::Normal => 0.2,
            Self::Watch => 0.5,
            Self::Warning => 0.75,
            Self::Alarm => 1.0,
        }
    }

    /// Whether this severity may escalate to an L2 diagnosis.
    pub const fn is_escalation(self) -> bool {
        matches!(self, Self::Warning | Self::Alarm)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Trend Level
// ============================================================================

/// Coarse trend classification of a single feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendLevel {
    #[default]
    Normal,
    Watch,
    Warning,
}

impl TrendLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Watch => "WATCH",
            Self::Warning => "WARNING",
        }
    }

    pub const fn is_normal(self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl fmt::Display for TrendLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ISO 10816 / 20816 Velocity Zone
// ============================================================================

/// Vibration severity zone from overall velocity RMS.
///
/// - Zone A: newly commissioned machines
/// - Zone B: unrestricted long-term operation
/// - Zone C: limited-period operation only
/// - Zone D: severe enough to cause damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VelocityZone {
    #[default]
    A,
    B,
    C,
    D,
}

impl VelocityZone {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for VelocityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
