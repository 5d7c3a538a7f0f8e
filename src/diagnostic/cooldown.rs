use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::DiagnosticConfig;
use crate::types::{SensorKey, Severity};

/// Per-key throttle for L2 escalations.
///
/// One last-trigger instant is shared by both severities of a key; each
/// severity compares it against its own cooldown. NORMAL and WATCH never
/// escalate.
pub struct CooldownGate {
    warning: Duration,
    alarm: Duration,
    last_trigger: DashMap<SensorKey, Instant>,
}

impl CooldownGate {
    pub fn new(config: &DiagnosticConfig) -> Self {
        Self::with_cooldowns(config.warning_cooldown(), config.alarm_cooldown())
    }

    pub fn with_cooldowns(warning: Duration, alarm: Duration) -> Self {
        Self {
            warning,
            alarm,
            last_trigger: DashMap::new(),
        }
    }

    const fn cooldown_for(&self, severity: Severity) -> Option<Duration> {
        match severity {
            Severity::Warning => Some(self.warning),
            Severity::Alarm => Some(self.alarm),
            Severity::Normal | Severity::Watch => None,
        }
    }

    pub fn can_trigger(&self, key: &SensorKey, severity: Severity) -> bool {
        self.can_trigger_at(key, severity, Instant::now())
    }

    /// Whether an escalation at `severity` is allowed at `now`.
    ///
    /// Does not record anything; call [`Self::mark_triggered`] once the job
    /// has actually been admitted.
    pub fn can_trigger_at(&self, key: &SensorKey, severity: Severity, now: Instant) -> bool {
        let Some(cooldown) = self.cooldown_for(severity) else {
            return false;
        };
        match self.last_trigger.get(key) {
            None => true,
            Some(last) => {
                let elapsed = now.saturating_duration_since(*last);
                if elapsed >= cooldown {
                    true
                } else {
                    debug!(
                        %key,
                        %severity,
                        cooldown_remaining_ms = (cooldown - elapsed).as_millis(),
                        "L2 escalation suppressed by cooldown"
                    );
                    false
                }
            }
        }
    }

    pub fn mark_triggered(&self, key: &SensorKey) {
        self.mark_triggered_at(key, Instant::now());
    }

    pub fn mark_triggered_at(&self, key: &SensorKey, now: Instant) {
        self.last_trigger.insert(key.clone(), now);
    }
}
