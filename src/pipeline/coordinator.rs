//! Pipeline Coordinator - per-batch processing sequence
//!
//! ```text
//! STAGE 1: Window accumulation (every batch)
//! STAGE 2: Feature extraction (ONLY once the window is full)
//! STAGE 3: Normalize against the baseline as it stood before this window
//! STAGE 4: Trend scoring + persistence
//! STAGE 5: Early-fault FSM -> publish EarlyFaultEvent
//! STAGE 6: Gated learning (ONLY windows judged NORMAL end to end)
//! STAGE 7: L2 admission (ONLY on WARNING/ALARM, cooldown permitting)
//! ```
//!
//! Stages 2-7 for one key run under that key's pass lock, so passes for the
//! same key are strictly serialized while different keys proceed in parallel.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::PipelineStats;
use crate::baseline::AdaptiveBaseline;
use crate::config::{AnalyticsConfig, TrendDomain};
use crate::diagnostic::{CooldownGate, DiagnosticJob, DiagnosticQueue};
use crate::early_fault::{EarlyFaultFsm, PersistenceCounter, TrendDetector};
use crate::processing::{FeatureExtractor, ProcessingError, WindowBuffer};
use crate::publish::Publisher;
use crate::types::{EarlyFaultEvent, RawBatch, RawWindow, SensorKey, Severity};

/// Owns every per-key component and runs the pass sequence for one batch.
pub struct PipelineCoordinator {
    /// Stage 1
    windows: WindowBuffer,
    /// Stage 2 (shared with the L2 diagnoser)
    extractor: Arc<FeatureExtractor>,
    /// Stages 3 and 6
    baseline: AdaptiveBaseline,
    trend_domain: TrendDomain,
    /// Stage 4
    trend: TrendDetector,
    persistence: PersistenceCounter,
    /// Stage 5: authoritative per-key severity
    fsm: EarlyFaultFsm,
    /// Stage 7
    cooldown: CooldownGate,
    diagnostics: Option<DiagnosticQueue>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<PipelineStats>,
    pass_locks: DashMap<SensorKey, Arc<Mutex<()>>>,
}

impl PipelineCoordinator {
    /// Build every stage from configuration. L2 admission stays off until
    /// [`with_diagnostics`](Self::with_diagnostics) attaches a queue.
    pub fn new(config: &AnalyticsConfig, publisher: Arc<dyn Publisher>) -> Result<Self, ProcessingError> {
        let extractor = Arc::new(FeatureExtractor::new(&config.window, &config.features)?);
        info!(
            window = config.window.size,
            sampling_rate_hz = config.window.sampling_rate_hz,
            domain = ?config.trend.domain,
            "Initializing pipeline coordinator"
        );

        Ok(Self {
            windows: WindowBuffer::new(config.window.size),
            extractor,
            baseline: AdaptiveBaseline::new(&config.baseline),
            trend_domain: config.trend.domain,
            trend: TrendDetector::new(&config.trend),
            persistence: PersistenceCounter::new(),
            fsm: EarlyFaultFsm::new(&config.early_fault),
            cooldown: CooldownGate::new(&config.diagnostic),
            diagnostics: None,
            publisher,
            stats: Arc::new(PipelineStats::new()),
            pass_locks: DashMap::new(),
        })
    }

    /// Replace the empty baseline, e.g. with one restored from disk.
    #[must_use]
    pub fn with_baseline(mut self, baseline: AdaptiveBaseline) -> Self {
        self.baseline = baseline;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, queue: DiagnosticQueue) -> Self {
        self.diagnostics = Some(queue);
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: CooldownGate) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Ingestion callback. Never fails: degenerate windows are logged and
    /// end the pass without an event.
    ///
    /// Returns the event published for this pass, if the window was ready.
    pub fn on_raw_batch(&self, key: &SensorKey, batch: &RawBatch) -> Option<EarlyFaultEvent> {
        self.stats.record_raw_batch();

        let lock = Arc::clone(self.pass_locks.entry(key.clone()).or_default().value());
        let _pass = lock.lock();

        // ====================================================================
        // STAGE 1: Window accumulation
        // ====================================================================
        self.windows.append(key, &batch.samples);
        let window = self.windows.snapshot(key)?;
        self.stats.record_window();

        // ====================================================================
        // STAGE 2: Features
        // ====================================================================
        let raw = match self.extractor.extract(&window) {
            Ok(f) => f,
            Err(e) => {
                warn!(%key, error = %e, "Feature extraction failed, window skipped");
                return None;
            }
        };
        trace!(%key, features = ?raw, "Window features");

        // ====================================================================
        // STAGE 3: Normalize against the pre-update baseline
        // ====================================================================
        let normalized = self.baseline.normalize(key, &raw);
        let was_normal = self.fsm.severity(key) == Severity::Normal;

        // ====================================================================
        // STAGE 4: Trend + persistence
        // ====================================================================
        let scored = match self.trend_domain {
            TrendDomain::Normalized => &normalized,
            TrendDomain::Raw => &raw,
        };
        let trend = self.trend.update(key, scored, &raw, batch.temperature_alarm);
        let persistence = self.persistence.update(key, trend.level);
        debug!(
            %key,
            level = ?trend.level,
            score = trend.score,
            persistence,
            zone = ?trend.velocity_zone,
            "Trend evaluated"
        );

        // ====================================================================
        // STAGE 5: FSM
        // ====================================================================
        let event = self.fsm.update(key, &trend, persistence);
        self.publisher.publish_early_fault(key, &event);
        self.stats.record_early_fault_event();

        // ====================================================================
        // STAGE 6: Learn only from a window every stage judged NORMAL
        // ====================================================================
        let allow_update = was_normal && trend.level.is_normal() && event.state == Severity::Normal;
        self.baseline.update(key, &raw, allow_update);
        if !allow_update {
            trace!(%key, level = %trend.level, state = %event.state, "Baseline learning skipped");
        }

        // ====================================================================
        // STAGE 7: L2 admission
        // ====================================================================
        if let Some(queue) = &self.diagnostics {
            self.maybe_escalate(queue, key, event.state, window);
        }

        Some(event)
    }

    fn maybe_escalate(
        &self,
        queue: &DiagnosticQueue,
        key: &SensorKey,
        severity: Severity,
        window: RawWindow,
    ) {
        if !severity.is_escalation() || !self.cooldown.can_trigger(key, severity) {
            return;
        }

        let job = DiagnosticJob {
            key: key.clone(),
            window,
            triggered_by: severity,
            enqueued_at: Instant::now(),
            sink: Arc::clone(&self.publisher),
        };
        if queue.try_enqueue(job) {
            self.cooldown.mark_triggered(key);
            info!(%key, %severity, "L2 diagnosis requested");
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub const fn baseline(&self) -> &AdaptiveBaseline {
        &self.baseline
    }

    pub const fn fsm(&self) -> &EarlyFaultFsm {
        &self.fsm
    }

    pub const fn windows(&self) -> &WindowBuffer {
        &self.windows
    }

    pub const fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    pub fn extractor(&self) -> Arc<FeatureExtractor> {
        Arc::clone(&self.extractor)
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub const fn diagnostics(&self) -> Option<&DiagnosticQueue> {
        self.diagnostics.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::publish::MemoryPublisher;

    fn small_config() -> AnalyticsConfig {
        let mut config = AnalyticsConfig::default();
        config.window.size = 512;
        config.window.min_fft_len = 256;
        config
    }

    fn tone(n: usize, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * std::f64::consts::PI * 2000.0 * i as f64 / 25_600.0).sin())
            .collect()
    }

    #[test]
    fn test_no_event_until_window_full() {
        let sink = Arc::new(MemoryPublisher::new());
        let coord = PipelineCoordinator::new(&small_config(), sink.clone()).unwrap();
        let key = SensorKey::new("PUMP_01", "DE");

        assert!(coord.on_raw_batch(&key, &RawBatch::new(tone(256, 0.1))).is_none());
        assert!(sink.is_empty());
        assert!(coord.on_raw_batch(&key, &RawBatch::new(tone(256, 0.1))).is_some());
        assert_eq!(sink.early_faults(&key).len(), 1);
        assert_eq!(coord.stats().raw_batches(), 2);
        assert_eq!(coord.stats().windows_processed(), 1);
    }

    #[test]
    fn test_temperature_alarm_overrides_to_alarm() {
        let sink = Arc::new(MemoryPublisher::new());
        let coord = PipelineCoordinator::new(&small_config(), sink).unwrap();
        let key = SensorKey::new("PUMP_01", "DE");

        let batch = RawBatch::new(tone(512, 0.1)).with_temperature_alarm(true);
        let event = coord.on_raw_batch(&key, &batch).unwrap();
        assert_eq!(event.state, Severity::Alarm);
        assert_eq!(coord.fsm().severity(&key), Severity::Alarm);
    }

    #[test]
    fn test_learning_frozen_while_abnormal() {
        let sink = Arc::new(MemoryPublisher::new());
        let coord = PipelineCoordinator::new(&small_config(), sink).unwrap();
        let key = SensorKey::new("PUMP_01", "DE");

        coord.on_raw_batch(&key, &RawBatch::new(tone(512, 0.1)));
        let count = coord.baseline().stats(&key, "rms").map(|s| s.count);
        assert_eq!(count, Some(1));

        // The override window itself and every pass while ALARM latches stay out
        coord.on_raw_batch(&key, &RawBatch::new(tone(512, 0.1)).with_temperature_alarm(true));
        coord.on_raw_batch(&key, &RawBatch::new(tone(512, 0.1)));
        coord.on_raw_batch(&key, &RawBatch::new(tone(512, 0.1)));
        assert_eq!(coord.fsm().severity(&key), Severity::Alarm);
        assert_eq!(coord.baseline().stats(&key, "rms").map(|s| s.count), Some(1));
    }

    #[test]
    fn test_watch_level_windows_never_learned() {
        let mut config = small_config();
        config.trend.domain = TrendDomain::Raw;
        config.trend.watch_threshold = 0.5;
        config.trend.warning_threshold = 1.0;
        let sink = Arc::new(MemoryPublisher::new());
        let coord = PipelineCoordinator::new(&config, sink).unwrap();
        let key = SensorKey::new("PUMP_01", "DE");

        // 2 kHz at 1 g scores WATCH; two in a row never reach watch_persistence,
        // so the FSM itself stays NORMAL throughout
        let cycles = 10;
        for _ in 0..cycles {
            for amp in [1.0, 1.0, 0.01] {
                let before = coord.baseline().stats(&key, "acc_hf_rms_g").map_or(0, |s| s.count);
                let event = coord.on_raw_batch(&key, &RawBatch::new(tone(512, amp))).unwrap();
                assert_eq!(event.state, Severity::Normal);

                let after = coord.baseline().stats(&key, "acc_hf_rms_g").map_or(0, |s| s.count);
                if amp > 0.5 {
                    assert_eq!(after, before, "WATCH-level window was learned");
                } else {
                    assert_eq!(after, before + 1);
                }
            }
        }

        let stats = coord.baseline().stats(&key, "acc_hf_rms_g").unwrap();
        assert_eq!(stats.count, cycles);
        assert!(stats.mean < 0.01, "baseline drifted toward the defect: {}", stats.mean);
    }

    #[test]
    fn test_degenerate_window_is_skipped() {
        let sink = Arc::new(MemoryPublisher::new());
        let coord = PipelineCoordinator::new(&small_config(), sink.clone()).unwrap();
        let key = SensorKey::new("PUMP_01", "DE");

        let mut samples = tone(512, 0.1);
        samples[10] = f64::NAN;
        assert!(coord.on_raw_batch(&key, &RawBatch::new(samples)).is_none());
        assert!(sink.is_empty());
    }
}
