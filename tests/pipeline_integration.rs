//! Pipeline Integration Tests
//!
//! Drives the full L1 pass (window → features → baseline → trend → FSM) and
//! the L2 escalation path with synthetic, bin-aligned signals whose feature
//! values are known in advance:
//!
//! - bearing defect: 3 kHz carrier, 80% AM at 100 Hz → `acc_hf_rms_g` ≈ 0.81,
//!   `envelope_rms` ≈ 0.57, velocity ≈ 0.4 mm/s (zone A)
//! - quiet: 3 kHz at 0.01 g → every indicator far below threshold
//! - low-frequency tones at 50 Hz for ISO velocity zones C and D

use async_trait::async_trait;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use vibralyzer::config::{AnalyticsConfig, TrendDomain};
use vibralyzer::diagnostic::{CooldownGate, DiagnosticEngine, DiagnosticWorker, WindowDiagnoser};
use vibralyzer::pipeline::{BatchEvent, BatchSource, PipelineCoordinator, ProcessingLoop};
use vibralyzer::processing::WindowBuffer;
use vibralyzer::publish::{ChannelPublisher, JsonLineSink, MemoryPublisher, OutboundMessage, Publisher};
use vibralyzer::types::{FaultType, RawBatch, RuleId, SensorKey, Severity};

const FS: f64 = 25_600.0;
const N: usize = 4096;

// ============================================================================
// Signal helpers
// ============================================================================

fn tone(freq_hz: f64, amp_g: f64) -> Vec<f64> {
    (0..N)
        .map(|i| amp_g * (2.0 * PI * freq_hz * i as f64 / FS).sin())
        .collect()
}

fn bearing_defect() -> Vec<f64> {
    (0..N)
        .map(|i| {
            let t = i as f64 / FS;
            (1.0 + 0.8 * (2.0 * PI * 100.0 * t).sin()) * (2.0 * PI * 3000.0 * t).sin()
        })
        .collect()
}

fn quiet() -> Vec<f64> {
    tone(3000.0, 0.01)
}

/// Raw-domain scoring so the trend reacts without a warm baseline.
fn test_config() -> AnalyticsConfig {
    let mut config = AnalyticsConfig::default();
    config.trend.domain = TrendDomain::Raw;
    config.trend.watch_threshold = 0.5;
    config.trend.warning_threshold = 1.0;
    config.trend.envelope_threshold = 0.3;
    config.validate().unwrap();
    config
}

fn pump() -> SensorKey {
    SensorKey::new("PUMP_01", "DE")
}

async fn wait_for_l2(sink: &MemoryPublisher, n: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while sink.l2_results().len() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("L2 result not published in time");
}

/// Replays a fixed list of batches.
struct VecSource(std::vec::IntoIter<(SensorKey, RawBatch)>);

#[async_trait]
impl BatchSource for VecSource {
    async fn next_batch(&mut self) -> anyhow::Result<BatchEvent> {
        Ok(match self.0.next() {
            Some((key, batch)) => BatchEvent::Batch(key, batch),
            None => BatchEvent::Eof,
        })
    }

    fn source_name(&self) -> &str {
        "vec"
    }
}

// ============================================================================
// Window retention
// ============================================================================

#[test]
fn window_retains_last_w_samples_in_order() {
    let buffer = WindowBuffer::new(5);
    let key = pump();
    buffer.append(&key, &[1.0, 2.0, 3.0]);
    assert!(buffer.snapshot(&key).is_none());
    buffer.append(&key, &[4.0, 5.0, 6.0, 7.0]);

    let window = buffer.snapshot(&key).unwrap();
    assert_eq!(window.samples(), &[3.0, 4.0, 5.0, 6.0, 7.0]);
    assert_eq!(buffer.len(&key), 5);
}

// ============================================================================
// L1 escalation + L2
// ============================================================================

#[tokio::test]
async fn sustained_bearing_defect_escalates_and_is_diagnosed_once() {
    let config = test_config();
    let sink = Arc::new(MemoryPublisher::new());
    let coordinator = PipelineCoordinator::new(&config, sink.clone()).unwrap();

    let diagnoser = WindowDiagnoser::new(DiagnosticEngine::new(&config.diagnostic), coordinator.extractor());
    let (worker, queue) = DiagnosticWorker::new(config.diagnostic.queue_capacity, Arc::new(diagnoser));
    let coordinator = coordinator.with_diagnostics(queue);

    let cancel = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let key = pump();
    let states: Vec<Severity> = (0..8)
        .map(|_| coordinator.on_raw_batch(&key, &RawBatch::new(bearing_defect())).unwrap().state)
        .collect();

    use Severity::{Alarm, Normal, Warning, Watch};
    assert_eq!(
        states,
        vec![Normal, Normal, Watch, Watch, Warning, Warning, Warning, Alarm]
    );

    // WARNING at pass 5 admits one job; ALARM at pass 8 is still inside the
    // shared cooldown window
    wait_for_l2(&sink, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    worker_task.await.unwrap();

    let results = sink.l2_results();
    assert_eq!(results.len(), 1);
    let (result_key, event) = &results[0];
    assert_eq!(result_key, &key);
    assert!(!event.is_failure());
    assert_eq!(event.triggered_by, Severity::Warning);
    assert_eq!(event.fault_type, Some(FaultType::BearingOuterRace));
    assert_eq!(event.evidence.rules_triggered, vec![RuleId::EnvelopeBpfiPeak]);
    assert!((event.confidence - 0.8).abs() < 1e-12);
    assert_eq!(event.evidence.dominant_feature.as_deref(), Some("envelope_rms"));
    assert!(event.evidence.metrics["envelope_rms"] > 0.35);

    let counts = coordinator.diagnostics().unwrap().counts();
    assert_eq!(counts.enqueued, 1);
    assert_eq!(counts.completed, 1);
}

#[test]
fn alarm_clears_one_step_per_hysteresis_window() {
    let config = test_config();
    let sink = Arc::new(MemoryPublisher::new());
    let coordinator = PipelineCoordinator::new(&config, sink).unwrap();
    let key = pump();

    let first = coordinator
        .on_raw_batch(&key, &RawBatch::new(quiet()).with_temperature_alarm(true))
        .unwrap();
    assert_eq!(first.state, Severity::Alarm);

    let states: Vec<Severity> = (0..10)
        .map(|_| coordinator.on_raw_batch(&key, &RawBatch::new(quiet())).unwrap().state)
        .collect();

    use Severity::{Alarm, Normal, Warning, Watch};
    assert_eq!(
        states,
        vec![Alarm, Alarm, Warning, Warning, Warning, Watch, Watch, Watch, Normal, Normal]
    );
}

#[test]
fn velocity_zones_drive_overrides_without_persistence() {
    let config = test_config();
    let sink = Arc::new(MemoryPublisher::new());
    let coordinator = PipelineCoordinator::new(&config, sink).unwrap();

    // ≈ 9.9 mm/s RMS → zone C
    let zone_c = SensorKey::new("FAN_02", "NDE");
    let event = coordinator.on_raw_batch(&zone_c, &RawBatch::new(tone(50.0, 0.45))).unwrap();
    assert_eq!(event.state, Severity::Warning);

    // ≈ 44 mm/s RMS → zone D
    let zone_d = SensorKey::new("FAN_02", "DE");
    let event = coordinator.on_raw_batch(&zone_d, &RawBatch::new(tone(50.0, 2.0))).unwrap();
    assert_eq!(event.state, Severity::Alarm);
    assert!(event.confidence >= 0.6, "{}", event.confidence);
}

#[test]
fn full_queue_never_blocks_ingest() {
    let config = test_config();
    let sink = Arc::new(MemoryPublisher::new());
    let coordinator = PipelineCoordinator::new(&config, sink.clone()).unwrap();

    let diagnoser = WindowDiagnoser::new(DiagnosticEngine::new(&config.diagnostic), coordinator.extractor());
    // Worker never runs: the queue only fills
    let (_worker, queue) = DiagnosticWorker::new(1, Arc::new(diagnoser));
    let coordinator = coordinator
        .with_diagnostics(queue)
        .with_cooldown(CooldownGate::with_cooldowns(Duration::ZERO, Duration::ZERO));

    for i in 0..5 {
        let key = SensorKey::new("LINE", format!("P{i}"));
        let event = coordinator
            .on_raw_batch(&key, &RawBatch::new(quiet()).with_temperature_alarm(true))
            .unwrap();
        assert_eq!(event.state, Severity::Alarm);
    }

    let counts = coordinator.diagnostics().unwrap().counts();
    assert_eq!(counts.enqueued, 1);
    assert_eq!(counts.dropped, 4);
    assert_eq!(coordinator.diagnostics().unwrap().len(), 1);
    assert_eq!(sink.messages().len(), 5);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keys_are_isolated_and_ordered_across_workers() {
    let mut config = test_config();
    config.ingest.workers = 4;
    let sink = Arc::new(MemoryPublisher::new());
    let coordinator = Arc::new(PipelineCoordinator::new(&config, sink.clone()).unwrap());

    let faulty: Vec<SensorKey> = (0..3).map(|i| SensorKey::new("PUMP", format!("F{i}"))).collect();
    let healthy = SensorKey::new("PUMP", "OK");

    // Interleave keys batch by batch
    let mut batches = Vec::new();
    for _ in 0..8 {
        for key in &faulty {
            batches.push((key.clone(), RawBatch::new(bearing_defect())));
        }
        batches.push((healthy.clone(), RawBatch::new(quiet())));
    }
    let mut source = VecSource(batches.into_iter());

    let summary = ProcessingLoop::new(Arc::clone(&coordinator), &config.ingest, CancellationToken::new())
        .run(&mut source)
        .await;
    assert_eq!(summary.batches_read, 32);

    use Severity::{Alarm, Normal, Warning, Watch};
    for key in &faulty {
        let states: Vec<Severity> = sink.early_faults(key).into_iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![Normal, Normal, Watch, Watch, Warning, Warning, Warning, Alarm],
            "{key}"
        );
    }
    let healthy_states: Vec<Severity> = sink.early_faults(&healthy).into_iter().map(|e| e.state).collect();
    assert_eq!(healthy_states, vec![Normal; 8]);
    assert_eq!(coordinator.fsm().key_count(), 4);
    assert_eq!(coordinator.stats().raw_batches(), 32);
}

// ============================================================================
// Output surface
// ============================================================================

#[tokio::test]
async fn events_reach_the_json_line_sink() {
    let config = test_config();
    let (publisher, rx) = ChannelPublisher::new(config.publish.channel_capacity);
    let publisher: Arc<dyn Publisher> = Arc::new(publisher);
    let coordinator = PipelineCoordinator::new(&config, Arc::clone(&publisher)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let file = tokio::fs::File::create(&path).await.unwrap();
    let cancel = CancellationToken::new();
    let sink_task = tokio::spawn(JsonLineSink::new(rx, file).run(cancel.clone()));

    let key = pump();
    coordinator.on_raw_batch(&key, &RawBatch::new(quiet()).with_temperature_alarm(true));
    coordinator.on_raw_batch(&key, &RawBatch::new(quiet()));

    cancel.cancel();
    let written = sink_task.await.unwrap().unwrap();
    assert_eq!(written, 2);

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["topic"], "vibration/early_fault/PUMP_01/DE");
    assert_eq!(lines[0]["payload"]["state"], "ALARM");
    assert!(lines[1]["payload"]["confidence"].is_number());

    let round_trip = OutboundMessage::EarlyFault {
        key: key.clone(),
        event: serde_json::from_value(lines[0]["payload"].clone()).unwrap(),
    };
    assert_eq!(round_trip.topic(), "vibration/early_fault/PUMP_01/DE");
}
