use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PipelineCoordinator;
use crate::diagnostic::DiagnosticCounts;
use crate::publish::Publisher;
use crate::types::{Heartbeat, HeartbeatStatus};

/// Shared pipeline counters, updated from every ingest worker.
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    raw_batches: AtomicU64,
    windows_processed: AtomicU64,
    early_fault_events: AtomicU64,
    last_raw: Mutex<Option<Instant>>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            raw_batches: AtomicU64::new(0),
            windows_processed: AtomicU64::new(0),
            early_fault_events: AtomicU64::new(0),
            last_raw: Mutex::new(None),
        }
    }

    pub fn record_raw_batch(&self) {
        self.record_raw_batch_at(Instant::now());
    }

    pub fn record_raw_batch_at(&self, now: Instant) {
        self.raw_batches.fetch_add(1, Ordering::Relaxed);
        *self.last_raw.lock() = Some(now);
    }

    /// A full window reached feature extraction.
    pub fn record_window(&self) {
        self.windows_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_early_fault_event(&self) {
        self.early_fault_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn raw_batches(&self) -> u64 {
        self.raw_batches.load(Ordering::Relaxed)
    }

    pub fn windows_processed(&self) -> u64 {
        self.windows_processed.load(Ordering::Relaxed)
    }

    pub fn early_fault_events(&self) -> u64 {
        self.early_fault_events.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, service: &str, stale_after: Duration, l2: DiagnosticCounts) -> Heartbeat {
        self.snapshot_at(service, stale_after, l2, Instant::now())
    }

    /// Heartbeat payload as of `now`. OK until the first raw batch arrives,
    /// then STALE whenever the newest one is at least `stale_after` old.
    pub fn snapshot_at(
        &self,
        service: &str,
        stale_after: Duration,
        l2: DiagnosticCounts,
        now: Instant,
    ) -> Heartbeat {
        let last_raw_age = (*self.last_raw.lock()).map(|t| now.saturating_duration_since(t));
        let status = match last_raw_age {
            Some(age) if age >= stale_after => HeartbeatStatus::Stale,
            _ => HeartbeatStatus::Ok,
        };

        Heartbeat {
            service: service.to_string(),
            status,
            uptime_secs: now.saturating_duration_since(self.started).as_secs(),
            last_raw_age_secs: last_raw_age.map(|a| a.as_secs()),
            raw_batches: self.raw_batches(),
            windows_processed: self.windows_processed(),
            early_fault_events: self.early_fault_events(),
            l2_enqueued: l2.enqueued,
            l2_dropped: l2.dropped,
            l2_completed: l2.completed,
            l2_failed: l2.failed,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} raw batches, {} windows, {} early-fault events",
            self.raw_batches(),
            self.windows_processed(),
            self.early_fault_events()
        )
    }
}

// ============================================================================
// Heartbeat Task
// ============================================================================

/// Publish a heartbeat every `interval` until cancelled, plus one final
/// heartbeat on the way out.
pub async fn run_heartbeat(
    coordinator: Arc<PipelineCoordinator>,
    publisher: Arc<dyn Publisher>,
    service: String,
    interval: Duration,
    stale_after: Duration,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs_f64(), "[Heartbeat] Task starting");
    let stats = coordinator.stats();
    let l2_counts = || coordinator.diagnostics().map(|q| q.counts()).unwrap_or_default();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let hb = stats.snapshot(&service, stale_after, l2_counts());
                debug!(status = ?hb.status, raw_batches = hb.raw_batches, "Heartbeat");
                publisher.publish_heartbeat(&hb);
            }
        }
    }

    publisher.publish_heartbeat(&stats.snapshot(&service, stale_after, l2_counts()));
    info!("[Heartbeat] Task stopped");
}
