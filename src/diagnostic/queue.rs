use chrono::Utc;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DiagnosticError, DiagnosticJob, Diagnoser};
use crate::types::L2ResultEvent;

// ============================================================================
// Counters
// ============================================================================

#[derive(Default)]
struct DiagnosticCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the L2 counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticCounts {
    pub enqueued: u64,
    /// Rejected on enqueue (queue full or closed)
    pub dropped: u64,
    pub completed: u64,
    /// Published as failure placeholders
    pub failed: u64,
}

// ============================================================================
// Queue Handle
// ============================================================================

/// Non-blocking submission side of the L2 queue.
///
/// Bounded FIFO: a full queue rejects the job immediately instead of making
/// the ingest path wait.
#[derive(Clone)]
pub struct DiagnosticQueue {
    tx: mpsc::Sender<DiagnosticJob>,
    closed: Arc<AtomicBool>,
    counters: Arc<DiagnosticCounters>,
}

impl DiagnosticQueue {
    /// Returns `false` (and drops the job) when the queue is full or closed.
    pub fn try_enqueue(&self, job: DiagnosticJob) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %job.key, "L2 queue closed, job rejected");
            return false;
        }

        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                debug!(depth = self.len(), "L2 job enqueued");
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    key = %job.key,
                    severity = %job.triggered_by,
                    capacity = self.capacity(),
                    dropped,
                    "L2 queue full, job dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(key = %job.key, "L2 worker gone, job dropped");
                false
            }
        }
    }

    /// Jobs waiting in the queue (the job being processed is not counted).
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Stop accepting jobs. Already queued jobs are left for the worker.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(pending = self.len(), "L2 queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn counts(&self) -> DiagnosticCounts {
        DiagnosticCounts {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// The single consumer of the L2 queue.
pub struct DiagnosticWorker {
    rx: mpsc::Receiver<DiagnosticJob>,
    diagnoser: Arc<dyn Diagnoser>,
    counters: Arc<DiagnosticCounters>,
}

impl DiagnosticWorker {
    /// Create the worker and the queue handle that feeds it.
    pub fn new(capacity: usize, diagnoser: Arc<dyn Diagnoser>) -> (Self, DiagnosticQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(DiagnosticCounters::default());

        let worker = Self {
            rx,
            diagnoser,
            counters: Arc::clone(&counters),
        };
        let queue = DiagnosticQueue {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            counters,
        };
        (worker, queue)
    }

    /// Process jobs in arrival order until cancelled or every handle is dropped.
    ///
    /// A job already picked up when `cancel` fires runs to completion; jobs
    /// still queued at that point are discarded.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("L2 diagnostic worker starting");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => self.process(job).await,
                    None => break,
                },
            }
        }

        self.rx.close();
        let mut discarded = 0usize;
        while let Ok(job) = self.rx.try_recv() {
            debug!(key = %job.key, "Discarding queued L2 job");
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "Queued L2 jobs discarded on shutdown");
        }

        info!(
            completed = self.counters.completed.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            "L2 diagnostic worker stopped"
        );
    }

    /// Run one job and publish exactly one result for it.
    async fn process(&self, job: DiagnosticJob) {
        let DiagnosticJob {
            key,
            window,
            triggered_by,
            enqueued_at,
            sink,
        } = job;

        let queued_ms = enqueued_at.elapsed().as_millis();
        let started = Instant::now();
        let diagnoser = Arc::clone(&self.diagnoser);

        let outcome = tokio::task::spawn_blocking(move || diagnoser.diagnose(&window))
            .await
            .unwrap_or_else(|e| {
                Err(if e.is_panic() {
                    DiagnosticError::TaskPanicked(panic_message(e.into_panic()))
                } else {
                    DiagnosticError::TaskCancelled
                })
            });

        let event = match outcome {
            Ok(report) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    %key,
                    severity = %triggered_by,
                    fault_type = report.fault_type.map_or("none", |f| f.as_str()),
                    confidence = report.confidence,
                    rules = report.evidence.rules_triggered.len(),
                    queued_ms,
                    elapsed_ms = started.elapsed().as_millis(),
                    "L2 diagnosis complete"
                );
                L2ResultEvent::from_report(report, triggered_by, Utc::now())
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(%key, severity = %triggered_by, error = %e, "L2 diagnosis failed, publishing placeholder");
                L2ResultEvent::failure(e.to_string(), triggered_by, Utc::now())
            }
        };

        sink.publish_l2_result(&key, &event);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
