//! L2 Diagnostic path
//!
//! Escalations from the early-fault FSM are throttled per key by the
//! [`CooldownGate`], pushed onto the bounded [`DiagnosticQueue`] without
//! blocking, and processed one at a time by the [`DiagnosticWorker`], which
//! runs the rule-based [`DiagnosticEngine`] and publishes exactly one
//! [`L2ResultEvent`](crate::types::L2ResultEvent) per admitted job.

mod cooldown;
mod engine;
mod queue;

pub use cooldown::CooldownGate;
pub use engine::{DiagnosticEngine, WindowDiagnoser};
pub use queue::{DiagnosticCounts, DiagnosticQueue, DiagnosticWorker};

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::processing::ProcessingError;
use crate::publish::Publisher;
use crate::types::{DiagnosticReport, RawWindow, SensorKey, Severity};

#[derive(Error, Debug)]
pub enum DiagnosticError {
    #[error("Metric extraction failed: {0}")]
    MetricExtraction(#[from] ProcessingError),

    #[error("Diagnostic task panicked: {0}")]
    TaskPanicked(String),

    #[error("Diagnostic task cancelled")]
    TaskCancelled,
}

/// One admitted escalation, owned by the queue until the worker is done.
pub struct DiagnosticJob {
    pub key: SensorKey,
    pub window: RawWindow,
    /// FSM severity that admitted the job
    pub triggered_by: Severity,
    pub enqueued_at: Instant,
    pub sink: Arc<dyn Publisher>,
}

/// The blocking diagnosis step run by the worker.
pub trait Diagnoser: Send + Sync {
    fn diagnose(&self, window: &RawWindow) -> Result<DiagnosticReport, DiagnosticError>;
}
