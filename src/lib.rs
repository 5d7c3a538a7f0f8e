//! Vibralyzer: edge vibration analytics
//!
//! Streams raw accelerometer batches through a per-sensor early-fault
//! pipeline and escalates sustained degradation to an asynchronous,
//! rule-based deep diagnosis.
//!
//! ## Architecture
//!
//! - **Processing**: sliding windows, FFT band energies, envelope, velocity
//! - **Baseline**: per-key EWMA mean/variance with gated learning
//! - **Early Fault**: trend scoring, persistence and the hysteretic FSM
//! - **Diagnostic**: cooldown gate, bounded L2 queue, deterministic rule engine
//! - **Pipeline**: coordinator, sharded ingest loop, sources, heartbeat
//! - **Publish**: non-blocking output capability and JSON line sink

pub mod baseline;
pub mod config;
pub mod diagnostic;
pub mod early_fault;
pub mod pipeline;
pub mod processing;
pub mod publish;
pub mod simulation;
pub mod types;

// Re-export config
pub use config::AnalyticsConfig;

// Re-export commonly used types
pub use types::{
    DiagnosticReport, EarlyFaultEvent, FaultType, FeatureVector, Heartbeat, L2ResultEvent,
    RawBatch, RawWindow, RuleId, SensorKey, Severity, TrendLevel, VelocityZone,
};

// Re-export pipeline components
pub use pipeline::{PipelineCoordinator, PipelineStats, ProcessingLoop};

// Re-export publishing
pub use publish::{MemoryPublisher, Publisher};
