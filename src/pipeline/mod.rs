//! Processing Pipeline Module
//!
//! ```text
//! BatchSource ──► ProcessingLoop ──(key hash)──► ingest worker N
//!                                                   │
//!                                     PipelineCoordinator::on_raw_batch
//!                                                   │
//!                        Publisher ◄── EarlyFaultEvent, DiagnosticQueue ◄── WARNING/ALARM
//! ```
//!
//! CRITICAL GUARANTEE: nothing on the ingest path waits on L2 diagnosis or
//! on the output sink.

mod coordinator;
mod stats;
pub mod processing_loop;
pub mod source;

pub use coordinator::PipelineCoordinator;
pub use processing_loop::{LoopSummary, ProcessingLoop};
pub use source::{BatchEvent, BatchSource, LineSource, StdinSource, SyntheticSource};
pub use stats::{run_heartbeat, PipelineStats};
