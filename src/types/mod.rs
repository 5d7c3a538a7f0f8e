//! Shared data structures for the vibration early-fault pipeline
//!
//! This module defines the core types passed between pipeline stages:
//! - SensorKey: one physical measurement channel (asset + point)
//! - RawBatch / RawWindow: incoming samples and the immutable analysis window
//! - FeatureVector: named L1 features computed per window
//! - Severity / TrendLevel / VelocityZone: closed state enums with wire names
//! - EarlyFaultEvent / L2ResultEvent: outbound payloads

mod key;
mod signal;
mod state;
mod events;

pub use key::*;
pub use signal::*;
pub use state::*;
pub use events::*;
