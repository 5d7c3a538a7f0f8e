//! Early-fault detection (L1)
//!
//! Turns each feature vector into a per-key severity with hysteresis:
//!
//! ```text
//! features ─► TrendDetector ─► PersistenceCounter ─► EarlyFaultFsm ─► EarlyFaultEvent
//!              (level, flags)    (consecutive          (NORMAL/WATCH/
//!                                 non-normal)           WARNING/ALARM)
//! ```
//!
//! All three components key their state by `SensorKey` in concurrent maps.
//! Callers must serialize passes for one key; different keys may run in
//! parallel.

mod fsm;
mod persistence;
mod trend;

pub use fsm::{EarlyFaultFsm, TransitionReason};
pub use persistence::PersistenceCounter;
pub use trend::{TrendDetector, TrendResult};
