//! System-wide default constants.
//!
//! Values that are not deployment tunables live here; everything an operator
//! may want to change belongs in `AnalyticsConfig`.

// ============================================================================
// Config discovery
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "VIBRALYZER_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "vibralyzer.toml";

// ============================================================================
// Signal processing
// ============================================================================

/// Standard gravity (m/s^2) for g -> velocity integration.
pub const STANDARD_GRAVITY_M_S2: f64 = 9.806_65;

// ============================================================================
// Topics
// ============================================================================

/// Prefix of raw acceleration topics: `vibration/raw/<asset>/<point>`.
pub const RAW_TOPIC_PREFIX: &str = "vibration/raw";

pub const EARLY_FAULT_TOPIC_PREFIX: &str = "vibration/early_fault";

pub const L2_RESULT_TOPIC_PREFIX: &str = "vibration/l2_result";

pub const HEARTBEAT_TOPIC: &str = "vibration/heartbeat";

// ============================================================================
// Shutdown
// ============================================================================

/// How long shutdown waits for the in-flight diagnostic job (seconds).
pub const DIAGNOSTIC_DRAIN_TIMEOUT_SECS: u64 = 10;

/// How long shutdown waits for the output sink to flush (seconds).
pub const SINK_DRAIN_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Simulation
// ============================================================================

/// Sensor key used by `--simulate` and the generator binary.
pub const SIMULATION_ASSET: &str = "PUMP_01";
pub const SIMULATION_POINT: &str = "DE";

/// Healthy run long enough to warm the baseline, then an escalating defect.
pub const SIMULATION_SCHEDULE: &str = "healthy:120,low:5,medium:5,high:5";
