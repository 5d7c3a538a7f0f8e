//! Analytics Configuration - every pipeline tunable as a TOML value
//!
//! Each section implements `Default` so a partial (or absent) file still
//! yields a complete configuration. Thresholds are deployment configuration,
//! not universal constants: the defaults below are starting points.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::{CONFIG_ENV_VAR, LOCAL_CONFIG_FILE};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one edge deployment.
///
/// Load with `AnalyticsConfig::load()` which searches:
/// 1. `$VIBRALYZER_CONFIG` env var
/// 2. `./vibralyzer.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub baseline: BaselineConfig,

    #[serde(default)]
    pub trend: TrendConfig,

    #[serde(default)]
    pub early_fault: EarlyFaultConfig,

    #[serde(default)]
    pub diagnostic: DiagnosticConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

impl AnalyticsConfig {
    /// Load configuration using the standard search order.
    ///
    /// Invalid files are logged and skipped; the next source is tried.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), service = %config.service.name, "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(service = %config.service.name, "Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found - using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings only; invalid values are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file (used by `--dump-config`).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let w = &self.window;
        if w.min_fft_len < 2 {
            errors.push("window.min_fft_len must be >= 2".to_string());
        }
        if w.size < w.min_fft_len {
            errors.push(format!(
                "window.size ({}) must be >= window.min_fft_len ({})",
                w.size, w.min_fft_len
            ));
        }
        if !(w.sampling_rate_hz.is_finite() && w.sampling_rate_hz > 0.0) {
            errors.push(format!(
                "window.sampling_rate_hz must be a positive number, got {}",
                w.sampling_rate_hz
            ));
        }

        Self::check_band(&self.features.low_band, "features.low_band", &mut errors);
        Self::check_band(&self.features.high_band, "features.high_band", &mut errors);

        let b = &self.baseline;
        if !(b.alpha > 0.0 && b.alpha <= 1.0) {
            errors.push(format!("baseline.alpha must be in (0, 1], got {}", b.alpha));
        }
        if b.min_samples == 0 {
            errors.push("baseline.min_samples must be > 0".to_string());
        }
        if !(b.variance_floor.is_finite() && b.variance_floor > 0.0) {
            errors.push(format!(
                "baseline.variance_floor must be a positive number, got {}",
                b.variance_floor
            ));
        }

        let t = &self.trend;
        Self::check_escalation(t.watch_threshold, t.warning_threshold, "trend.threshold", &mut errors);
        if !t.envelope_threshold.is_finite() {
            errors.push("trend.envelope_threshold must be finite".to_string());
        }
        if t.score_feature.is_empty() {
            errors.push("trend.score_feature must not be empty".to_string());
        }
        if t.history_size == 0 {
            errors.push("trend.history_size must be > 0".to_string());
        }
        let z = &t.velocity_zones;
        if !(z.ab_mm_s.is_finite() && z.bc_mm_s.is_finite() && z.cd_mm_s.is_finite()) {
            errors.push("trend.velocity_zones boundaries must be finite".to_string());
        } else if !(0.0 < z.ab_mm_s && z.ab_mm_s < z.bc_mm_s && z.bc_mm_s < z.cd_mm_s) {
            errors.push(format!(
                "trend.velocity_zones must be strictly ascending and positive (got {:.2} / {:.2} / {:.2})",
                z.ab_mm_s, z.bc_mm_s, z.cd_mm_s
            ));
        }

        let f = &self.early_fault;
        if f.watch_persistence == 0 || f.warning_persistence == 0 || f.alarm_persistence == 0 {
            errors.push("early_fault persistence thresholds must be > 0".to_string());
        }
        if !(f.watch_persistence <= f.warning_persistence && f.warning_persistence <= f.alarm_persistence) {
            errors.push(format!(
                "early_fault persistence must satisfy watch ({}) <= warning ({}) <= alarm ({})",
                f.watch_persistence, f.warning_persistence, f.alarm_persistence
            ));
        }
        if f.hysteresis_clear == 0 {
            errors.push("early_fault.hysteresis_clear must be > 0".to_string());
        }

        let d = &self.diagnostic;
        if d.queue_capacity == 0 {
            errors.push("diagnostic.queue_capacity must be > 0".to_string());
        }
        if !(d.zone_c_velocity_mm_s.is_finite() && d.envelope_rms_threshold.is_finite()) {
            errors.push("diagnostic rule thresholds must be finite".to_string());
        }

        if self.ingest.workers == 0 {
            errors.push("ingest.workers must be > 0".to_string());
        }
        if self.ingest.channel_capacity == 0 {
            errors.push("ingest.channel_capacity must be > 0".to_string());
        }
        if self.publish.channel_capacity == 0 {
            errors.push("publish.channel_capacity must be > 0".to_string());
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_escalation(lower: f64, upper: f64, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass, catch them explicitly
        if !lower.is_finite() || !upper.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got watch={lower}, warning={upper})"
            ));
            return;
        }
        if upper < lower {
            errors.push(format!("{name}: warning ({upper:.3}) must be >= watch ({lower:.3})"));
        }
    }

    fn check_band(band: &FrequencyBand, name: &str, errors: &mut Vec<String>) {
        if !(band.low_hz.is_finite() && band.high_hz.is_finite()) {
            errors.push(format!("{name}: band edges must be finite"));
        } else if band.low_hz < 0.0 || band.low_hz >= band.high_hz {
            errors.push(format!(
                "{name}: expected 0 <= low_hz < high_hz (got {:.1} .. {:.1})",
                band.low_hz, band.high_hz
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Service
// ============================================================================

/// Identification and liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Seconds between heartbeat publications
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Heartbeat reports STALE after this many seconds without raw data
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_service_name() -> String {
    "vibralyzer".to_string()
}
fn default_heartbeat_interval() -> u64 { 10 }
fn default_stale_after() -> u64 { 10 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

// ============================================================================
// Window
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Samples per analysis window (W)
    #[serde(default = "default_window_size")]
    pub size: usize,

    /// Accelerometer sampling rate (Hz)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate_hz: f64,

    /// Shortest window the feature extractor accepts
    #[serde(default = "default_min_fft_len")]
    pub min_fft_len: usize,
}

fn default_window_size() -> usize { 4096 }
fn default_sampling_rate() -> f64 { 25_600.0 }
fn default_min_fft_len() -> usize { 256 }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: default_window_size(),
            sampling_rate_hz: default_sampling_rate(),
            min_fft_len: default_min_fft_len(),
        }
    }
}

// ============================================================================
// Features
// ============================================================================

/// Closed frequency interval `[low_hz, high_hz]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl FrequencyBand {
    pub const fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Band for `energy_low`
    #[serde(default = "default_low_band")]
    pub low_band: FrequencyBand,

    /// Band for `energy_high`, `acc_hf_rms_g` and the envelope
    #[serde(default = "default_high_band")]
    pub high_band: FrequencyBand,
}

fn default_low_band() -> FrequencyBand { FrequencyBand::new(10.0, 100.0) }
fn default_high_band() -> FrequencyBand { FrequencyBand::new(1_000.0, 5_000.0) }

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            low_band: default_low_band(),
            high_band: default_high_band(),
        }
    }
}

// ============================================================================
// Adaptive Baseline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// EWMA decay
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Observations required before normalization yields a non-zero score
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,

    /// Epsilon floor applied to the variance before dividing
    #[serde(default = "default_variance_floor")]
    pub variance_floor: f64,

    /// Where learned statistics are persisted across restarts (empty = disabled)
    #[serde(default)]
    pub state_path: String,
}

fn default_alpha() -> f64 { 0.01 }
fn default_min_samples() -> u64 { 100 }
fn default_variance_floor() -> f64 { 1e-12 }

impl BaselineConfig {
    pub fn state_path(&self) -> Option<&Path> {
        if self.state_path.is_empty() {
            None
        } else {
            Some(Path::new(&self.state_path))
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            min_samples: default_min_samples(),
            variance_floor: default_variance_floor(),
            state_path: String::new(),
        }
    }
}

// ============================================================================
// Trend Detection
// ============================================================================

/// Which feature space the trend detector scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDomain {
    /// Baseline z-scores (thresholds in sigma)
    #[default]
    Normalized,
    /// Physical feature values (thresholds in feature units)
    Raw,
}

/// ISO 10816/20816 zone boundaries on overall velocity RMS (mm/s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityZoneConfig {
    #[serde(default = "default_zone_ab")]
    pub ab_mm_s: f64,
    #[serde(default = "default_zone_bc")]
    pub bc_mm_s: f64,
    #[serde(default = "default_zone_cd")]
    pub cd_mm_s: f64,
}

fn default_zone_ab() -> f64 { 2.8 }
fn default_zone_bc() -> f64 { 7.1 }
fn default_zone_cd() -> f64 { 18.0 }

impl Default for VelocityZoneConfig {
    fn default() -> Self {
        Self {
            ab_mm_s: default_zone_ab(),
            bc_mm_s: default_zone_bc(),
            cd_mm_s: default_zone_cd(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(default)]
    pub domain: TrendDomain,

    /// Feature that drives the trend score; also the high-frequency indicator
    #[serde(default = "default_score_feature")]
    pub score_feature: String,

    /// Score at or above which the level is WATCH (and `hf_high` is set)
    #[serde(default = "default_watch_threshold")]
    pub watch_threshold: f64,

    /// Score at or above which the level is WARNING
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Bearing-indicator feature for `envelope_high`
    #[serde(default = "default_envelope_feature")]
    pub envelope_feature: String,

    #[serde(default = "default_envelope_threshold")]
    pub envelope_threshold: f64,

    /// Rolling history retained per key
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    #[serde(default)]
    pub velocity_zones: VelocityZoneConfig,
}

fn default_score_feature() -> String {
    crate::types::feature_names::ACC_HF_RMS_G.to_string()
}
fn default_watch_threshold() -> f64 { 3.0 }
fn default_warning_threshold() -> f64 { 5.0 }
fn default_envelope_feature() -> String {
    crate::types::feature_names::ENVELOPE_RMS.to_string()
}
fn default_envelope_threshold() -> f64 { 3.0 }
fn default_history_size() -> usize { 10 }

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            domain: TrendDomain::default(),
            score_feature: default_score_feature(),
            watch_threshold: default_watch_threshold(),
            warning_threshold: default_warning_threshold(),
            envelope_feature: default_envelope_feature(),
            envelope_threshold: default_envelope_threshold(),
            history_size: default_history_size(),
            velocity_zones: VelocityZoneConfig::default(),
        }
    }
}

// ============================================================================
// Early-Fault FSM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyFaultConfig {
    #[serde(default = "default_watch_persistence")]
    pub watch_persistence: u32,
    #[serde(default = "default_warning_persistence")]
    pub warning_persistence: u32,
    #[serde(default = "default_alarm_persistence")]
    pub alarm_persistence: u32,
    /// Consecutive NORMAL trends required to step severity down once
    #[serde(default = "default_hysteresis_clear")]
    pub hysteresis_clear: u32,
}

fn default_watch_persistence() -> u32 { 3 }
fn default_warning_persistence() -> u32 { 5 }
fn default_alarm_persistence() -> u32 { 8 }
fn default_hysteresis_clear() -> u32 { 3 }

impl Default for EarlyFaultConfig {
    fn default() -> Self {
        Self {
            watch_persistence: default_watch_persistence(),
            warning_persistence: default_warning_persistence(),
            alarm_persistence: default_alarm_persistence(),
            hysteresis_clear: default_hysteresis_clear(),
        }
    }
}

// ============================================================================
// L2 Diagnostic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    /// Master switch for L2 escalation
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_cooldown_warning")]
    pub cooldown_warning_secs: u64,

    #[serde(default = "default_cooldown_alarm")]
    pub cooldown_alarm_secs: u64,

    /// Rule A: velocity RMS above this is ISO zone C
    #[serde(default = "default_zone_c_velocity")]
    pub zone_c_velocity_mm_s: f64,

    /// Rule B: envelope RMS above this is a bearing defect indication
    #[serde(default = "default_envelope_rms_threshold")]
    pub envelope_rms_threshold: f64,
}

fn default_true() -> bool { true }
fn default_queue_capacity() -> usize { 10 }
fn default_cooldown_warning() -> u64 { 600 }
fn default_cooldown_alarm() -> u64 { 300 }
fn default_zone_c_velocity() -> f64 { 7.1 }
fn default_envelope_rms_threshold() -> f64 { 0.35 }

impl DiagnosticConfig {
    pub const fn warning_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_warning_secs)
    }

    pub const fn alarm_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_alarm_secs)
    }
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            queue_capacity: default_queue_capacity(),
            cooldown_warning_secs: default_cooldown_warning(),
            cooldown_alarm_secs: default_cooldown_alarm(),
            zone_c_velocity_mm_s: default_zone_c_velocity(),
            envelope_rms_threshold: default_envelope_rms_threshold(),
        }
    }
}

// ============================================================================
// Ingest / Publish plumbing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Parallel ingest shards; batches for one key always land on the same shard
    #[serde(default = "default_ingest_workers")]
    pub workers: usize,

    #[serde(default = "default_ingest_capacity")]
    pub channel_capacity: usize,
}

fn default_ingest_workers() -> usize { 4 }
fn default_ingest_capacity() -> usize { 256 }

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_ingest_workers(),
            channel_capacity: default_ingest_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_capacity")]
    pub channel_capacity: usize,
}

fn default_publish_capacity() -> usize { 1024 }

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_publish_capacity(),
        }
    }
}
