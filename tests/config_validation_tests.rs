//! Config Validation Tests
//!
//! Typo detection (unknown keys with suggestions), range validation and
//! file round-trips, exercised independently from the rest of the pipeline.

use vibralyzer::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use vibralyzer::config::{AnalyticsConfig, ConfigError, TrendDomain};

fn validation_errors(config: &AnalyticsConfig) -> Vec<String> {
    match config.validate() {
        Ok(()) => Vec::new(),
        Err(ConfigError::Validation(errors)) => errors,
        Err(other) => panic!("unexpected error kind: {other}"),
    }
}

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_persistence_key_warns_with_suggestion() {
    let toml_str = r#"
[early_fault]
warning_persistance = 6
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("warning_persistance"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("early_fault.warning_persistence")
    );
}

#[test]
fn typo_in_window_section_warns() {
    let toml_str = r#"
[window]
szie = 2048
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("window.size"));
}

#[test]
fn unknown_section_warns() {
    let toml_str = r#"
[mqtt]
broker = "localhost"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 2, "section and key are both unknown: {warnings:?}");
    assert!(warnings.iter().any(|w| w.field == "mqtt"));
    assert!(warnings.iter().any(|w| w.field == "mqtt.broker"));
}

#[test]
fn multiple_typos_all_warned() {
    let toml_str = r#"
[baseline]
alpah = 0.02
min_sampels = 50

[diagnostic]
queue_capacty = 4
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 3, "{warnings:?}");
    assert!(warnings.iter().all(|w| w.suggestion.is_some()));
}

#[test]
fn full_valid_config_produces_zero_warnings() {
    let toml_str = r#"
[service]
name = "edge-gw-3"
heartbeat_interval_secs = 5
stale_after_secs = 15

[window]
size = 2048
sampling_rate_hz = 25600.0
min_fft_len = 256

[features]
low_band = { low_hz = 10.0, high_hz = 200.0 }
high_band = { low_hz = 2000.0, high_hz = 8000.0 }

[baseline]
alpha = 0.02
min_samples = 50
variance_floor = 1e-9
state_path = "/var/lib/vibralyzer/baseline.json"

[trend]
domain = "raw"
score_feature = "acc_hf_rms_g"
watch_threshold = 0.5
warning_threshold = 1.0
envelope_feature = "envelope_rms"
envelope_threshold = 0.3
history_size = 20

[trend.velocity_zones]
ab_mm_s = 2.8
bc_mm_s = 7.1
cd_mm_s = 18.0

[early_fault]
watch_persistence = 2
warning_persistence = 4
alarm_persistence = 6
hysteresis_clear = 5

[diagnostic]
enabled = true
queue_capacity = 4
cooldown_warning_secs = 900
cooldown_alarm_secs = 120
zone_c_velocity_mm_s = 7.1
envelope_rms_threshold = 0.35

[ingest]
workers = 2
channel_capacity = 64

[publish]
channel_capacity = 256
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "{warnings:?}");

    let config = AnalyticsConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.trend.domain, TrendDomain::Raw);
    assert_eq!(config.early_fault.hysteresis_clear, 5);
    assert_eq!(config.baseline.state_path().unwrap().to_str(), Some("/var/lib/vibralyzer/baseline.json"));
}

#[test]
fn empty_toml_produces_zero_warnings() {
    assert!(validate_unknown_keys("").is_empty());
}

#[test]
fn known_keys_cover_every_default_field() {
    let serialized = AnalyticsConfig::default().to_toml().unwrap();
    let value: toml::Value = serialized.parse().unwrap();
    let known = known_config_keys();
    for key in vibralyzer::config::validation::walk_toml_keys(&value, "") {
        assert!(known.contains(key.as_str()), "'{key}' missing from known keys");
    }
}

#[test]
fn suggest_correction_finds_close_match() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("diagnostic.cooldown_alarm_sec", &known).as_deref(),
        Some("diagnostic.cooldown_alarm_secs")
    );
}

#[test]
fn suggest_correction_returns_none_for_garbage() {
    let known = known_config_keys();
    assert!(suggest_correction("zzzzzzzzzzzzzzzzzzzzzz", &known).is_none());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn all_defaults_pass_validation() {
    AnalyticsConfig::default().validate().unwrap();
}

#[test]
fn alpha_out_of_range_is_error() {
    let mut config = AnalyticsConfig::default();
    config.baseline.alpha = 0.0;
    assert!(validation_errors(&config).iter().any(|e| e.contains("baseline.alpha")));

    config.baseline.alpha = 1.5;
    assert!(validation_errors(&config).iter().any(|e| e.contains("baseline.alpha")));
}

#[test]
fn persistence_order_is_enforced() {
    let mut config = AnalyticsConfig::default();
    config.early_fault.warning_persistence = 10;
    config.early_fault.alarm_persistence = 8;
    assert!(validation_errors(&config).iter().any(|e| e.contains("persistence")));
}

#[test]
fn velocity_zones_must_ascend() {
    let mut config = AnalyticsConfig::default();
    config.trend.velocity_zones.bc_mm_s = 20.0;
    assert!(validation_errors(&config).iter().any(|e| e.contains("velocity_zones")));
}

#[test]
fn trend_thresholds_must_escalate() {
    let mut config = AnalyticsConfig::default();
    config.trend.warning_threshold = 1.0;
    config.trend.watch_threshold = 2.0;
    assert!(validation_errors(&config).iter().any(|e| e.contains("trend.threshold")));
}

#[test]
fn nan_threshold_is_error() {
    let mut config = AnalyticsConfig::default();
    config.trend.watch_threshold = f64::NAN;
    assert!(!validation_errors(&config).is_empty());
}

#[test]
fn window_shorter_than_fft_minimum_is_error() {
    let mut config = AnalyticsConfig::default();
    config.window.size = 128;
    assert!(validation_errors(&config).iter().any(|e| e.contains("window.size")));
}

#[test]
fn zero_capacities_are_errors() {
    let mut config = AnalyticsConfig::default();
    config.diagnostic.queue_capacity = 0;
    config.ingest.workers = 0;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("queue_capacity")));
    assert!(errors.iter().any(|e| e.contains("ingest.workers")));
}

#[test]
fn every_problem_is_collected() {
    let mut config = AnalyticsConfig::default();
    config.baseline.min_samples = 0;
    config.early_fault.hysteresis_clear = 0;
    config.publish.channel_capacity = 0;
    assert!(validation_errors(&config).len() >= 3);
}

#[test]
fn mismatched_zone_c_rule_is_warning_only() {
    let mut config = AnalyticsConfig::default();
    config.diagnostic.zone_c_velocity_mm_s = 4.5;
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "diagnostic.zone_c_velocity_mm_s"));
    config.validate().unwrap();
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn partial_file_fills_defaults() {
    let config = AnalyticsConfig::from_toml_str(
        r#"
[early_fault]
hysteresis_clear = 7
"#,
    )
    .unwrap();
    assert_eq!(config.early_fault.hysteresis_clear, 7);
    assert_eq!(config.early_fault.alarm_persistence, 8);
    assert_eq!(config.window.size, 4096);
    assert_eq!(config.trend.domain, TrendDomain::Normalized);
}

#[test]
fn invalid_values_in_file_are_rejected() {
    let err = AnalyticsConfig::from_toml_str(
        r#"
[baseline]
alpha = -1.0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn malformed_toml_is_parse_error() {
    let err = AnalyticsConfig::from_toml_str("[window\nsize = 1").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn config_roundtrip_preserves_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vibralyzer.toml");

    let mut config = AnalyticsConfig::default();
    config.service.name = "roundtrip".to_string();
    config.diagnostic.cooldown_alarm_secs = 42;
    config.trend.domain = TrendDomain::Raw;
    config.save_to_file(&path).unwrap();

    let loaded = AnalyticsConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.service.name, "roundtrip");
    assert_eq!(loaded.diagnostic.cooldown_alarm_secs, 42);
    assert_eq!(loaded.trend.domain, TrendDomain::Raw);
    loaded.validate().unwrap();
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AnalyticsConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}
