//! Config validation: unknown-key detection with Levenshtein suggestions
//! and signal-processing range checks.
//!
//! Unknown keys are found by walking the raw `toml::Value` tree before serde
//! runs, so a typo like `alarm_persistance` is reported instead of silently
//! falling back to the default. Warnings never break an existing config.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path for `AnalyticsConfig`.
///
/// Kept in step with the structs in `analytics_config.rs` by hand.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [service]
        "service",
        "service.name",
        "service.heartbeat_interval_secs",
        "service.stale_after_secs",
        // [window]
        "window",
        "window.size",
        "window.sampling_rate_hz",
        "window.min_fft_len",
        // [features]
        "features",
        "features.low_band",
        "features.low_band.low_hz",
        "features.low_band.high_hz",
        "features.high_band",
        "features.high_band.low_hz",
        "features.high_band.high_hz",
        // [baseline]
        "baseline",
        "baseline.alpha",
        "baseline.min_samples",
        "baseline.variance_floor",
        "baseline.state_path",
        // [trend]
        "trend",
        "trend.domain",
        "trend.score_feature",
        "trend.watch_threshold",
        "trend.warning_threshold",
        "trend.envelope_feature",
        "trend.envelope_threshold",
        "trend.history_size",
        "trend.velocity_zones",
        "trend.velocity_zones.ab_mm_s",
        "trend.velocity_zones.bc_mm_s",
        "trend.velocity_zones.cd_mm_s",
        // [early_fault]
        "early_fault",
        "early_fault.watch_persistence",
        "early_fault.warning_persistence",
        "early_fault.alarm_persistence",
        "early_fault.hysteresis_clear",
        // [diagnostic]
        "diagnostic",
        "diagnostic.enabled",
        "diagnostic.queue_capacity",
        "diagnostic.cooldown_warning_secs",
        "diagnostic.cooldown_alarm_secs",
        "diagnostic.zone_c_velocity_mm_s",
        "diagnostic.envelope_rms_threshold",
        // [ingest]
        "ingest",
        "ingest.workers",
        "ingest.channel_capacity",
        // [publish]
        "publish",
        "publish.channel_capacity",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collects all dotted key paths of a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3, ties broken alphabetically.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(d, _)| *d <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every key in `raw_toml` that `AnalyticsConfig` does not know.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // serde reports parse errors
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Cross-field checks that need physical context.
///
/// Returns (errors, warnings). Errors prevent startup.
pub fn validate_physical_ranges(
    config: &super::AnalyticsConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let nyquist = config.window.sampling_rate_hz / 2.0;
    for (name, band) in [
        ("features.low_band", &config.features.low_band),
        ("features.high_band", &config.features.high_band),
    ] {
        if band.low_hz >= nyquist {
            errors.push(format!(
                "{name} starts at {:.1} Hz, at or above Nyquist ({nyquist:.1} Hz); the band is empty",
                band.low_hz
            ));
        } else if band.high_hz > nyquist {
            // Bins stop at n/2, so the band is silently truncated
            warnings.push(ValidationWarning {
                field: format!("{name}.high_hz"),
                message: format!(
                    "{name}.high_hz = {:.1} exceeds Nyquist ({nyquist:.1} Hz at {:.0} Hz sampling)",
                    band.high_hz, config.window.sampling_rate_hz
                ),
                suggestion: None,
            });
        }
    }

    // Bins narrower than the band make the band energy meaningless
    let resolution = config.window.sampling_rate_hz / config.window.size.max(1) as f64;
    let low = &config.features.low_band;
    if low.high_hz - low.low_hz < resolution {
        warnings.push(ValidationWarning {
            field: "features.low_band".to_string(),
            message: format!(
                "features.low_band is narrower than one FFT bin ({resolution:.2} Hz)"
            ),
            suggestion: None,
        });
    }

    if !config.window.size.is_power_of_two() {
        warnings.push(ValidationWarning {
            field: "window.size".to_string(),
            message: format!(
                "window.size = {} is not a power of two; FFT will be slower",
                config.window.size
            ),
            suggestion: None,
        });
    }

    if config.baseline.alpha > 0.5 {
        warnings.push(ValidationWarning {
            field: "baseline.alpha".to_string(),
            message: format!(
                "baseline.alpha = {} forgets history almost immediately",
                config.baseline.alpha
            ),
            suggestion: None,
        });
    }

    let d = &config.diagnostic;
    if d.enabled && (d.cooldown_warning_secs == 0 || d.cooldown_alarm_secs == 0) {
        warnings.push(ValidationWarning {
            field: "diagnostic.cooldown".to_string(),
            message: "zero diagnostic cooldown admits a job on every escalated window".to_string(),
            suggestion: None,
        });
    }

    let bc = config.trend.velocity_zones.bc_mm_s;
    if (d.zone_c_velocity_mm_s - bc).abs() > f64::EPSILON {
        warnings.push(ValidationWarning {
            field: "diagnostic.zone_c_velocity_mm_s".to_string(),
            message: format!(
                "diagnostic.zone_c_velocity_mm_s = {:.2} differs from trend.velocity_zones.bc_mm_s = {bc:.2}",
                d.zone_c_velocity_mm_s
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("window", "window"), 0);
        assert_eq!(levenshtein("persistance", "persistence"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [features.high_band]
            low_hz = 1000.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"features".to_string()));
        assert!(keys.contains(&"features.high_band".to_string()));
        assert!(keys.contains(&"features.high_band.low_hz".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
[early_fault]
alarm_persistance = 8
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("early_fault.alarm_persistence")
        );
    }

    #[test]
    fn test_valid_keys_produce_zero_warnings() {
        let warnings = validate_unknown_keys(
            r#"
[service]
name = "edge-1"

[trend]
domain = "raw"

[trend.velocity_zones]
bc_mm_s = 7.1
"#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_garbage_key_has_no_suggestion() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_band_above_nyquist_is_warning() {
        let mut config = AnalyticsConfig::default();
        config.window.sampling_rate_hz = 8_000.0;
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.iter().any(|w| w.field == "features.high_band.high_hz"));
    }

    #[test]
    fn test_band_beyond_nyquist_is_error() {
        let mut config = AnalyticsConfig::default();
        config.window.sampling_rate_hz = 1_500.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("features.high_band")), "{errors:?}");
    }

    #[test]
    fn test_defaults_clean() {
        let (errors, warnings) = validate_physical_ranges(&AnalyticsConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_non_power_of_two_window_warns() {
        let mut config = AnalyticsConfig::default();
        config.window.size = 3000;
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "window.size"));
    }
}
