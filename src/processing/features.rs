//! L1 feature vector
//!
//! | Feature | Definition |
//! |---|---|
//! | `rms` | `sqrt(mean(x^2))` |
//! | `ptp` | `max(x) - min(x)` |
//! | `energy_low` / `energy_high` | `sum |FFT(x)|^2` over the configured band |
//! | `overall_vel_rms_mm_s` | g -> m/s^2, cumulative-sum integration, DC removed, mm/s, RMS |
//! | `acc_hf_rms_g` | RMS of the high band, band-passed in the frequency domain |
//! | `envelope_rms` | RMS of the high-band analytic envelope, DC removed |

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use super::{FftProcessor, ProcessingError};
use crate::config::defaults::STANDARD_GRAVITY_M_S2;
use crate::config::{FeatureConfig, FrequencyBand, WindowConfig};
use crate::types::{feature_names, FeatureVector, RawWindow};

/// Pure function of a window; holds only immutable settings and a plan cache.
pub struct FeatureExtractor {
    sampling_rate: f64,
    min_fft_len: usize,
    low_band: FrequencyBand,
    high_band: FrequencyBand,
    /// One planned processor per window length seen
    processors: DashMap<usize, Arc<FftProcessor>>,
}

impl FeatureExtractor {
    pub fn new(window: &WindowConfig, features: &FeatureConfig) -> Result<Self, ProcessingError> {
        if !(window.sampling_rate_hz.is_finite() && window.sampling_rate_hz > 0.0) {
            return Err(ProcessingError::InvalidSamplingRate(window.sampling_rate_hz));
        }
        Ok(Self {
            sampling_rate: window.sampling_rate_hz,
            min_fft_len: window.min_fft_len.max(2),
            low_band: features.low_band,
            high_band: features.high_band,
            processors: DashMap::new(),
        })
    }

    pub const fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn extract(&self, window: &RawWindow) -> Result<FeatureVector, ProcessingError> {
        self.extract_samples(window.samples())
    }

    /// Compute the full feature vector.
    ///
    /// Fails on windows shorter than `min_fft_len` or containing NaN/Inf.
    pub fn extract_samples(&self, x: &[f64]) -> Result<FeatureVector, ProcessingError> {
        if x.len() < self.min_fft_len {
            return Err(ProcessingError::InsufficientData {
                needed: self.min_fft_len,
                available: x.len(),
            });
        }
        if let Some(index) = x.iter().position(|v| !v.is_finite()) {
            return Err(ProcessingError::NonFiniteSample { index });
        }

        let processor = self.processor(x.len())?;
        let spectrum = processor.spectrum(x)?;

        let analytic = processor.analytic_band(&spectrum, &self.high_band);
        let band_passed: Vec<f64> = analytic.iter().map(|c| c.re).collect();
        let envelope: Vec<f64> = analytic.iter().map(|c| c.norm()).collect();

        let mut features = FeatureVector::new();
        features.insert(feature_names::RMS.to_string(), rms(x));
        features.insert(feature_names::PTP.to_string(), peak_to_peak(x));
        features.insert(
            feature_names::ENERGY_LOW.to_string(),
            processor.band_energy(&spectrum, &self.low_band),
        );
        features.insert(
            feature_names::ENERGY_HIGH.to_string(),
            processor.band_energy(&spectrum, &self.high_band),
        );
        features.insert(
            feature_names::OVERALL_VEL_RMS_MM_S.to_string(),
            self.velocity_rms_mm_s(x),
        );
        features.insert(feature_names::ACC_HF_RMS_G.to_string(), rms(&band_passed));
        features.insert(feature_names::ENVELOPE_RMS.to_string(), ac_rms(&envelope));

        trace!(samples = x.len(), ?features, "Features extracted");
        Ok(features)
    }

    /// ISO 10816/20816 overall velocity RMS from acceleration in g.
    fn velocity_rms_mm_s(&self, accel_g: &[f64]) -> f64 {
        let dt = 1.0 / self.sampling_rate;
        let mut acc = 0.0;
        let velocity: Vec<f64> = accel_g
            .iter()
            .map(|a| {
                acc += a * STANDARD_GRAVITY_M_S2 * dt;
                acc
            })
            .collect();
        // m/s -> mm/s after removing integration drift
        ac_rms(&velocity) * 1000.0
    }

    fn processor(&self, n: usize) -> Result<Arc<FftProcessor>, ProcessingError> {
        if let Some(p) = self.processors.get(&n) {
            return Ok(Arc::clone(&p));
        }
        match self.processors.entry(n) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(v) => {
                let p = Arc::new(FftProcessor::new(n, self.sampling_rate)?);
                v.insert(Arc::clone(&p));
                Ok(p)
            }
        }
    }
}

fn rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

/// RMS after subtracting the mean.
fn ac_rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / x.len() as f64).sqrt()
}

fn peak_to_peak(x: &[f64]) -> f64 {
    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo.is_finite() && hi.is_finite() {
        hi - lo
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    // 25.6 kHz over 4096 samples puts bins every 6.25 Hz
    const FS: f64 = 25_600.0;
    const N: usize = 4096;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&WindowConfig::default(), &FeatureConfig::default()).unwrap()
    }

    fn tone(freq: f64, amp: f64) -> Vec<f64> {
        (0..N).map(|i| amp * (2.0 * PI * freq * i as f64 / FS).sin()).collect()
    }

    fn get(f: &FeatureVector, name: &str) -> f64 {
        f[name]
    }

    #[test]
    fn test_all_features_present() {
        let f = extractor().extract_samples(&tone(50.0, 1.0)).unwrap();
        for name in feature_names::ALL {
            assert!(f.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn test_time_domain_features_of_sine() {
        let f = extractor().extract_samples(&tone(50.0, 1.0)).unwrap();
        assert!((get(&f, feature_names::RMS) - 1.0 / 2.0_f64.sqrt()).abs() < 0.001);
        assert!((get(&f, feature_names::PTP) - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_band_energy_tracks_tone_location() {
        let ex = extractor();
        let low = ex.extract_samples(&tone(50.0, 1.0)).unwrap();
        assert!(get(&low, feature_names::ENERGY_LOW) > 1e3 * get(&low, feature_names::ENERGY_HIGH).max(1e-9));
        assert!(get(&low, feature_names::ACC_HF_RMS_G) < 1e-6);

        let high = ex.extract_samples(&tone(2000.0, 1.0)).unwrap();
        assert!(get(&high, feature_names::ENERGY_HIGH) > 1e3 * get(&high, feature_names::ENERGY_LOW).max(1e-9));
        assert!((get(&high, feature_names::ACC_HF_RMS_G) - 1.0 / 2.0_f64.sqrt()).abs() < 0.001);
    }

    #[test]
    fn test_velocity_rms_of_sine_acceleration() {
        // a = A*g*sin(wt)  ->  v_rms = A*g / (w * sqrt(2))
        let f = extractor().extract_samples(&tone(50.0, 1.0)).unwrap();
        let expected = STANDARD_GRAVITY_M_S2 / (2.0 * PI * 50.0) / 2.0_f64.sqrt() * 1000.0;
        let got = get(&f, feature_names::OVERALL_VEL_RMS_MM_S);
        assert!((got - expected).abs() / expected < 0.01, "got {got}, expected {expected}");
    }

    #[test]
    fn test_envelope_of_am_carrier() {
        // (1 + m*cos(2*pi*100t)) * cos(2*pi*2000t): envelope AC RMS = m / sqrt(2)
        let m = 0.5;
        let x: Vec<f64> = (0..N)
            .map(|i| {
                let t = i as f64 / FS;
                (1.0 + m * (2.0 * PI * 100.0 * t).cos()) * (2.0 * PI * 2000.0 * t).cos()
            })
            .collect();
        let f = extractor().extract_samples(&x).unwrap();
        assert!((get(&f, feature_names::ENVELOPE_RMS) - m / 2.0_f64.sqrt()).abs() < 0.001);

        let flat = extractor().extract_samples(&tone(2000.0, 1.0)).unwrap();
        assert!(get(&flat, feature_names::ENVELOPE_RMS) < 1e-6);
    }

    #[test]
    fn test_short_window_rejected() {
        let err = extractor().extract_samples(&[0.0; 100]).unwrap_err();
        assert_eq!(err, ProcessingError::InsufficientData { needed: 256, available: 100 });
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        let mut x = tone(50.0, 1.0);
        x[17] = f64::NAN;
        assert_eq!(
            extractor().extract_samples(&x).unwrap_err(),
            ProcessingError::NonFiniteSample { index: 17 }
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let ex = extractor();
        let x = tone(1234.5, 0.3);
        assert_eq!(ex.extract_samples(&x).unwrap(), ex.extract_samples(&x).unwrap());
    }
}
