//! FFT computation using rustfft
//!
//! Pre-planned forward/inverse transforms for one window length, plus the two
//! frequency-domain operations the feature vector needs: band energy and the
//! band-limited analytic signal (real part = band-passed signal, magnitude =
//! envelope).

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::ProcessingError;
use crate::config::FrequencyBand;

/// FFT processor with pre-planned transforms for repeated computation.
///
/// No zero-padding: the transform length equals the window length, so bin
/// `k` sits at `k * fs / n` Hz.
pub struct FftProcessor {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    size: usize,
    sampling_rate: f64,
}

impl FftProcessor {
    pub fn new(size: usize, sampling_rate: f64) -> Result<Self, ProcessingError> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(ProcessingError::InvalidSamplingRate(sampling_rate));
        }
        if size < 2 {
            return Err(ProcessingError::InsufficientData {
                needed: 2,
                available: size,
            });
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
            size,
            sampling_rate,
        })
    }

    /// Full complex spectrum of a real signal of exactly `size` samples.
    pub fn spectrum(&self, signal: &[f64]) -> Result<Vec<Complex<f64>>, ProcessingError> {
        if signal.len() != self.size {
            return Err(ProcessingError::InsufficientData {
                needed: self.size,
                available: signal.len(),
            });
        }

        let mut buffer: Vec<Complex<f64>> =
            signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.forward.process(&mut buffer);
        Ok(buffer)
    }

    /// Sum of `|X_k|^2` over the one-sided bins whose frequency lies in `band`.
    ///
    /// Unnormalized; only meaningful for comparing the same band over time.
    pub fn band_energy(&self, spectrum: &[Complex<f64>], band: &FrequencyBand) -> f64 {
        (0..=self.size / 2)
            .filter(|&k| band.contains(self.bin_frequency(k)))
            .filter_map(|k| spectrum.get(k))
            .map(Complex::norm_sqr)
            .sum()
    }

    /// Time-domain analytic signal of the band-limited spectrum.
    ///
    /// Bins outside `band` and all negative-frequency bins are zeroed, strictly
    /// positive bins are doubled, then the inverse transform is scaled by 1/n.
    pub fn analytic_band(&self, spectrum: &[Complex<f64>], band: &FrequencyBand) -> Vec<Complex<f64>> {
        let n = self.size;
        let half = n / 2;
        let even = n % 2 == 0;

        let mut buffer: Vec<Complex<f64>> = spectrum
            .iter()
            .take(n)
            .enumerate()
            .map(|(k, &c)| {
                if k > half || !band.contains(self.bin_frequency(k)) {
                    return Complex::new(0.0, 0.0);
                }
                // DC and Nyquist have no negative-frequency twin
                let weight = if k == 0 || (even && k == half) { 1.0 } else { 2.0 };
                c * weight
            })
            .collect();
        buffer.resize(n, Complex::new(0.0, 0.0));

        self.inverse.process(&mut buffer);
        let scale = 1.0 / n as f64;
        buffer.iter_mut().for_each(|c| *c *= scale);
        buffer
    }

    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.frequency_resolution()
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    /// Hz per bin
    pub fn frequency_resolution(&self) -> f64 {
        self.sampling_rate / self.size as f64
    }
}
