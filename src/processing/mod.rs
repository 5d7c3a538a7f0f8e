//! Signal processing - windowing, FFT and the L1 feature vector

mod features;
mod fft;
mod window;

pub use features::FeatureExtractor;
pub use fft::FftProcessor;
pub use window::WindowBuffer;

use thiserror::Error;

/// Errors in signal processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid sampling rate: {0}")]
    InvalidSamplingRate(f64),

    #[error("Non-finite sample at index {index}")]
    NonFiniteSample { index: usize },
}
