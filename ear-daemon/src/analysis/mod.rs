//! Perceptual feature extraction
//!
//! Pure computation over one analysis window. The only failure is a block of
//! the wrong length, which is a caller bug and is never retried.

pub mod features;
pub mod fingerprint;
pub mod onset;

pub use features::FeatureExtractor;
pub use fingerprint::audio_fingerprint;
pub use onset::OnsetDetector;

use thiserror::Error;

/// Feature extraction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// Input block does not match the configured window length
    #[error("Expected a block of {expected} samples, got {actual}")]
    BlockSize { expected: usize, actual: usize },

    #[error("FFT failed: {0}")]
    Fft(String),
}
