//! Onset-based tempo estimate
//!
//! Bass-band energy is measured over short overlapping windows; the positive
//! first difference of that sequence (spectral flux) is the onset strength.
//! Windows whose onset strength exceeds `mean + k * stddev` count as beats.
//!
//! The window length, threshold and final scaling are empirical. They are
//! carried in `AnalysisConfig` so they can be tuned without code changes.

use super::FeatureError;
use crate::config::AnalysisConfig;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

pub struct OnsetDetector {
    sample_rate: u32,
    window: usize,
    hop: usize,
    low_hz: f64,
    high_hz: f64,
    threshold_stddevs: f64,
    bpm_scale: f64,
    max_bpm: f64,
    fft: Arc<dyn RealToComplex<f64>>,
}

impl OnsetDetector {
    pub fn new(sample_rate: u32, config: &AnalysisConfig) -> Self {
        let window = ((sample_rate as f64 * config.onset_window_ms / 1000.0).round() as usize).max(2);
        let hop = ((window as f64 * (1.0 - config.onset_overlap)) as usize).max(1);

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window);

        Self {
            sample_rate,
            window,
            hop,
            low_hz: config.onset_low_hz,
            high_hz: config.onset_high_hz,
            threshold_stddevs: config.onset_threshold_stddevs,
            bpm_scale: config.bpm_scale,
            max_bpm: config.max_bpm,
            fft,
        }
    }

    /// Samples per onset window
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Bass-band energy (sum of squared magnitudes) per window.
    ///
    /// Windows start every `hop` samples while a full window plus at least
    /// one further sample fits in the block.
    pub fn bass_energies(&self, samples: &[f32]) -> Result<Vec<f64>, FeatureError> {
        let bin_hz = self.sample_rate as f64 / self.window as f64;
        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut energies = Vec::new();

        let mut start = 0;
        while start + self.window < samples.len() {
            for (dst, &src) in input.iter_mut().zip(&samples[start..start + self.window]) {
                *dst = src as f64;
            }
            self.fft
                .process(&mut input, &mut spectrum)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;

            let energy: f64 = spectrum
                .iter()
                .enumerate()
                .filter(|(k, _)| {
                    let freq = *k as f64 * bin_hz;
                    freq >= self.low_hz && freq < self.high_hz
                })
                .map(|(_, c)| c.norm_sqr())
                .sum();
            energies.push(energy);

            start += self.hop;
        }

        Ok(energies)
    }

    /// Tempo estimate for a block, clamped to `[0, max_bpm]`
    pub fn estimate_bpm(&self, samples: &[f32]) -> Result<f64, FeatureError> {
        let energies = self.bass_energies(samples)?;
        if energies.len() <= 2 {
            return Ok(0.0);
        }

        let flux = onset_strength(&energies);
        let beats = count_onsets(&flux, self.threshold_stddevs);

        let duration = samples.len() as f64 / self.sample_rate as f64;
        let bpm = beats as f64 / duration * 60.0 * self.bpm_scale;

        if !bpm.is_finite() {
            return Ok(0.0);
        }
        Ok(bpm.clamp(0.0, self.max_bpm))
    }
}

/// Positive first difference of the energy sequence
pub fn onset_strength(energies: &[f64]) -> Vec<f64> {
    energies.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect()
}

/// Number of values strictly above `mean + k * stddev` (population stddev)
pub fn count_onsets(flux: &[f64], k: f64) -> usize {
    if flux.is_empty() {
        return 0;
    }
    let n = flux.len() as f64;
    let mean = flux.iter().sum::<f64>() / n;
    let variance = flux.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let threshold = mean + k * variance.sqrt();

    flux.iter().filter(|&&v| v > threshold).count()
}
