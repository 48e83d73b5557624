//! Feature record extraction for one analysis window

use super::{FeatureError, OnsetDetector};
use crate::config::AnalysisConfig;
use ear_common::{BandRatios, FeatureRecord};
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;
use tracing::debug;

/// Band edges in Hz, lower bound inclusive
const BASS_BAND: (f64, f64) = (20.0, 250.0);
const MID_BAND: (f64, f64) = (250.0, 4000.0);
const HIGH_BAND: (f64, f64) = (4000.0, 20000.0);

/// Keeps the normalisation finite for all-zero spectra
const ENERGY_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Bass,
    Mid,
    High,
    Outside,
}

impl Band {
    fn of(freq: f64) -> Self {
        let within = |(lo, hi): (f64, f64)| freq >= lo && freq < hi;
        if within(BASS_BAND) {
            Band::Bass
        } else if within(MID_BAND) {
            Band::Mid
        } else if within(HIGH_BAND) {
            Band::High
        } else {
            Band::Outside
        }
    }
}

/// Turns a fixed-length sample window into a [`FeatureRecord`].
///
/// FFT plans are built once here and reused every tick.
pub struct FeatureExtractor {
    sample_rate: u32,
    window_len: usize,
    config: AnalysisConfig,
    fft: Arc<dyn RealToComplex<f64>>,
    onset: OnsetDetector,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, window_seconds: f64, config: AnalysisConfig) -> Self {
        let window_len = ((window_seconds.max(0.0) * sample_rate as f64).round() as usize).max(1);

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window_len);
        let onset = OnsetDetector::new(sample_rate, &config);

        debug!(
            "Feature extractor: {} samples per window, onset window {} hop {}",
            window_len,
            onset.window(),
            onset.hop()
        );

        Self {
            sample_rate,
            window_len,
            config,
            fft,
            onset,
        }
    }

    /// Samples `extract` expects
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Peak amplitude below the silence threshold (an empty block is silent)
    pub fn is_silent(&self, samples: &[f32]) -> bool {
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        peak < self.config.silence_threshold
    }

    /// Compute the feature record for exactly one window.
    ///
    /// A silent window yields zero band ratios rather than a division by
    /// zero. Any non-silent window yields ratios summing to 1; when none of
    /// its energy falls inside the bands they are split evenly.
    pub fn extract(&self, samples: &[f32]) -> Result<FeatureRecord, FeatureError> {
        if samples.len() != self.window_len {
            return Err(FeatureError::BlockSize {
                expected: self.window_len,
                actual: samples.len(),
            });
        }

        let n = samples.len() as f64;
        let rms = (samples.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / n).sqrt();

        let mut input: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let mut spectrum = self.fft.make_output_vec();
        self.fft
            .process(&mut input, &mut spectrum)
            .map_err(|e| FeatureError::Fft(e.to_string()))?;

        let bin_hz = self.sample_rate as f64 / n;
        let (mut bass, mut mid, mut high) = (0.0f64, 0.0f64, 0.0f64);
        let mut dominant_bin = 0usize;
        let mut dominant_mag = f64::NEG_INFINITY;

        for (k, bin) in spectrum.iter().enumerate() {
            let band = Band::of(k as f64 * bin_hz);
            let power = bin.norm_sqr();
            match band {
                Band::Bass => bass += power,
                Band::Mid => mid += power,
                Band::High => high += power,
                Band::Outside => {}
            }

            let mut magnitude = bin.norm();
            if band == Band::Bass {
                magnitude *= self.config.dominant_bass_boost;
            }
            // Strict comparison: first bin wins ties
            if magnitude > dominant_mag {
                dominant_mag = magnitude;
                dominant_bin = k;
            }
        }

        bass *= self.config.bass_weight;
        mid *= self.config.mid_weight;
        high *= self.config.high_weight;
        let in_band = bass + mid + high;

        let band_ratios = if in_band <= ENERGY_EPSILON && !self.is_silent(samples) {
            // Audible but nothing inside 20 Hz..20 kHz (DC offset, infrasound)
            debug!("No in-band energy in a non-silent window, using an even split");
            BandRatios {
                bass: 1.0 / 3.0,
                mid: 1.0 / 3.0,
                high: 1.0 / 3.0,
            }
        } else {
            let total = in_band + ENERGY_EPSILON;
            BandRatios {
                bass: bass / total,
                mid: mid / total,
                high: high / total,
            }
        };

        Ok(FeatureRecord {
            rms,
            zero_crossing_rate: zero_crossing_rate(samples),
            band_ratios,
            dominant_frequency: dominant_bin as f64 * bin_hz,
            estimated_bpm: self.onset.estimate_bpm(samples)?,
        })
    }
}

/// `sum(|sign(x[i+1]) - sign(x[i])|) / (2 * len)`, with sign(0) = 0
pub fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sign = |s: f32| -> i32 {
        if s > 0.0 {
            1
        } else if s < 0.0 {
            -1
        } else {
            0
        }
    };

    let changes: i64 = samples
        .windows(2)
        .map(|w| (sign(w[1]) - sign(w[0])).abs() as i64)
        .sum();

    changes as f64 / (2.0 * samples.len() as f64)
}
