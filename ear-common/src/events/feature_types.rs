//! Perceptual feature record produced once per analysis tick

use serde::{Deserialize, Serialize};

/// Weighted energy share of the three perceptual bands.
///
/// For any non-silent input the three ratios sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandRatios {
    /// 20–250 Hz
    pub bass: f64,
    /// 250–4000 Hz
    pub mid: f64,
    /// 4000–20000 Hz
    pub high: f64,
}

impl BandRatios {
    pub fn sum(&self) -> f64 {
        self.bass + self.mid + self.high
    }
}

/// Compact description of a window of audio
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Root mean square of the raw samples
    pub rms: f64,
    /// Sign changes per sample, halved
    pub zero_crossing_rate: f64,
    pub band_ratios: BandRatios,
    /// Frequency (Hz) of the strongest bin after bass weighting
    pub dominant_frequency: f64,
    /// Onset-count tempo estimate, always within [0, max_bpm]
    pub estimated_bpm: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_record_json_shape() {
        let record = FeatureRecord {
            rms: 0.25,
            zero_crossing_rate: 0.01,
            band_ratios: BandRatios { bass: 0.6, mid: 0.3, high: 0.1 },
            dominant_frequency: 174.0,
            estimated_bpm: 120.0,
        };

        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["band_ratios"]["bass"], 0.6);
        assert_eq!(json["estimated_bpm"], 120.0);
        assert!((record.band_ratios.sum() - 1.0).abs() < 1e-12);
    }
}
