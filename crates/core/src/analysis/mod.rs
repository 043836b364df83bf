use serde::{Deserialize, Serialize};

use crate::{Result, BAND_COUNT};

/// Name under which analysis results are delivered to the event layer.
pub const AUDIO_TAP_EVENT: &str = "playback-audio-tap-received";

/// Features derived from a single render block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnalysisResult {
    /// RMS of the analysed samples, clamped to [0, 1].
    pub amplitude: f32,
    /// Normalised [0, 1] energy per configured band, in band table order.
    pub eq_bands: [f32; BAND_COUNT],
}

impl AudioAnalysisResult {
    /// Result emitted for blocks that carry no usable sample data.
    pub const ZERO: AudioAnalysisResult = AudioAnalysisResult {
        amplitude: 0.0,
        eq_bands: [0.0; BAND_COUNT],
    };

    pub fn is_zero(&self) -> bool {
        self.amplitude == 0.0 && self.eq_bands.iter().all(|band| *band == 0.0)
    }

    /// Index of the band with the highest energy. Ties resolve to the lowest
    /// band.
    pub fn dominant_band(&self) -> usize {
        let mut best = 0;
        for (index, value) in self.eq_bands.iter().enumerate() {
            if *value > self.eq_bands[best] {
                best = index;
            }
        }
        best
    }

    pub fn to_event(self) -> AnalysisEvent {
        AnalysisEvent {
            event: AUDIO_TAP_EVENT.to_string(),
            result: self,
        }
    }
}

/// Payload handed to the event delivery layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub event: String,
    #[serde(flatten)]
    pub result: AudioAnalysisResult,
}

impl AnalysisEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Root mean square of `samples`, clamped to [0, 1]. Empty input yields 0.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples
        .iter()
        .map(|sample| f64::from(*sample) * f64::from(*sample))
        .sum();
    let rms = (sum / samples.len() as f64).sqrt() as f32;
    if rms.is_nan() {
        0.0
    } else {
        rms.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn rms_of_constant_signal() {
        assert_relative_eq!(compute_rms(&[0.5; 64]), 0.5);
        assert_relative_eq!(compute_rms(&[-0.25, 0.25]), 0.25);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn rms_is_clamped_for_hot_signals() {
        assert_eq!(compute_rms(&[4.0; 16]), 1.0);
        assert_eq!(compute_rms(&[f32::MAX; 16]), 1.0);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let result = AudioAnalysisResult {
            amplitude: 0.5,
            eq_bands: [0.0, 0.25, 0.5, 0.75, 1.0, 0.0],
        };

        let value = serde_json::to_value(result.to_event()).unwrap();
        assert_eq!(value["event"], AUDIO_TAP_EVENT);
        assert_eq!(value["amplitude"], 0.5);
        assert_eq!(value["eqBands"].as_array().unwrap().len(), BAND_COUNT);
        assert_eq!(value["eqBands"][3], 0.75);
    }

    #[test]
    fn event_json_parses_back() {
        let event = AudioAnalysisResult::ZERO.to_event();
        let json = event.to_json().unwrap();
        let parsed: AnalysisEvent = serde_json::from_str(&json).unwrap();
        assert!(parsed.result.is_zero());
    }

    #[test]
    fn dominant_band_prefers_lowest_on_ties() {
        let mut result = AudioAnalysisResult::ZERO;
        assert_eq!(result.dominant_band(), 0);
        result.eq_bands[2] = 0.4;
        result.eq_bands[4] = 0.4;
        assert_eq!(result.dominant_band(), 2);
    }
}
