//! Maps continuous pitch estimates onto the 15 keys.

use crate::config::QuantizerConfig;
use crate::pitch::PitchEstimate;
use crate::tuning::{self, Key};

/// A key match with the distance it was accepted at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantized {
    pub key: Key,
    pub distance_hz: f32,
    pub cents: f32,
}

/// Nearest-key quantizer with a frequency tolerance and a confidence floor.
#[derive(Debug, Clone)]
pub struct NoteQuantizer {
    config: QuantizerConfig,
}

impl NoteQuantizer {
    pub fn new(config: QuantizerConfig) -> Self {
        Self { config }
    }

    /// The key nearest to the estimate, or `None` for silence, low confidence,
    /// or a pitch farther than the tolerance from every key.
    pub fn quantize(&self, estimate: &PitchEstimate) -> Option<Key> {
        self.quantize_detailed(estimate).map(|q| q.key)
    }

    pub fn quantize_detailed(&self, estimate: &PitchEstimate) -> Option<Quantized> {
        if !estimate.is_pitched() || !estimate.frequency_hz.is_finite() {
            return None;
        }
        if estimate.confidence <= self.config.min_confidence {
            return None;
        }
        let (key, distance_hz) = tuning::find_nearest_key(estimate.frequency_hz);
        if distance_hz >= self.config.tolerance_hz {
            return None;
        }
        Some(Quantized {
            key,
            distance_hz,
            cents: tuning::calculate_cents_deviation(estimate.frequency_hz, key.frequency()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(frequency_hz: f32, confidence: f32) -> PitchEstimate {
        PitchEstimate { frequency_hz, confidence }
    }

    fn quantizer() -> NoteQuantizer {
        NoteQuantizer::new(QuantizerConfig::default())
    }

    #[test]
    fn snaps_to_nearest_key() {
        let q = quantizer();
        assert_eq!(q.quantize(&estimate(440.0, 0.95)).map(Key::number), Some(6));
        assert_eq!(q.quantize(&estimate(263.0, 0.95)).map(Key::number), Some(1));
        assert_eq!(q.quantize(&estimate(470.0, 0.95)).map(|k| k.name()), Some("A#4"));
    }

    #[test]
    fn silence_is_none() {
        assert_eq!(quantizer().quantize(&PitchEstimate::NONE), None);
    }

    #[test]
    fn low_confidence_is_none() {
        assert_eq!(quantizer().quantize(&estimate(440.0, 0.5)), None);
    }

    #[test]
    fn never_exceeds_tolerance() {
        let q = NoteQuantizer::new(QuantizerConfig { tolerance_hz: 20.0, min_confidence: 0.0 });
        let mut freq = 100.0;
        while freq < 900.0 {
            if let Some(found) = q.quantize_detailed(&estimate(freq, 1.0)) {
                assert!((found.key.frequency() - freq).abs() < 20.0);
                assert_eq!(found.distance_hz, (found.key.frequency() - freq).abs());
            }
            freq += 3.7;
        }
        assert_eq!(q.quantize(&estimate(200.0, 1.0)), None);
        assert_eq!(q.quantize(&estimate(700.0, 1.0)), None);
    }

    #[test]
    fn reports_cents_deviation() {
        let found = quantizer().quantize_detailed(&estimate(445.0, 0.99)).unwrap();
        assert!(found.cents > 19.0 && found.cents < 20.0);
    }
}
