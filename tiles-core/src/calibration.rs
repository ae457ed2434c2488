//! Input latency estimation from recent hits.
//!
//! Microphone buffering delays every detection by roughly the same amount.
//! Fitting `offset = a·t + b` over the last hits gives both that delay (the
//! fitted offset at the latest hit) and any drift between the audio clock and
//! the game clock (`a`).

use linreg::linear_regression;
use serde::Serialize;
use std::collections::VecDeque;

use crate::judge::Verdict;

/// Hits needed before an estimate is reported.
pub const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyEstimate {
    /// Systematic lateness of detections at the most recent hit.
    pub latency_ms: f64,
    /// Change of that lateness per second of play.
    pub drift_ms_per_s: f64,
    pub samples: usize,
}

#[derive(Debug, Clone)]
pub struct LatencyCalibrator {
    capacity: usize,
    /// (due time, offset) of recent hits.
    samples: VecDeque<(f64, f64)>,
}

impl LatencyCalibrator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_SAMPLES);
        Self { capacity, samples: VecDeque::with_capacity(capacity) }
    }

    /// Records a verdict; misses carry no timing information and are ignored.
    pub fn record(&mut self, verdict: &Verdict) {
        if !verdict.grade.is_hit() {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((verdict.expected_ms, verdict.offset_ms));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// `None` until [`MIN_SAMPLES`] hits have been recorded.
    pub fn estimate(&self) -> Option<LatencyEstimate> {
        let n = self.samples.len();
        if n < MIN_SAMPLES {
            return None;
        }
        let (times, offsets): (Vec<f64>, Vec<f64>) = self.samples.iter().copied().unzip();
        let latest = times[n - 1];

        match linear_regression::<f64, f64, f64>(times.as_slice(), offsets.as_slice()) {
            Ok((slope, intercept)) if slope.is_finite() && intercept.is_finite() => {
                Some(LatencyEstimate {
                    latency_ms: slope * latest + intercept,
                    drift_ms_per_s: slope * 1000.0,
                    samples: n,
                })
            }
            // All hits at the same due time: no slope to fit.
            _ => Some(LatencyEstimate {
                latency_ms: offsets.iter().sum::<f64>() / n as f64,
                drift_ms_per_s: 0.0,
                samples: n,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Grade;
    use crate::tuning::Key;

    fn hit(expected_ms: f64, offset_ms: f64) -> Verdict {
        Verdict {
            grade: Grade::Good,
            key: Key::new(1).unwrap(),
            offset_ms,
            token_id: 0,
            expected_ms,
        }
    }

    #[test]
    fn needs_a_few_hits() {
        let mut calibrator = LatencyCalibrator::new(8);
        calibrator.record(&hit(1000.0, 40.0));
        calibrator.record(&hit(2000.0, 40.0));
        assert!(calibrator.estimate().is_none());
    }

    #[test]
    fn constant_lateness_is_the_latency() {
        let mut calibrator = LatencyCalibrator::new(8);
        for i in 0..5 {
            calibrator.record(&hit(1000.0 * i as f64, 45.0));
        }
        let estimate = calibrator.estimate().unwrap();
        assert!((estimate.latency_ms - 45.0).abs() < 1e-6);
        assert!(estimate.drift_ms_per_s.abs() < 1e-6);
    }

    #[test]
    fn drift_is_extrapolated_to_latest_hit() {
        let mut calibrator = LatencyCalibrator::new(8);
        for i in 0..4 {
            let t = 1000.0 * i as f64;
            calibrator.record(&hit(t, 20.0 + t / 100.0));
        }
        let estimate = calibrator.estimate().unwrap();
        assert!((estimate.latency_ms - 50.0).abs() < 1e-6);
        assert!((estimate.drift_ms_per_s - 10.0).abs() < 1e-6);
    }

    #[test]
    fn misses_are_ignored_and_window_is_bounded() {
        let mut calibrator = LatencyCalibrator::new(3);
        calibrator.record(&Verdict { grade: Grade::Miss, ..hit(0.0, 500.0) });
        assert!(calibrator.is_empty());
        for i in 0..10 {
            calibrator.record(&hit(i as f64, 0.0));
        }
        assert_eq!(calibrator.len(), 3);
    }

    #[test]
    fn simultaneous_hits_fall_back_to_mean() {
        let mut calibrator = LatencyCalibrator::new(4);
        for offset in [10.0, 20.0, 30.0] {
            calibrator.record(&hit(500.0, offset));
        }
        let estimate = calibrator.estimate().unwrap();
        assert!((estimate.latency_ms - 20.0).abs() < 1e-9);
    }
}
