//! # Pitch Detection Module
//!
//! YIN pitch estimation for single piano notes.
//!
//! ## Features
//! - Difference function computed directly or through the FFT
//! - Cumulative mean normalized difference
//! - First qualifying local minimum, so octave errors toward longer lags are avoided
//! - RMS noise gate to skip silent frames
//! - Optional parabolic interpolation for sub-sample accuracy

use crate::audio::AudioFrame;
use crate::config::{DifferenceMethod, PitchConfig};
use crate::fft::{self, FftDifference};

/// Frames shorter than this are reported as "no pitch".
pub const MIN_FRAME_LEN: usize = 64;

/// Result of one analysis cycle. `frequency_hz == 0.0` means no pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    /// `1 − d'(τ)` at the chosen lag, within `[0, 1]`.
    pub confidence: f32,
}

impl PitchEstimate {
    pub const NONE: PitchEstimate = PitchEstimate { frequency_hz: 0.0, confidence: 0.0 };

    pub fn is_pitched(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// A YIN estimator with fixed parameters.
///
/// `estimate` is a pure function of the frame; the detector only caches
/// FFT plans.
#[derive(Debug)]
pub struct PitchDetector {
    config: PitchConfig,
    fft: Option<FftDifference>,
}

impl PitchDetector {
    /// A detector for frames of the default [`crate::audio::BUFFER_SIZE`].
    pub fn new(config: PitchConfig) -> Self {
        Self::with_frame_len(config, crate::audio::BUFFER_SIZE)
    }

    /// A detector whose FFT plans fit frames of `frame_len` samples.
    pub fn with_frame_len(config: PitchConfig, frame_len: usize) -> Self {
        let fft = match config.method {
            DifferenceMethod::Fft => Some(FftDifference::new(frame_len)),
            DifferenceMethod::Direct => None,
        };
        Self { config, fft }
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    /// Estimates the fundamental frequency of a frame.
    ///
    /// # Returns
    /// * A pitched estimate when a lag qualifies and its frequency lies in the
    ///   configured range
    /// * [`PitchEstimate::NONE`] for short frames, silence, noise, or
    ///   out-of-range pitches
    pub fn estimate(&self, frame: &AudioFrame) -> PitchEstimate {
        let frame_size = frame.len();
        if frame_size < MIN_FRAME_LEN || frame.sample_rate == 0 {
            return PitchEstimate::NONE;
        }

        let mut signal = frame.samples.clone();
        fft::remove_dc_offset(&mut signal);

        // --- Noise Gate ---
        let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
        if !rms.is_finite() || rms < self.config.amplitude_threshold {
            return PitchEstimate::NONE;
        }

        // --- Step 1: Difference function ---
        let window = frame_size / 2;
        let mut yin_buffer = match &self.fft {
            Some(planned) => planned.compute(&signal, window),
            None => fft::difference_direct(&signal, window),
        };

        // --- Step 2: Cumulative mean normalized difference ---
        cumulative_mean_normalize(&mut yin_buffer);

        // --- Step 3: First local minimum under the threshold ---
        let Some(period) = first_qualifying_lag(&yin_buffer, self.config.threshold) else {
            return PitchEstimate::NONE;
        };

        // --- Step 4: Optional parabolic refinement of the chosen lag ---
        let period_float = if self.config.interpolate {
            refine_lag(&yin_buffer, period)
        } else {
            period as f32
        };

        let frequency = frame.sample_rate as f32 / period_float;
        if !frequency.is_finite()
            || frequency < self.config.min_frequency_hz
            || frequency > self.config.max_frequency_hz
        {
            return PitchEstimate::NONE;
        }

        PitchEstimate {
            frequency_hz: frequency,
            confidence: (1.0 - yin_buffer[period]).clamp(0.0, 1.0),
        }
    }
}

/// `d'(τ) = d(τ) · τ / Σ_{j=1..τ} d(j)`, with `d'(0) = 1`.
///
/// A zero running sum (a perfectly constant prefix) maps to 1 rather than NaN.
pub fn cumulative_mean_normalize(yin_buffer: &mut [f32]) {
    if yin_buffer.is_empty() {
        return;
    }
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..yin_buffer.len() {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }
}

/// Scans `τ ≥ 2` upwards for the first lag below `threshold` that is a local
/// minimum (`d'(τ−1) ≥ d'(τ) ≤ d'(τ+1)`). The last lag has no right
/// neighbour and never qualifies.
pub fn first_qualifying_lag(yin_buffer: &[f32], threshold: f32) -> Option<usize> {
    let len = yin_buffer.len();
    (2..len.saturating_sub(1)).find(|&tau| {
        let value = yin_buffer[tau];
        value < threshold && yin_buffer[tau - 1] >= value && value <= yin_buffer[tau + 1]
    })
}

/// Vertex of the parabola through the chosen lag and its neighbours.
fn refine_lag(yin_buffer: &[f32], period: usize) -> f32 {
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() > f32::EPSILON {
        let shift = (y1 - y3) / (2.0 * denominator);
        // A true local minimum keeps the vertex within half a sample.
        period as f32 + shift.clamp(-0.5, 0.5)
    } else {
        period as f32
    }
}
