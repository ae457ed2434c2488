//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-backed computation of the YIN difference function, and the signal
//! conditioning shared by both difference methods.
//!
//! The difference function expands to
//! `d(τ) = Σ x[i]² + Σ x[i+τ]² − 2·Σ x[i]·x[i+τ]`. The two energy terms come
//! from a prefix sum of squares and the cross term is one circular
//! cross-correlation, so the whole function costs O(N log N) instead of O(N²).

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant bias inflates every term of the difference function and can
/// hide the period dip.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 { return; }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Direct evaluation of `d(τ) = Σ_{i<W} (x[i] − x[i+τ])²` for `τ ∈ [0, W)`.
///
/// `signal` must hold at least `2W − 1` samples.
pub fn difference_direct(signal: &[f32], window: usize) -> Vec<f32> {
    let mut diff = vec![0.0; window];
    for tau in 1..window {
        let mut sum = 0.0;
        for i in 0..window {
            let delta = signal[i] - signal[i + tau];
            sum += delta * delta;
        }
        diff[tau] = sum;
    }
    diff
}

/// Planned forward and inverse transforms for one padded length.
pub struct FftDifference {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for FftDifference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftDifference").field("len", &self.len).finish()
    }
}

impl FftDifference {
    /// Plans transforms for frames of `frame_len` samples.
    pub fn new(frame_len: usize) -> Self {
        let len = frame_len.max(2).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    /// Transform length the plans were made for.
    pub fn padded_len(&self) -> usize {
        self.len
    }

    /// Same result as [`difference_direct`], up to rounding.
    ///
    /// Frames longer than the planned length get a one-off plan.
    pub fn compute(&self, signal: &[f32], window: usize) -> Vec<f32> {
        if signal.len() > self.len {
            return Self::new(signal.len()).compute(signal, window);
        }
        if window == 0 {
            return Vec::new();
        }

        // Cross term: c[τ] = Σ_{i<W} x[i]·x[i+τ]. Since i + τ < 2W ≤ N ≤ len,
        // the circular correlation never wraps.
        let mut head: Vec<Complex<f64>> = (0..self.len)
            .map(|i| {
                let re = if i < window { signal[i] as f64 } else { 0.0 };
                Complex { re, im: 0.0 }
            })
            .collect();
        let mut full: Vec<Complex<f64>> = (0..self.len)
            .map(|i| Complex { re: signal.get(i).copied().unwrap_or(0.0) as f64, im: 0.0 })
            .collect();

        self.forward.process(&mut head);
        self.forward.process(&mut full);

        let mut product: Vec<Complex<f64>> = head
            .iter()
            .zip(full.iter())
            .map(|(a, b)| a.conj() * *b)
            .collect();
        self.inverse.process(&mut product);
        let scale = 1.0 / self.len as f64;

        // Energy terms from a prefix sum of squares.
        let mut prefix = Vec::with_capacity(signal.len() + 1);
        prefix.push(0.0_f64);
        for &s in signal {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + (s as f64) * (s as f64));
        }
        let head_energy = prefix[window];

        let mut diff = vec![0.0; window];
        for tau in 1..window {
            let shifted_energy = prefix[tau + window] - prefix[tau];
            let cross = product[tau].re * scale;
            diff[tau] = (head_energy + shifted_energy - 2.0 * cross).max(0.0) as f32;
        }
        diff
    }
}
