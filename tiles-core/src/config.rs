//! # Engine Configuration
//!
//! All tunables of the detection and judgment pipeline. Every field has a
//! default, so a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Root of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub quantizer: QuantizerConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// How the difference function is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceMethod {
    /// Direct O(N²) summation.
    #[default]
    Direct,
    /// Cross-correlation through rustfft.
    Fft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchConfig {
    /// Cumulative-mean-normalized difference a lag must fall below.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_frequency")]
    pub min_frequency_hz: f32,
    #[serde(default = "default_max_frequency")]
    pub max_frequency_hz: f32,
    /// RMS below which a frame is treated as silence.
    #[serde(default = "default_amplitude_threshold")]
    pub amplitude_threshold: f32,
    #[serde(default)]
    pub method: DifferenceMethod,
    /// Refine the chosen lag with a parabolic fit through its neighbours, so
    /// the reported frequency is `sample_rate / τ'` with a fractional `τ'`
    /// rather than `sample_rate / τ`. Lag selection is unaffected. Integer
    /// lags alone are too coarse near the top of the range (4 kHz is about
    /// 11 samples at 44.1 kHz) to stay within 2%.
    #[serde(default = "default_true")]
    pub interpolate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizerConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance_hz: f32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_debounce")]
    pub debounce_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fall duration of a tile.
    #[serde(default = "default_lead_time")]
    pub lead_time_ms: f64,
    /// How long past its start time a tile stays playable.
    #[serde(default = "default_good_window")]
    pub miss_tolerance_ms: f64,
    /// Restart from the first note once the song is exhausted.
    #[serde(default = "default_true")]
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_perfect_window")]
    pub perfect_window_ms: f64,
    #[serde(default = "default_good_window")]
    pub good_window_ms: f64,
    /// Subtracted from every detection time before judging.
    #[serde(default)]
    pub input_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Samples the analysis window advances between frames.
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Number of recent hits the latency calibrator keeps.
    #[serde(default = "default_calibration_window")]
    pub calibration_window: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_frequency_hz: default_min_frequency(),
            max_frequency_hz: default_max_frequency(),
            amplitude_threshold: default_amplitude_threshold(),
            method: DifferenceMethod::default(),
            interpolate: true,
        }
    }
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            tolerance_hz: default_tolerance(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce() }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lead_time_ms: default_lead_time(),
            miss_tolerance_ms: default_good_window(),
            looping: true,
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            perfect_window_ms: default_perfect_window(),
            good_window_ms: default_good_window(),
            input_latency_ms: 0.0,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            hop_size: default_hop_size(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            calibration_window: default_calibration_window(),
        }
    }
}

fn default_true() -> bool { true }
fn default_threshold() -> f32 { 0.1 }
fn default_min_frequency() -> f32 { 27.5 }
fn default_max_frequency() -> f32 { 4200.0 }
fn default_amplitude_threshold() -> f32 { 0.01 }
fn default_tolerance() -> f32 { 50.0 }
fn default_min_confidence() -> f32 { 0.85 }
fn default_debounce() -> i64 { 500 }
fn default_lead_time() -> f64 { 3000.0 }
fn default_perfect_window() -> f64 { 50.0 }
fn default_good_window() -> f64 { 150.0 }
fn default_buffer_size() -> usize { crate::audio::BUFFER_SIZE }
fn default_hop_size() -> usize { crate::audio::BUFFER_SIZE / 2 }
fn default_sample_rate() -> u32 { 44_100 }
fn default_tick_interval() -> u64 { 50 }
fn default_calibration_window() -> usize { 32 }

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

impl EngineConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Rejects combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pitch = &self.pitch;
        if !(pitch.threshold > 0.0 && pitch.threshold < 1.0) {
            return Err(invalid("pitch.threshold", "must be within (0, 1)"));
        }
        if !(pitch.min_frequency_hz > 0.0 && pitch.min_frequency_hz < pitch.max_frequency_hz) {
            return Err(invalid(
                "pitch.min_frequency_hz",
                "must be positive and below pitch.max_frequency_hz",
            ));
        }
        if pitch.amplitude_threshold < 0.0 {
            return Err(invalid("pitch.amplitude_threshold", "must not be negative"));
        }
        if self.quantizer.tolerance_hz <= 0.0 {
            return Err(invalid("quantizer.tolerance_hz", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.quantizer.min_confidence) {
            return Err(invalid("quantizer.min_confidence", "must be within [0, 1]"));
        }
        if self.events.debounce_ms < 0 {
            return Err(invalid("events.debounce_ms", "must not be negative"));
        }
        if !(self.scheduler.lead_time_ms.is_finite() && self.scheduler.lead_time_ms > 0.0) {
            return Err(invalid("scheduler.lead_time_ms", "must be positive"));
        }
        if !(self.scheduler.miss_tolerance_ms.is_finite() && self.scheduler.miss_tolerance_ms >= 0.0) {
            return Err(invalid("scheduler.miss_tolerance_ms", "must not be negative"));
        }
        let judge = &self.judge;
        if !(judge.perfect_window_ms >= 0.0 && judge.perfect_window_ms <= judge.good_window_ms) {
            return Err(invalid(
                "judge.perfect_window_ms",
                "must be non-negative and no wider than judge.good_window_ms",
            ));
        }
        if self.audio.buffer_size < crate::pitch::MIN_FRAME_LEN {
            return Err(invalid(
                "audio.buffer_size",
                format!("must be at least {}", crate::pitch::MIN_FRAME_LEN),
            ));
        }
        if self.audio.hop_size == 0 || self.audio.hop_size > self.audio.buffer_size {
            return Err(invalid("audio.hop_size", "must be within 1..=audio.buffer_size"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.session.tick_interval_ms == 0 {
            return Err(invalid("session.tick_interval_ms", "must be positive"));
        }
        Ok(())
    }
}
