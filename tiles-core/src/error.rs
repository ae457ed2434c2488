//! # Error Types
//!
//! Only conditions a caller can act on are errors here. Silence, noise,
//! ambiguous pitches and stray hits are expressed as `None` by the modules
//! that produce them.

use thiserror::Error;

/// Reasons a song timeline is rejected at construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    /// A note starts before the note preceding it.
    #[error("note {index} starts at {start_ms} ms, before the previous note at {previous_ms} ms")]
    NonMonotonic {
        /// Position of the offending note.
        index: usize,
        /// Its start time.
        start_ms: f64,
        /// Start time of the note before it.
        previous_ms: f64,
    },

    /// A start time or duration is negative, NaN or infinite.
    #[error("note {index} has an invalid {field}: {value}")]
    InvalidTime {
        /// Position of the offending note.
        index: usize,
        /// Which field was invalid.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Velocity outside the MIDI range.
    #[error("note {index} has velocity {velocity}, expected 0-127")]
    InvalidVelocity {
        /// Position of the offending note.
        index: usize,
        /// The rejected value.
        velocity: u32,
    },

    /// Tempo must be a positive, finite number.
    #[error("invalid bpm: {0}")]
    InvalidBpm(f64),

    /// The declared song length ends before the last note does.
    #[error("declared duration {declared_ms} ms is shorter than the last note end {last_end_ms} ms")]
    DurationTooShort {
        /// Duration given by the song source.
        declared_ms: f64,
        /// End of the latest-ending note.
        last_end_ms: f64,
    },

    /// The song document could not be parsed.
    #[error("malformed song document: {0}")]
    Parse(String),
}

/// Failures reported by the audio capture collaborator.
///
/// Any of these ends live capture for the session. The session keeps running
/// without audio so manual input still works.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// The platform refused microphone access.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable input device.
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device offers no mono f32 format near the requested rate.
    #[error("no suitable input format near {0} Hz")]
    UnsupportedFormat(u32),

    /// Capture was started twice without stopping.
    #[error("capture already running")]
    AlreadyRunning,

    /// Anything else the audio backend reported.
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Invalid engine tunables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A tunable is outside its usable range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The config file could not be read.
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for [`crate::config::EngineConfig`].
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error for session construction.
#[derive(Debug, Error)]
pub enum EngineError {
    /// See [`TimelineError`].
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// See [`CaptureError`].
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
}
