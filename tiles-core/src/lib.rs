// tiles-core/src/lib.rs

//! The core engine for the falling-tiles piano game.
//! This crate turns microphone audio into note events, schedules the notes
//! of a song as falling tiles, judges hit timing and keeps the score. It is
//! completely headless and contains no rendering code.

pub mod audio;
pub mod calibration;
pub mod config;
pub mod error;
pub mod events;
pub mod fft;
pub mod judge;
pub mod pitch;
pub mod quantizer;
pub mod scheduler;
pub mod score;
pub mod session;
pub mod timeline;
pub mod tuning;

pub use audio::{AudioFrame, AudioSource, CaptureGuard, SampleBuffer, ToneSource};
pub use config::EngineConfig;
pub use error::{CaptureError, ConfigError, EngineError, TimelineError};
pub use events::{NoteEvent, NoteEventStream};
pub use judge::{Grade, HitJudge, Verdict};
pub use pitch::{PitchDetector, PitchEstimate};
pub use quantizer::NoteQuantizer;
pub use scheduler::{ScheduledToken, TickOutcome, TileScheduler, TokenState};
pub use score::{ScoreEngine, ScoreState};
pub use session::{Analyzer, FrameAnalysis, GameClock, GameSession, TickReport, TileView};
pub use timeline::{ExpectedNote, SongTimeline};
pub use tuning::Key;
