//! Turns per-frame key detections into discrete note-on events.

use serde::Serialize;

use crate::config::EventConfig;
use crate::pitch::PitchEstimate;
use crate::tuning::Key;

/// A note-on, timestamped on the game clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    pub key: Key,
    pub frequency: f32,
    pub detected_at_ms: i64,
    pub confidence: f32,
}

impl NoteEvent {
    /// An event from a direct key press rather than from audio.
    pub fn manual(key: Key, detected_at_ms: i64) -> Self {
        Self {
            key,
            frequency: key.frequency(),
            detected_at_ms,
            confidence: 1.0,
        }
    }
}

/// Debounces detections so a sustained tone yields one event per window.
///
/// A new event is emitted when the key differs from the last emitted one, or
/// when at least `debounce_ms` have passed since that emission. Frames with no
/// key neither emit nor reset the timer, so a short dropout inside a held
/// note does not retrigger it.
#[derive(Debug, Clone)]
pub struct NoteEventStream {
    debounce_ms: i64,
    last: Option<(Key, i64)>,
}

impl NoteEventStream {
    pub fn new(config: &EventConfig) -> Self {
        Self { debounce_ms: config.debounce_ms, last: None }
    }

    /// Feeds a detection carrying only the key; the event reports the key's
    /// nominal frequency.
    pub fn feed(&mut self, key: Option<Key>, now_ms: i64) -> Option<NoteEvent> {
        let key = key?;
        self.emit(key, key.frequency(), 1.0, now_ms)
    }

    /// Feeds a detection together with the estimate it came from.
    pub fn feed_estimate(
        &mut self,
        key: Option<Key>,
        estimate: &PitchEstimate,
        now_ms: i64,
    ) -> Option<NoteEvent> {
        let key = key?;
        self.emit(key, estimate.frequency_hz, estimate.confidence, now_ms)
    }

    /// Forgets the last emission.
    pub fn reset(&mut self) {
        self.last = None;
    }

    fn emit(&mut self, key: Key, frequency: f32, confidence: f32, now_ms: i64) -> Option<NoteEvent> {
        let due = match self.last {
            None => true,
            Some((last_key, at)) => last_key != key || now_ms - at >= self.debounce_ms,
        };
        if !due {
            return None;
        }
        self.last = Some((key, now_ms));
        Some(NoteEvent { key, frequency, detected_at_ms: now_ms, confidence })
    }
}
