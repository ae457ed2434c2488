//! # Song Timeline Module
//!
//! The ordered list of notes a player is expected to hit. Timelines are
//! validated once at construction; everything downstream assumes a
//! well-formed timeline and never mutates it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::TimelineError;
use crate::tuning::Key;

/// One expected note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedNote {
    pub key: Key,
    pub start_time_ms: f64,
    pub duration_ms: f64,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_velocity() -> u8 { 100 }

/// Song document as supplied by the song-management side.
#[derive(Debug, Clone, Deserialize)]
struct SongDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default = "default_bpm")]
    bpm: f64,
    #[serde(default)]
    total_duration_ms: Option<f64>,
    notes: Vec<RawNote>,
}

/// Velocity is parsed wide so out-of-range values get a proper error.
#[derive(Debug, Clone, Deserialize)]
struct RawNote {
    key: Key,
    start_time_ms: f64,
    duration_ms: f64,
    #[serde(default = "default_raw_velocity")]
    velocity: u32,
}

fn default_bpm() -> f64 { 120.0 }
fn default_raw_velocity() -> u32 { 100 }

/// An immutable, validated sequence of expected notes.
#[derive(Debug, Clone, PartialEq)]
pub struct SongTimeline {
    title: Option<String>,
    notes: Vec<ExpectedNote>,
    bpm: f64,
    total_duration_ms: f64,
}

impl SongTimeline {
    /// Validates and builds a timeline.
    ///
    /// Notes must be ordered by start time with finite, non-negative times.
    /// When `total_duration_ms` is `None` the song ends with its last note.
    pub fn new(
        notes: Vec<ExpectedNote>,
        bpm: f64,
        total_duration_ms: Option<f64>,
    ) -> Result<Self, TimelineError> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(TimelineError::InvalidBpm(bpm));
        }

        let mut previous_ms = f64::NEG_INFINITY;
        let mut last_end_ms: f64 = 0.0;
        for (index, note) in notes.iter().enumerate() {
            check_time(index, "start_time_ms", note.start_time_ms)?;
            check_time(index, "duration_ms", note.duration_ms)?;
            if note.velocity > 127 {
                return Err(TimelineError::InvalidVelocity { index, velocity: note.velocity as u32 });
            }
            if note.start_time_ms < previous_ms {
                return Err(TimelineError::NonMonotonic {
                    index,
                    start_ms: note.start_time_ms,
                    previous_ms,
                });
            }
            previous_ms = note.start_time_ms;
            last_end_ms = last_end_ms.max(note.start_time_ms + note.duration_ms);
        }

        let total_duration_ms = match total_duration_ms {
            Some(declared_ms) => {
                if !declared_ms.is_finite() || declared_ms < last_end_ms {
                    return Err(TimelineError::DurationTooShort { declared_ms, last_end_ms });
                }
                declared_ms
            }
            None => last_end_ms,
        };

        Ok(Self { title: None, notes, bpm, total_duration_ms })
    }

    /// Parses a song document:
    ///
    /// ```json
    /// { "title": "Scale", "bpm": 90,
    ///   "notes": [ { "key": "C4", "start_time_ms": 1000, "duration_ms": 500 } ] }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, TimelineError> {
        let document: SongDocument =
            serde_json::from_str(json).map_err(|e| TimelineError::Parse(e.to_string()))?;

        let mut notes = Vec::with_capacity(document.notes.len());
        for (index, raw) in document.notes.into_iter().enumerate() {
            let velocity = u8::try_from(raw.velocity)
                .ok()
                .filter(|v| *v <= 127)
                .ok_or(TimelineError::InvalidVelocity { index, velocity: raw.velocity })?;
            notes.push(ExpectedNote {
                key: raw.key,
                start_time_ms: raw.start_time_ms,
                duration_ms: raw.duration_ms,
                velocity,
            });
        }

        let mut timeline = Self::new(notes, document.bpm, document.total_duration_ms)?;
        timeline.title = document.title;
        Ok(timeline)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TimelineError::Parse(e.to_string()))?;
        Self::from_json_str(&content)
    }

    pub fn notes(&self) -> &[ExpectedNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Length of one pass through the song.
    pub fn total_duration_ms(&self) -> f64 {
        self.total_duration_ms
    }
}

fn check_time(index: usize, field: &'static str, value: f64) -> Result<(), TimelineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TimelineError::InvalidTime { index, field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: u8, start: f64, duration: f64) -> ExpectedNote {
        ExpectedNote {
            key: Key::new(key).unwrap(),
            start_time_ms: start,
            duration_ms: duration,
            velocity: 90,
        }
    }

    #[test]
    fn derives_duration_from_last_note() {
        let timeline =
            SongTimeline::new(vec![note(1, 0.0, 500.0), note(2, 400.0, 800.0)], 120.0, None).unwrap();
        assert_eq!(timeline.total_duration_ms(), 1200.0);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn rejects_non_monotonic_notes() {
        let err = SongTimeline::new(vec![note(1, 500.0, 10.0), note(2, 100.0, 10.0)], 120.0, None)
            .unwrap_err();
        assert!(matches!(err, TimelineError::NonMonotonic { index: 1, .. }));
    }

    #[test]
    fn rejects_bad_fields() {
        assert!(matches!(
            SongTimeline::new(vec![note(1, -5.0, 10.0)], 120.0, None),
            Err(TimelineError::InvalidTime { field: "start_time_ms", .. })
        ));
        assert!(matches!(
            SongTimeline::new(vec![note(1, 0.0, f64::NAN)], 120.0, None),
            Err(TimelineError::InvalidTime { field: "duration_ms", .. })
        ));
        assert!(matches!(SongTimeline::new(vec![], 0.0, None), Err(TimelineError::InvalidBpm(_))));
        assert!(matches!(
            SongTimeline::new(vec![note(1, 0.0, 1000.0)], 120.0, Some(500.0)),
            Err(TimelineError::DurationTooShort { .. })
        ));
    }

    #[test]
    fn parses_song_documents() {
        let timeline = SongTimeline::from_json_str(
            r#"{
                "title": "Two notes",
                "bpm": 96,
                "total_duration_ms": 4000,
                "notes": [
                    { "key": 1, "start_time_ms": 1000, "duration_ms": 500 },
                    { "key": "Eb4", "start_time_ms": 1500, "duration_ms": 250, "velocity": 64 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(timeline.title(), Some("Two notes"));
        assert_eq!(timeline.notes()[1].key.number(), 10);
        assert_eq!(timeline.notes()[0].velocity, 100);
        assert_eq!(timeline.total_duration_ms(), 4000.0);
    }

    #[test]
    fn rejects_missing_fields_and_bad_velocity() {
        assert!(matches!(
            SongTimeline::from_json_str(r#"{ "notes": [ { "key": 1, "start_time_ms": 0 } ] }"#),
            Err(TimelineError::Parse(_))
        ));
        assert!(matches!(
            SongTimeline::from_json_str(
                r#"{ "notes": [ { "key": 1, "start_time_ms": 0, "duration_ms": 1, "velocity": 300 } ] }"#
            ),
            Err(TimelineError::InvalidVelocity { velocity: 300, .. })
        ));
    }
}
