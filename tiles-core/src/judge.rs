//! # Hit Judgment Module
//!
//! Matches note events against pending tokens and grades the timing.
//!
//! Every token is resolved exactly once, by one of two paths:
//! - [`HitJudge::judge`] takes the token out of the scheduler and grades it.
//!   A match outside the good window is a Miss and still retires the token.
//! - [`HitJudge::expire`] grades a token the scheduler timed out as a Miss.

use serde::Serialize;

use crate::config::JudgeConfig;
use crate::events::NoteEvent;
use crate::scheduler::{ScheduledToken, TileScheduler};
use crate::tuning::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    Perfect,
    Good,
    Miss,
}

impl Grade {
    /// Points before the combo multiplier.
    pub fn base_points(self) -> u64 {
        match self {
            Grade::Perfect => 100,
            Grade::Good => 50,
            Grade::Miss => 0,
        }
    }

    pub fn is_hit(self) -> bool {
        !matches!(self, Grade::Miss)
    }
}

/// The outcome of resolving one token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub grade: Grade,
    pub key: Key,
    /// Detection time minus due time; negative is early.
    pub offset_ms: f64,
    pub token_id: u64,
    /// Due time of the resolved token.
    pub expected_ms: f64,
}

#[derive(Debug, Clone)]
pub struct HitJudge {
    config: JudgeConfig,
}

impl HitJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Grades a timing offset. Both window bounds are inclusive.
    pub fn classify(&self, offset_ms: f64) -> Grade {
        let distance = offset_ms.abs();
        if distance <= self.config.perfect_window_ms {
            Grade::Perfect
        } else if distance <= self.config.good_window_ms {
            Grade::Good
        } else {
            Grade::Miss
        }
    }

    /// Resolves an event against the closest pending token of the same key.
    ///
    /// # Returns
    /// * `Some(verdict)` - A token was matched and retired
    /// * `None` - Stray hit: no pending token for that key; nothing changes
    pub fn judge(&self, event: &NoteEvent, scheduler: &mut TileScheduler) -> Option<Verdict> {
        let detected_ms = event.detected_at_ms as f64 - self.config.input_latency_ms;
        let Some(token) = scheduler.take_candidate(event.key, detected_ms) else {
            log::debug!("Stray hit on key {} at {} ms", event.key, event.detected_at_ms);
            return None;
        };

        let offset_ms = detected_ms - token.start_time_ms;
        let verdict = Verdict {
            grade: self.classify(offset_ms),
            key: token.key,
            offset_ms,
            token_id: token.id,
            expected_ms: token.start_time_ms,
        };
        log::debug!(
            "{:?} on key {} (offset {:+.1} ms, token {})",
            verdict.grade, verdict.key, offset_ms, token.id
        );
        Some(verdict)
    }

    /// Miss verdict for a token the scheduler timed out.
    pub fn expire(&self, token: &ScheduledToken, game_time_ms: f64) -> Verdict {
        Verdict {
            grade: Grade::Miss,
            key: token.key,
            offset_ms: game_time_ms - token.start_time_ms,
            token_id: token.id,
            expected_ms: token.start_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::timeline::{ExpectedNote, SongTimeline};

    fn key(n: u8) -> Key {
        Key::new(n).unwrap()
    }

    fn judge() -> HitJudge {
        HitJudge::new(JudgeConfig::default())
    }

    fn scheduler_with(notes: &[(u8, f64)]) -> TileScheduler {
        let notes = notes
            .iter()
            .map(|&(k, start)| ExpectedNote {
                key: key(k),
                start_time_ms: start,
                duration_ms: 100.0,
                velocity: 100,
            })
            .collect();
        let timeline = SongTimeline::new(notes, 120.0, None).unwrap();
        let mut scheduler = TileScheduler::new(
            &timeline,
            &SchedulerConfig { looping: false, ..SchedulerConfig::default() },
        );
        scheduler.tick(0.0);
        scheduler
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let judge = judge();
        assert_eq!(judge.classify(0.0), Grade::Perfect);
        assert_eq!(judge.classify(50.0), Grade::Perfect);
        assert_eq!(judge.classify(-50.0), Grade::Perfect);
        assert_eq!(judge.classify(51.0), Grade::Good);
        assert_eq!(judge.classify(150.0), Grade::Good);
        assert_eq!(judge.classify(-150.0), Grade::Good);
        assert_eq!(judge.classify(151.0), Grade::Miss);
    }

    #[test]
    fn matched_event_retires_token() {
        let judge = judge();
        let mut scheduler = scheduler_with(&[(1, 1000.0)]);
        let verdict = judge.judge(&NoteEvent::manual(key(1), 1010), &mut scheduler).unwrap();
        assert_eq!(verdict.grade, Grade::Perfect);
        assert_eq!(verdict.offset_ms, 10.0);
        assert!(scheduler.pending().is_empty());
        assert!(scheduler.tick(10_000.0).missed.is_empty());
    }

    #[test]
    fn early_event_is_negative_offset() {
        let judge = judge();
        let mut scheduler = scheduler_with(&[(1, 1000.0)]);
        let verdict = judge.judge(&NoteEvent::manual(key(1), 900), &mut scheduler).unwrap();
        assert_eq!(verdict.grade, Grade::Good);
        assert_eq!(verdict.offset_ms, -100.0);
    }

    #[test]
    fn far_match_is_a_miss_that_still_retires() {
        let judge = judge();
        let mut scheduler = scheduler_with(&[(1, 2000.0)]);
        let verdict = judge.judge(&NoteEvent::manual(key(1), 1000), &mut scheduler).unwrap();
        assert_eq!(verdict.grade, Grade::Miss);
        assert!(scheduler.pending().is_empty());
        assert!(scheduler.tick(10_000.0).missed.is_empty());
    }

    #[test]
    fn stray_hit_changes_nothing() {
        let judge = judge();
        let mut scheduler = scheduler_with(&[(1, 1000.0)]);
        assert!(judge.judge(&NoteEvent::manual(key(2), 1000), &mut scheduler).is_none());
        assert_eq!(scheduler.pending().len(), 1);
    }

    #[test]
    fn input_latency_is_compensated() {
        let judge = HitJudge::new(JudgeConfig { input_latency_ms: 80.0, ..JudgeConfig::default() });
        let mut scheduler = scheduler_with(&[(4, 1000.0)]);
        let verdict = judge.judge(&NoteEvent::manual(key(4), 1090), &mut scheduler).unwrap();
        assert_eq!(verdict.grade, Grade::Perfect);
        assert_eq!(verdict.offset_ms, 10.0);
    }

    #[test]
    fn expired_token_is_a_miss() {
        let judge = judge();
        let mut scheduler = scheduler_with(&[(1, 1000.0)]);
        let missed = scheduler.tick(1200.0).missed;
        let verdict = judge.expire(&missed[0], 1200.0);
        assert_eq!(verdict.grade, Grade::Miss);
        assert_eq!(verdict.offset_ms, 200.0);
    }
}
