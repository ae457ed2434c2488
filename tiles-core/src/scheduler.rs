//! # Tile Scheduler Module
//!
//! Spawns a token for every expected note `lead_time_ms` before it is due,
//! keeps it pending while it can still be played, and flags it missed once
//! the game clock passes `start + miss_tolerance_ms`.
//!
//! Per note: `Unspawned -> Pending -> {Hit, Missed}`. The hit transition is
//! driven by [`crate::judge::HitJudge`] through [`TileScheduler::take_candidate`];
//! a token taken that way is gone from the pending set and can never be
//! flagged missed afterwards.
//!
//! When looping is enabled the song restarts after `total_duration_ms`:
//! pass `p` schedules every note at `start + p * total_duration_ms`.

use serde::Serialize;

use crate::config::SchedulerConfig;
use crate::timeline::{ExpectedNote, SongTimeline};
use crate::tuning::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenState {
    Pending,
    Hit,
    Missed,
}

/// A live instance of an expected note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledToken {
    pub id: u64,
    pub key: Key,
    /// Due time on the game clock, including the loop offset.
    pub start_time_ms: f64,
    pub duration_ms: f64,
    pub velocity: u8,
    /// Zero-based pass through the song this token belongs to.
    pub pass: u32,
    /// Game time at which the token became pending.
    pub spawn_time_ms: f64,
    pub state: TokenState,
}

impl ScheduledToken {
    /// Fall progress in `[0, 1]`: 0 when spawned, 1 at the due time, past 1
    /// while late.
    pub fn progress(&self, game_time_ms: f64, lead_time_ms: f64) -> f64 {
        (game_time_ms - (self.start_time_ms - lead_time_ms)) / lead_time_ms
    }
}

/// Tokens spawned and missed by one [`TileScheduler::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub spawned: Vec<ScheduledToken>,
    pub missed: Vec<ScheduledToken>,
}

#[derive(Debug, Clone)]
pub struct TileScheduler {
    notes: Vec<ExpectedNote>,
    loop_length_ms: f64,
    lead_time_ms: f64,
    miss_tolerance_ms: f64,
    looping: bool,
    /// Next note to spawn.
    cursor: usize,
    pass: u32,
    /// Ordered by start time.
    pending: Vec<ScheduledToken>,
    next_id: u64,
}

impl TileScheduler {
    pub fn new(timeline: &SongTimeline, config: &SchedulerConfig) -> Self {
        let loop_length_ms = timeline.total_duration_ms();
        let looping = config.looping && !timeline.is_empty() && loop_length_ms > 0.0;
        if config.looping && !looping {
            log::warn!("Looping disabled: song has no notes or zero length");
        }
        Self {
            notes: timeline.notes().to_vec(),
            loop_length_ms,
            lead_time_ms: config.lead_time_ms,
            miss_tolerance_ms: config.miss_tolerance_ms,
            looping,
            cursor: 0,
            pass: 0,
            pending: Vec::new(),
            next_id: 0,
        }
    }

    pub fn lead_time_ms(&self) -> f64 {
        self.lead_time_ms
    }

    pub fn miss_tolerance_ms(&self) -> f64 {
        self.miss_tolerance_ms
    }

    /// Current pass through the song (0 on the first play).
    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Tokens awaiting input, ordered by due time.
    pub fn pending(&self) -> &[ScheduledToken] {
        &self.pending
    }

    /// Spawns everything due and retires everything overdue.
    pub fn tick(&mut self, game_time_ms: f64) -> TickOutcome {
        let spawned = self.spawn_due(game_time_ms);
        let missed = self.expire_overdue(game_time_ms);
        TickOutcome { spawned, missed }
    }

    /// Spawns every note whose spawn time (`start − lead`) has been reached.
    pub fn spawn_due(&mut self, game_time_ms: f64) -> Vec<ScheduledToken> {
        let mut spawned = Vec::new();
        loop {
            if self.cursor == self.notes.len() {
                if !self.looping {
                    break;
                }
                self.cursor = 0;
                self.pass += 1;
                log::debug!("Song loop: starting pass {}", self.pass);
            }

            let note = self.notes[self.cursor];
            let start_time_ms = note.start_time_ms + self.pass as f64 * self.loop_length_ms;
            let spawn_time_ms = start_time_ms - self.lead_time_ms;
            if game_time_ms < spawn_time_ms {
                break;
            }

            let token = ScheduledToken {
                id: self.next_id,
                key: note.key,
                start_time_ms,
                duration_ms: note.duration_ms,
                velocity: note.velocity,
                pass: self.pass,
                spawn_time_ms,
                state: TokenState::Pending,
            };
            self.next_id += 1;
            self.cursor += 1;
            self.pending.push(token.clone());
            spawned.push(token);
        }
        spawned
    }

    /// Removes pending tokens whose window has closed
    /// (`game_time > start + miss_tolerance`) and returns them as missed.
    pub fn expire_overdue(&mut self, game_time_ms: f64) -> Vec<ScheduledToken> {
        let tolerance = self.miss_tolerance_ms;
        let mut missed = Vec::new();
        self.pending.retain(|token| {
            if game_time_ms > token.start_time_ms + tolerance {
                missed.push(ScheduledToken { state: TokenState::Missed, ..token.clone() });
                false
            } else {
                true
            }
        });
        missed
    }

    /// The pending token for `key` whose due time is closest to
    /// `game_time_ms`, ties going to the earlier token. Tokens that had not
    /// yet spawned at `game_time_ms` are not candidates.
    pub fn find_candidate(&self, key: Key, game_time_ms: f64) -> Option<&ScheduledToken> {
        self.candidate_index(key, game_time_ms).map(|i| &self.pending[i])
    }

    /// Like [`Self::find_candidate`], but removes the token from the pending
    /// set so it is matched exactly once.
    pub fn take_candidate(&mut self, key: Key, game_time_ms: f64) -> Option<ScheduledToken> {
        let index = self.candidate_index(key, game_time_ms)?;
        Some(self.pending.remove(index))
    }

    /// True once a non-looping song has spawned and resolved every note.
    pub fn is_finished(&self) -> bool {
        !self.looping && self.cursor == self.notes.len() && self.pending.is_empty()
    }

    /// Drops all pending tokens without resolving them.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Back to the start of the song with nothing spawned.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.cursor = 0;
        self.pass = 0;
    }

    fn candidate_index(&self, key: Key, game_time_ms: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, token) in self.pending.iter().enumerate() {
            if token.key != key || token.spawn_time_ms > game_time_ms {
                continue;
            }
            let distance = (token.start_time_ms - game_time_ms).abs();
            // Pending is ordered by start, so strict `<` keeps the earlier token on ties.
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((i, distance)),
            }
        }
        best.map(|(i, _)| i)
    }
}
