//! # Score Module
//!
//! Score, combo and accuracy for one session, advanced only by verdicts.
//!
//! Points per verdict are `floor(base × min(2.0, 1 + 0.1 × combo_before))`,
//! with base 100 for Perfect, 50 for Good and 0 for Miss. The multiplier is
//! kept in tenths so the floor is exact.

use serde::Serialize;

use crate::judge::{Grade, Verdict};

/// Multiplier cap, in tenths.
const MAX_FACTOR_TENTHS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreState {
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub hits: u32,
    pub misses: u32,
    pub perfects: u32,
    pub goods: u32,
    /// `round(100 × hits / (hits + misses))`, 100 before anything resolves.
    pub accuracy: f64,
}

impl Default for ScoreState {
    fn default() -> Self {
        Self {
            score: 0,
            combo: 0,
            max_combo: 0,
            hits: 0,
            misses: 0,
            perfects: 0,
            goods: 0,
            accuracy: 100.0,
        }
    }
}

impl ScoreState {
    /// The state after applying `verdict`. Does not modify `self`.
    pub fn next(&self, verdict: &Verdict) -> ScoreState {
        let mut next = *self;
        next.score += points(verdict.grade, self.combo);
        match verdict.grade {
            Grade::Perfect | Grade::Good => {
                next.combo += 1;
                next.hits += 1;
                next.max_combo = next.max_combo.max(next.combo);
                if verdict.grade == Grade::Perfect {
                    next.perfects += 1;
                } else {
                    next.goods += 1;
                }
            }
            Grade::Miss => {
                next.combo = 0;
                next.misses += 1;
            }
        }
        next.accuracy = accuracy(next.hits, next.misses);
        next
    }

    /// Tokens resolved so far.
    pub fn resolved(&self) -> u32 {
        self.hits + self.misses
    }
}

/// Points for a grade given the combo before it.
pub fn points(grade: Grade, combo_before: u32) -> u64 {
    let factor_tenths = (10 + combo_before as u64).min(MAX_FACTOR_TENTHS);
    grade.base_points() * factor_tenths / 10
}

/// Rounded hit percentage; 100 when nothing has resolved yet.
pub fn accuracy(hits: u32, misses: u32) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 100.0;
    }
    (100.0 * hits as f64 / total as f64).round()
}

/// Owner of the session's [`ScoreState`].
#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    state: ScoreState,
}

impl ScoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ScoreState {
        &self.state
    }

    /// Applies a verdict and returns the new state.
    pub fn apply(&mut self, verdict: &Verdict) -> ScoreState {
        self.state = self.state.next(verdict);
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ScoreState::default();
    }
}
