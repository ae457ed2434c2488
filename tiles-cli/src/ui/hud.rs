//! Text HUD: verdict lines as they happen, the lane view at a fixed cadence,
//! or one JSON object per tick with `--json`.

use serde::Serialize;
use std::io::{self, Write};
use tiles_core::calibration::LatencyEstimate;
use tiles_core::{Grade, ScoreState, TickReport, Verdict};

use super::lanes;

/// Lane view refresh period in game milliseconds.
const STATUS_INTERVAL_MS: i64 = 250;

pub struct Hud<W: Write> {
    out: W,
    json: bool,
    last_status_ms: Option<i64>,
}

/// Printed once when the session ends.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub score: ScoreState,
    pub latency: Option<LatencyEstimate>,
}

fn grade_label(grade: Grade) -> &'static str {
    match grade {
        Grade::Perfect => "PERFECT",
        Grade::Good => "GOOD",
        Grade::Miss => "MISS",
    }
}

pub fn verdict_line(verdict: &Verdict, score: &ScoreState) -> String {
    format!(
        "{:<7} key {:<9} {:+6.0} ms   score {:>6}  combo {:>3}  accuracy {:>3}%",
        grade_label(verdict.grade),
        verdict.key.to_string(),
        verdict.offset_ms,
        score.score,
        score.combo,
        score.accuracy
    )
}

impl Hud<io::Stdout> {
    pub fn stdout(json: bool) -> Self {
        Self::new(io::stdout(), json)
    }
}

impl<W: Write> Hud<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json, last_status_ms: None }
    }

    pub fn render(&mut self, report: &TickReport) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.out, report)?;
            return writeln!(self.out);
        }

        if let Some(failure) = &report.capture_failure {
            writeln!(self.out, "!! audio unavailable: {} (type keys on stdin to play)", failure)?;
        }

        for (verdict, score) in report.verdicts.iter().zip(&report.scores) {
            writeln!(self.out, "{}", verdict_line(verdict, score))?;
        }

        let due = self
            .last_status_ms
            .is_none_or(|last| report.game_time_ms - last >= STATUS_INTERVAL_MS || report.game_time_ms < last);
        if due && !report.tiles.is_empty() {
            writeln!(self.out, "{:>7.2}s {}", report.game_time_ms as f64 / 1000.0, lanes::render(&report.tiles))?;
            self.last_status_ms = Some(report.game_time_ms);
        }
        self.out.flush()
    }

    pub fn banner(&mut self, title: &str, notes: usize) -> io::Result<()> {
        if self.json {
            return Ok(());
        }
        writeln!(self.out, "♪ {} ({} notes). Type key numbers or names, 'r' restarts, 'q' quits.", title, notes)?;
        writeln!(self.out, "{:>8} {}", "", lanes::header())
    }

    pub fn summary(&mut self, summary: &Summary) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.out, summary)?;
            return writeln!(self.out);
        }
        let s = &summary.score;
        writeln!(self.out)?;
        writeln!(self.out, "Score     {}", s.score)?;
        writeln!(self.out, "Max combo {}", s.max_combo)?;
        writeln!(self.out, "Perfect   {}", s.perfects)?;
        writeln!(self.out, "Good      {}", s.goods)?;
        writeln!(self.out, "Miss      {}", s.misses)?;
        writeln!(self.out, "Accuracy  {}%", s.accuracy)?;
        if let Some(latency) = &summary.latency {
            writeln!(
                self.out,
                "Notes land {:+.0} ms off the beat on average ({} hits); try --latency-ms {:.0}",
                latency.latency_ms, latency.samples, latency.latency_ms
            )?;
        }
        self.out.flush()
    }
}
