//! # Game Session Module
//!
//! Wires the pipeline together for one play session.
//!
//! ## Architecture
//! - **Analyzer**: pitch detector, quantizer and event stream. Lives on the
//!   audio thread and pushes note events into a channel.
//! - **GameSession**: owns the scheduler, the judge and the score. Driven by
//!   `tick` on the game loop; each tick drains the channel, so every event is
//!   judged exactly once and never races a scheduler update.
//! - **Communication**: a crossbeam channel is the only shared state.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::time::Instant;

use crate::audio::AudioFrame;
use crate::calibration::{LatencyCalibrator, LatencyEstimate};
use crate::config::EngineConfig;
use crate::error::{CaptureError, EngineError};
use crate::events::{NoteEvent, NoteEventStream};
use crate::judge::{HitJudge, Verdict};
use crate::pitch::{PitchDetector, PitchEstimate};
use crate::quantizer::{NoteQuantizer, Quantized};
use crate::scheduler::{ScheduledToken, TileScheduler};
use crate::score::{ScoreEngine, ScoreState};
use crate::timeline::SongTimeline;
use crate::tuning::Key;

/// Monotonic game clock in whole milliseconds. Copies share the origin, so
/// the audio thread and the game loop agree on timestamps.
#[derive(Debug, Clone, Copy)]
pub struct GameClock {
    origin: Instant,
}

impl GameClock {
    pub fn start() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

/// Everything one analysis cycle produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAnalysis {
    pub estimate: PitchEstimate,
    pub quantized: Option<Quantized>,
    pub event: Option<NoteEvent>,
}

/// Audio-side half of the pipeline.
#[derive(Debug)]
pub struct Analyzer {
    detector: PitchDetector,
    quantizer: NoteQuantizer,
    stream: NoteEventStream,
    sender: Sender<NoteEvent>,
}

impl Analyzer {
    pub fn new(config: &EngineConfig, sender: Sender<NoteEvent>) -> Self {
        Self {
            detector: PitchDetector::with_frame_len(config.pitch.clone(), config.audio.buffer_size),
            quantizer: NoteQuantizer::new(config.quantizer.clone()),
            stream: NoteEventStream::new(&config.events),
            sender,
        }
    }

    /// Runs one frame through detection, quantization and debouncing, and
    /// queues the resulting event for the next tick.
    pub fn process(&mut self, frame: &AudioFrame, now_ms: i64) -> FrameAnalysis {
        let estimate = self.detector.estimate(frame);
        let quantized = self.quantizer.quantize_detailed(&estimate);
        let event = self.stream.feed_estimate(quantized.map(|q| q.key), &estimate, now_ms);

        if let Some(event) = event {
            log::debug!(
                "Note on: key {} at {} ms ({:.1} Hz, {:+.0} cents, confidence {:.2})",
                event.key,
                event.detected_at_ms,
                event.frequency,
                quantized.map_or(0.0, |q| q.cents),
                event.confidence
            );
            if self.sender.send(event).is_err() {
                log::warn!("Session closed; dropping note event");
            }
        }

        FrameAnalysis { estimate, quantized, event }
    }

    /// Forgets the debounce state.
    pub fn reset(&mut self) {
        self.stream.reset();
    }
}

/// A pending tile with its fall position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileView {
    pub token: ScheduledToken,
    /// 0 at spawn, 1 at the due time.
    pub progress: f64,
}

/// What the presentation side needs after each tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub game_time_ms: i64,
    pub tiles: Vec<TileView>,
    /// Verdicts resolved during this tick, in resolution order.
    pub verdicts: Vec<Verdict>,
    /// Score right after each verdict, parallel to `verdicts`.
    pub scores: Vec<ScoreState>,
    /// Most recent verdict of the session.
    pub latest_verdict: Option<Verdict>,
    pub score: ScoreState,
    /// Reported on the first tick after capture failed, then cleared.
    #[serde(serialize_with = "serialize_failure")]
    pub capture_failure: Option<CaptureError>,
    pub finished: bool,
}

fn serialize_failure<S: serde::Serializer>(
    failure: &Option<CaptureError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// One play-through of a song.
#[derive(Debug)]
pub struct GameSession {
    config: EngineConfig,
    scheduler: TileScheduler,
    judge: HitJudge,
    score: ScoreEngine,
    calibrator: LatencyCalibrator,
    events_tx: Sender<NoteEvent>,
    events_rx: Receiver<NoteEvent>,
    latest_verdict: Option<Verdict>,
    capture_failure: Option<CaptureError>,
    audio_available: bool,
    /// Clock reading the current run started at.
    epoch_ms: i64,
}

impl GameSession {
    /// Validates the config and prepares a session; nothing is spawned until
    /// the first tick.
    pub fn new(config: EngineConfig, timeline: &SongTimeline) -> Result<Self, EngineError> {
        config.validate()?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        log::info!(
            "Session ready: {} notes, {:.0} ms per pass, lead {} ms",
            timeline.len(),
            timeline.total_duration_ms(),
            config.scheduler.lead_time_ms
        );
        Ok(Self {
            scheduler: TileScheduler::new(timeline, &config.scheduler),
            judge: HitJudge::new(config.judge.clone()),
            score: ScoreEngine::new(),
            calibrator: LatencyCalibrator::new(config.session.calibration_window),
            events_tx,
            events_rx,
            latest_verdict: None,
            capture_failure: None,
            audio_available: true,
            epoch_ms: 0,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Producer handle for note events (audio thread, manual input).
    pub fn event_sender(&self) -> Sender<NoteEvent> {
        self.events_tx.clone()
    }

    /// An analyzer feeding this session.
    pub fn analyzer(&self) -> Analyzer {
        Analyzer::new(&self.config, self.event_sender())
    }

    /// Queues a key press from a non-audio input path. Not debounced.
    pub fn press_key(&self, key: Key, now_ms: i64) {
        // The receiver lives in `self`, so this send cannot fail.
        let _ = self.events_tx.send(NoteEvent::manual(key, now_ms));
    }

    /// Records that live capture ended. Reported once through the next tick.
    pub fn report_capture_failure(&mut self, err: CaptureError) {
        log::warn!("Audio capture failed: {}. Continuing without audio.", err);
        self.audio_available = false;
        self.capture_failure = Some(err);
    }

    pub fn audio_available(&self) -> bool {
        self.audio_available
    }

    /// Advances the session to clock reading `clock_ms`.
    ///
    /// Game time is measured from the last restart, and so are the event
    /// timestamps before they are judged.
    ///
    /// Order within a tick: spawn due tiles, judge queued events in detection
    /// order, then time out overdue tiles. Judging before timing out means an
    /// event detected inside the window still counts even if the tick that
    /// carries it arrives after the window closed, as long as it was queued
    /// before that tick. An event queued after the tick that timed its token
    /// out is a stray; producers keep that gap to one analysis cycle by
    /// stamping events with the capture time of their frame.
    pub fn tick(&mut self, clock_ms: i64) -> TickReport {
        let game_time_ms = clock_ms - self.epoch_ms;
        let now = game_time_ms as f64;
        self.scheduler.spawn_due(now);

        // Events detected before the last restart may still arrive after it;
        // they belong to the previous run.
        let epoch_ms = self.epoch_ms;
        let mut events: Vec<NoteEvent> = self
            .events_rx
            .try_iter()
            .filter(|e| e.detected_at_ms >= epoch_ms)
            .map(|e| NoteEvent { detected_at_ms: e.detected_at_ms - epoch_ms, ..e })
            .collect();
        events.sort_by_key(|e| e.detected_at_ms);

        let mut verdicts = Vec::new();
        for event in &events {
            if let Some(verdict) = self.judge.judge(event, &mut self.scheduler) {
                verdicts.push(verdict);
            }
        }
        for token in self.scheduler.expire_overdue(now) {
            log::debug!("Missed key {} due at {} ms", token.key, token.start_time_ms);
            verdicts.push(self.judge.expire(&token, now));
        }

        let mut scores = Vec::with_capacity(verdicts.len());
        for verdict in &verdicts {
            scores.push(self.score.apply(verdict));
            self.calibrator.record(verdict);
            self.latest_verdict = Some(*verdict);
        }

        let lead = self.scheduler.lead_time_ms();
        let tiles = self
            .scheduler
            .pending()
            .iter()
            .map(|token| TileView { progress: token.progress(now, lead), token: token.clone() })
            .collect();

        TickReport {
            game_time_ms,
            tiles,
            verdicts,
            scores,
            latest_verdict: self.latest_verdict,
            score: *self.score.state(),
            capture_failure: self.capture_failure.take(),
            finished: self.scheduler.is_finished(),
        }
    }

    pub fn score(&self) -> &ScoreState {
        self.score.state()
    }

    pub fn scheduler(&self) -> &TileScheduler {
        &self.scheduler
    }

    /// Current latency suggestion: configured compensation plus what the
    /// recent hits still show.
    pub fn latency_estimate(&self) -> Option<LatencyEstimate> {
        self.calibrator.estimate().map(|estimate| LatencyEstimate {
            latency_ms: estimate.latency_ms + self.config.judge.input_latency_ms,
            ..estimate
        })
    }

    /// Starts the song over with a fresh score from clock reading
    /// `clock_ms`. Queued events are discarded.
    pub fn restart(&mut self, clock_ms: i64) {
        self.epoch_ms = clock_ms;
        self.scheduler.reset();
        self.score.reset();
        self.calibrator.clear();
        self.latest_verdict = None;
        let dropped = self.events_rx.try_iter().count();
        log::info!("Session restarted ({} queued events dropped)", dropped);
    }

    /// Ends the session: pending tiles and queued events are dropped.
    pub fn stop(&mut self) -> ScoreState {
        self.scheduler.clear();
        let _ = self.events_rx.try_iter().count();
        let state = *self.score.state();
        log::info!(
            "Session stopped: score {}, max combo {}, accuracy {}%",
            state.score, state.max_combo, state.accuracy
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::judge::Grade;
    use crate::timeline::ExpectedNote;

    fn key(n: u8) -> Key {
        Key::new(n).unwrap()
    }

    fn session(notes: &[(u8, f64)]) -> GameSession {
        let notes = notes
            .iter()
            .map(|&(k, start)| ExpectedNote {
                key: key(k),
                start_time_ms: start,
                duration_ms: 300.0,
                velocity: 100,
            })
            .collect();
        let timeline = SongTimeline::new(notes, 120.0, None).unwrap();
        let config = EngineConfig {
            scheduler: SchedulerConfig { looping: false, ..SchedulerConfig::default() },
            ..EngineConfig::default()
        };
        GameSession::new(config, &timeline).unwrap()
    }

    #[test]
    fn queued_event_is_judged_on_next_tick() {
        let mut game = session(&[(1, 1000.0)]);
        let report = game.tick(0);
        assert_eq!(report.tiles.len(), 1);
        assert!((report.tiles[0].progress - 2.0 / 3.0).abs() < 1e-9);

        game.press_key(key(1), 1010);
        let report = game.tick(1050);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.latest_verdict.unwrap().grade, Grade::Perfect);
        assert_eq!(report.score.score, 100);
        assert_eq!(report.scores, vec![report.score]);
        assert!(report.tiles.is_empty());
        assert!(report.finished);
    }

    #[test]
    fn late_tick_still_credits_event_detected_in_window() {
        let mut game = session(&[(1, 1000.0)]);
        game.tick(0);
        game.press_key(key(1), 1100);
        let report = game.tick(1400);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].grade, Grade::Good);
        assert_eq!(report.score.misses, 0);
    }

    #[test]
    fn unplayed_tile_counts_as_miss() {
        let mut game = session(&[(2, 500.0)]);
        game.tick(0);
        let report = game.tick(700);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.score.misses, 1);
        assert_eq!(report.score.accuracy, 0.0);
    }

    #[test]
    fn stray_presses_do_not_score() {
        let mut game = session(&[(1, 1000.0)]);
        game.tick(0);
        game.press_key(key(7), 1000);
        let report = game.tick(1000);
        assert!(report.verdicts.is_empty());
        assert_eq!(report.score, ScoreState::default());
    }

    #[test]
    fn capture_failure_is_reported_once() {
        let mut game = session(&[(1, 1000.0)]);
        game.report_capture_failure(CaptureError::PermissionDenied);
        assert_eq!(game.tick(0).capture_failure, Some(CaptureError::PermissionDenied));
        assert_eq!(game.tick(10).capture_failure, None);
        assert!(!game.audio_available());
    }

    #[test]
    fn restart_resets_score_and_tiles() {
        let mut game = session(&[(1, 1000.0)]);
        game.tick(0);
        game.press_key(key(1), 1000);
        game.tick(1000);
        game.press_key(key(1), 1001);
        game.restart(5000);
        assert_eq!(*game.score(), ScoreState::default());
        assert!(game.scheduler().pending().is_empty());
        let report = game.tick(5000);
        assert_eq!(report.game_time_ms, 0);
        assert_eq!(report.tiles.len(), 1);
        assert!(report.verdicts.is_empty());

        // Events are measured from the restart too.
        game.press_key(key(1), 6010);
        let report = game.tick(6050);
        assert_eq!(report.verdicts[0].offset_ms, 10.0);
    }

    #[test]
    fn events_from_before_a_restart_are_dropped() {
        let mut game = session(&[(1, 1000.0)]);
        game.tick(0);
        game.restart(5000);
        // Detected before the restart, delivered after its drain.
        game.event_sender().send(NoteEvent::manual(key(1), 4990)).unwrap();
        let report = game.tick(5000);
        assert!(report.verdicts.is_empty());
        assert_eq!(report.score, ScoreState::default());
        assert_eq!(report.tiles.len(), 1);
    }

    #[test]
    fn stop_clears_pending_tiles() {
        let mut game = session(&[(1, 1000.0), (2, 2000.0)]);
        game.tick(0);
        assert_eq!(game.scheduler().pending().len(), 2);
        game.stop();
        assert!(game.scheduler().pending().is_empty());
    }

    #[test]
    fn analyzer_feeds_the_session() {
        let mut game = session(&[(6, 1000.0)]);
        let mut analyzer = game.analyzer();
        game.tick(0);

        let mut tone = crate::audio::ToneSource::constant(440.0, 0.5, 44_100);
        let analysis = analyzer.process(&tone.next_frame(2048), 1020);
        assert_eq!(analysis.quantized.map(|q| q.key), Some(key(6)));
        assert!(analysis.event.is_some());

        let report = game.tick(1050);
        assert_eq!(report.verdicts[0].grade, Grade::Perfect);
    }
}
