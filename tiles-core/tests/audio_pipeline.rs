//! Integration tests that push synthetic audio through the whole pipeline:
//! samples -> rolling buffer -> YIN -> quantizer -> debounce -> judge -> score.

use tiles_core::config::{DifferenceMethod, SchedulerConfig};
use tiles_core::{
    Analyzer, EngineConfig, ExpectedNote, GameSession, Key, NoteQuantizer, PitchDetector,
    SampleBuffer, ScoreState, SongTimeline, ToneSource,
};

const SAMPLE_RATE: u32 = 44_100;
const TICK_MS: i64 = 50;

fn song() -> SongTimeline {
    // C4, E4, G4, C5, E4: distinct neighbours so no debounce interplay.
    let notes = [(1, 1000.0), (3, 1600.0), (5, 2200.0), (8, 2800.0), (3, 3400.0)]
        .iter()
        .map(|&(k, start_time_ms)| ExpectedNote {
            key: Key::new(k).unwrap(),
            start_time_ms,
            duration_ms: 400.0,
            velocity: 100,
        })
        .collect();
    SongTimeline::new(notes, 100.0, Some(4000.0)).unwrap()
}

/// Plays the song into the session on a virtual clock and returns the final score.
fn play(config: EngineConfig, until_ms: i64) -> (ScoreState, GameSession) {
    let timeline = song();
    let mut game = GameSession::new(config.clone(), &timeline).unwrap();
    let mut analyzer: Analyzer = game.analyzer();
    let mut tone = ToneSource::from_timeline(&timeline, SAMPLE_RATE, 0.0, 0.0);
    let mut buffer = SampleBuffer::new(config.audio.buffer_size, config.audio.hop_size, SAMPLE_RATE);

    let samples_per_tick = (SAMPLE_RATE as i64 * TICK_MS / 1000) as usize;
    let mut frames_taken: u64 = 0;
    let mut last = *game.score();

    let mut now = 0;
    while now <= until_ms {
        buffer.push(&tone.render(samples_per_tick));
        while let Some(frame) = buffer.next_frame() {
            // Timestamp each frame at its last sample.
            let end_sample = config.audio.buffer_size as u64 + frames_taken * config.audio.hop_size as u64;
            frames_taken += 1;
            let frame_ms = (end_sample * 1000 / SAMPLE_RATE as u64) as i64;
            analyzer.process(&frame, frame_ms);
        }
        last = game.tick(now).score;
        now += TICK_MS;
    }
    (last, game)
}

#[test]
fn sine_tones_are_detected_within_two_percent() {
    let detector = PitchDetector::new(Default::default());
    let quantizer = NoteQuantizer::new(Default::default());
    for key in Key::all() {
        let mut tone = ToneSource::constant(key.frequency(), 0.4, SAMPLE_RATE);
        let estimate = detector.estimate(&tone.next_frame(2048));
        let error = (estimate.frequency_hz - key.frequency()).abs() / key.frequency();
        assert!(error < 0.02, "{} detected at {} Hz", key, estimate.frequency_hz);
        assert_eq!(quantizer.quantize(&estimate), Some(key));
    }
}

#[test]
fn played_song_scores_every_note() {
    let mut config = EngineConfig::default();
    config.scheduler = SchedulerConfig { looping: false, ..SchedulerConfig::default() };
    let (state, game) = play(config, 4000);

    assert_eq!(state.hits, 5, "final state: {state:?}");
    assert_eq!(state.misses, 0);
    assert_eq!(state.max_combo, 5);
    assert_eq!(state.accuracy, 100.0);
    assert!(game.scheduler().is_finished());

    // Buffering makes every detection a little late, never early.
    let latency = game.latency_estimate().expect("enough hits to estimate");
    assert!(latency.latency_ms > 0.0 && latency.latency_ms < 150.0);
}

#[test]
fn fft_difference_gives_same_outcome() {
    let mut config = EngineConfig::default();
    config.scheduler = SchedulerConfig { looping: false, ..SchedulerConfig::default() };
    config.pitch.method = DifferenceMethod::Fft;
    let (state, _) = play(config, 4000);
    assert_eq!(state.hits, 5);
    assert_eq!(state.misses, 0);
}

#[test]
fn silence_misses_every_note() {
    let timeline = song();
    let mut config = EngineConfig::default();
    config.scheduler.looping = false;
    let mut game = GameSession::new(config, &timeline).unwrap();
    let mut analyzer = game.analyzer();
    let silent = tiles_core::AudioFrame::new(vec![0.0; 2048], SAMPLE_RATE);

    let mut state = *game.score();
    for now in (0..=4000).step_by(TICK_MS as usize) {
        assert!(analyzer.process(&silent, now).event.is_none());
        state = game.tick(now).score;
    }
    assert_eq!(state.misses, 5);
    assert_eq!(state.hits, 0);
    assert_eq!(state.accuracy, 0.0);
}
