//! # Tiles - Falling-tiles piano game in the terminal
//!
//! ## Architecture
//! - **Game Loop**: main thread, ticks the session every `tick_interval_ms`
//!   and prints the HUD
//! - **Audio Thread**: capture, windowing and pitch analysis
//! - **Input Thread**: reads key presses and commands from stdin
//! - **Communication**: crossbeam channels only

mod cli;
mod input;
mod ui;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use std::thread;
use std::time::{Duration, Instant};
use tiles_core::{
    CaptureError, EngineConfig, ExpectedNote, GameClock, GameSession, Key, SongTimeline,
};

use cli::{Cli, InputMode};
use input::Command;
use ui::hud::{Hud, Summary};
use worker::{AudioWorker, SimulatedSource, SourceFactory};

const DEMO_TITLE: &str = "C major scale";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let timeline = match &cli.song {
        Some(path) => SongTimeline::from_json_file(path)
            .with_context(|| format!("Failed to load song {}", path.display()))?,
        None => demo_song()?,
    };
    run(&cli, config, &timeline)
}

/// Config file (if any) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if cli.no_loop {
        config.scheduler.looping = false;
    }
    if let Some(lead) = cli.lead_time_ms {
        config.scheduler.lead_time_ms = lead;
    }
    if let Some(latency) = cli.latency_ms {
        config.judge.input_latency_ms = latency;
    }
    if let Some(tick) = cli.tick_ms {
        config.session.tick_interval_ms = tick;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Up and back down the white keys.
fn demo_song() -> Result<SongTimeline> {
    let keys = (1..=8).chain((1..8).rev());
    let notes = keys
        .enumerate()
        .filter_map(|(i, n)| {
            Key::new(n).map(|key| ExpectedNote {
                key,
                start_time_ms: 1000.0 + i as f64 * 750.0,
                duration_ms: 500.0,
                velocity: 96,
            })
        })
        .collect();
    Ok(SongTimeline::new(notes, 80.0, None)?)
}

fn source_factory(cli: &Cli, config: &EngineConfig, timeline: &SongTimeline) -> Option<SourceFactory> {
    let sample_rate = config.audio.sample_rate;
    match cli.input {
        InputMode::None => None,
        InputMode::Simulate => {
            let source = SimulatedSource::new(timeline, sample_rate, cli.simulate_offset_ms);
            Some(Box::new(move || Box::new(source)))
        }
        InputMode::Mic => Some(mic_factory(sample_rate)),
    }
}

#[cfg(feature = "capture")]
fn mic_factory(sample_rate: u32) -> SourceFactory {
    Box::new(move || Box::new(tiles_core::audio::CpalSource::new(sample_rate)))
}

#[cfg(not(feature = "capture"))]
fn mic_factory(_sample_rate: u32) -> SourceFactory {
    Box::new(|| Box::new(Unsupported))
}

/// Stands in for the microphone in builds without capture support.
#[cfg(not(feature = "capture"))]
struct Unsupported;

#[cfg(not(feature = "capture"))]
impl tiles_core::AudioSource for Unsupported {
    fn start(
        &mut self,
        _sink: crossbeam_channel::Sender<Vec<f32>>,
    ) -> Result<u32, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "built without microphone support (enable the `capture` feature)".into(),
        ))
    }

    fn stop(&mut self) {}
}

fn run(cli: &Cli, config: EngineConfig, timeline: &SongTimeline) -> Result<()> {
    let tick = Duration::from_millis(config.session.tick_interval_ms);
    let mut session = GameSession::new(config.clone(), timeline)?;
    let mut hud = Hud::stdout(cli.json);
    hud.banner(timeline.title().unwrap_or(DEMO_TITLE), timeline.len())?;

    let clock = GameClock::start();
    let (failures_tx, failures_rx) = crossbeam_channel::unbounded::<CaptureError>();
    let worker = source_factory(cli, &config, timeline).map(|factory| {
        AudioWorker::spawn(factory, session.analyzer(), config.audio.clone(), clock, failures_tx)
    });
    let commands = input::spawn_stdin_reader();
    let deadline = cli.duration.map(|secs| Duration::from_secs_f64(secs.max(0.0)));

    let started = Instant::now();
    let mut next_tick = started;
    'game: loop {
        for failure in worker::pending_failures(&failures_rx) {
            session.report_capture_failure(failure);
        }
        if !drain_commands(&commands, &mut session, clock) {
            break 'game;
        }

        let report = session.tick(clock.now_ms());
        hud.render(&report)?;
        if report.finished {
            log::info!("Song finished");
            break;
        }
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            log::info!("Time limit reached");
            break;
        }

        next_tick += tick;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // Running behind; don't try to catch up with a burst of ticks.
            next_tick = now;
        }
    }

    if let Some(worker) = worker {
        worker.shutdown();
    }
    let latency = session.latency_estimate();
    let score = session.stop();
    hud.summary(&Summary { score, latency })?;
    Ok(())
}

/// Applies queued stdin commands. Returns false on quit.
fn drain_commands(commands: &Receiver<Command>, session: &mut GameSession, clock: GameClock) -> bool {
    for command in commands.try_iter() {
        match command {
            Command::Press(key) => session.press_key(key, clock.now_ms()),
            Command::Restart => session.restart(clock.now_ms()),
            Command::Quit => return false,
        }
    }
    true
}
