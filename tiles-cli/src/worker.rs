//! # Audio Worker
//!
//! Dedicated thread that owns the capture source, cuts the raw stream into
//! analysis frames and runs the analyzer on each one. Note events reach the
//! game loop through the session's channel; capture failures through their
//! own channel.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tiles_core::config::AudioConfig;
use tiles_core::{
    Analyzer, AudioSource, CaptureError, CaptureGuard, GameClock, SampleBuffer, SongTimeline,
    ToneSource,
};

/// Builds the source inside the worker thread; some backends' streams may
/// not move between threads.
pub type SourceFactory = Box<dyn FnOnce() -> Box<dyn AudioSource> + Send>;

/// Audio worker thread management structure.
#[derive(Debug)]
pub struct AudioWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioWorker {
    /// Starts capture and analysis on a new thread.
    pub fn spawn(
        factory: SourceFactory,
        mut analyzer: Analyzer,
        audio: AudioConfig,
        clock: GameClock,
        failures: Sender<CaptureError>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let thread_handle = thread::spawn(move || {
            log::debug!("Audio thread starting");
            let (raw_audio_tx, raw_audio_rx) = crossbeam_channel::unbounded::<Vec<f32>>();

            let mut source = factory();
            let guard = match CaptureGuard::start(source.as_mut(), raw_audio_tx) {
                Ok(guard) => guard,
                Err(e) => {
                    log::error!("Fatal error starting audio: {}", e);
                    let _ = failures.send(e);
                    return;
                }
            };

            let mut buffer = SampleBuffer::new(audio.buffer_size, audio.hop_size, guard.sample_rate());
            log::info!("Audio capture running at {} Hz", guard.sample_rate());

            loop {
                crossbeam_channel::select! {
                    recv(raw_audio_rx) -> msg => match msg {
                        Ok(chunk) => {
                            let arrived_ms = clock.now_ms();
                            buffer.push(&chunk);
                            while let Some((frame, end_ms)) = buffer.next_frame_timed(arrived_ms) {
                                analyzer.process(&frame, end_ms);
                            }
                        }
                        Err(_) => {
                            let _ = failures.send(CaptureError::Backend("audio stream closed".into()));
                            break;
                        }
                    },
                    recv(shutdown_rx) -> _ => {
                        log::debug!("Audio thread received shutdown signal");
                        break;
                    },
                }
            }

            // Dropping the guard stops the source and releases the device.
            drop(guard);
            log::debug!("Audio thread finished");
        });

        Self { shutdown_tx, thread_handle: Some(thread_handle) }
    }

    /// Stops capture and waits for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Audio thread panicked");
            }
        }
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Real-time paced tone playback standing in for a microphone.
pub struct SimulatedSource {
    tone: Option<ToneSource>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Samples rendered per chunk (~10 ms at 44.1 kHz).
const CHUNK: usize = 441;

impl SimulatedSource {
    pub fn new(timeline: &SongTimeline, sample_rate: u32, offset_ms: f64) -> Self {
        Self::from_tone(ToneSource::from_timeline(timeline, sample_rate, offset_ms, 150.0))
    }

    pub fn from_tone(tone: ToneSource) -> Self {
        Self { tone: Some(tone), running: Arc::new(AtomicBool::new(false)), handle: None }
    }
}

impl AudioSource for SimulatedSource {
    fn start(&mut self, sink: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
        let mut tone = self.tone.take().ok_or(CaptureError::AlreadyRunning)?;
        let sample_rate = tone.sample_rate();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        self.handle = Some(thread::spawn(move || {
            let started = Instant::now();
            while running.load(Ordering::SeqCst) {
                let due_ms = started.elapsed().as_secs_f64() * 1000.0;
                while tone.elapsed_ms() < due_ms {
                    if sink.send(tone.render(CHUNK)).is_err() {
                        return;
                    }
                }
                thread::sleep(Duration::from_millis(5));
            }
        }));
        Ok(sample_rate)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Drains every failure reported so far.
pub fn pending_failures(failures: &Receiver<CaptureError>) -> Vec<CaptureError> {
    failures.try_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiles_core::EngineConfig;
    use tiles_core::{ExpectedNote, GameSession, Key};

    struct DeniedSource;

    impl AudioSource for DeniedSource {
        fn start(&mut self, _sink: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
            Err(CaptureError::PermissionDenied)
        }
        fn stop(&mut self) {}
    }

    fn one_note_session() -> GameSession {
        let note = ExpectedNote {
            key: Key::new(6).unwrap(),
            start_time_ms: 100.0,
            duration_ms: 400.0,
            velocity: 100,
        };
        let timeline = SongTimeline::new(vec![note], 120.0, None).unwrap();
        GameSession::new(EngineConfig::default(), &timeline).unwrap()
    }

    #[test]
    fn permission_denial_is_reported() {
        let game = one_note_session();
        let (failures_tx, failures_rx) = crossbeam_channel::unbounded();
        let worker = AudioWorker::spawn(
            Box::new(|| Box::new(DeniedSource)),
            game.analyzer(),
            AudioConfig::default(),
            GameClock::start(),
            failures_tx,
        );
        let failure = failures_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(failure, CaptureError::PermissionDenied);
        worker.shutdown();
    }

    #[test]
    fn simulated_tone_produces_note_events() {
        let mut game = one_note_session();
        let (failures_tx, _failures_rx) = crossbeam_channel::unbounded();
        let mut tone = ToneSource::new(44_100);
        tone.add_tone(440.0, 0.0, 400.0, 0.6);

        let worker = AudioWorker::spawn(
            Box::new(move || Box::new(SimulatedSource::from_tone(tone))),
            game.analyzer(),
            AudioConfig::default(),
            GameClock::start(),
            failures_tx,
        );
        thread::sleep(Duration::from_millis(300));
        worker.shutdown();

        let report = game.tick(200);
        assert_eq!(report.verdicts.len(), 1);
        assert!(report.verdicts[0].grade.is_hit());
    }
}
