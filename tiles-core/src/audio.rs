//! # Audio Input Module
//!
//! Frames, the rolling sample buffer that cuts captured audio into analysis
//! windows, and the capture collaborator boundary.
//!
//! ## Features
//! - `AudioSource` trait for anything that produces samples
//! - Rolling buffer with configurable window and hop
//! - Synthetic tone source for simulation and tests
//! - Live microphone capture through CPAL (`cpal-capture` feature)

use crossbeam_channel::Sender;
use std::f32::consts::PI;

use crate::error::CaptureError;
use crate::timeline::SongTimeline;

/// Default number of samples per analysis frame.
///
/// 2048 samples is ~46ms at 44.1kHz, enough to resolve the lowest key (C4)
/// several periods over.
pub const BUFFER_SIZE: usize = 2048;

/// One analysis window of mono samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.samples.iter().map(|&s| s * s).sum::<f32>() / self.samples.len() as f32).sqrt()
    }
}

/// Rolling buffer that accumulates captured chunks and hands out
/// fixed-length windows.
///
/// After a window is taken the buffer advances by `hop` samples, so
/// consecutive windows overlap by `window - hop`.
#[derive(Debug)]
pub struct SampleBuffer {
    data: Vec<f32>,
    window: usize,
    hop: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// `hop` is clamped to `1..=window`.
    pub fn new(window: usize, hop: usize, sample_rate: u32) -> Self {
        let hop = hop.clamp(1, window.max(1));
        Self {
            data: Vec::with_capacity(window * 2),
            window,
            hop,
            sample_rate,
        }
    }

    /// Appends captured samples.
    pub fn push(&mut self, samples: &[f32]) {
        self.data.extend_from_slice(samples);
    }

    /// Takes the next analysis window if enough samples have accumulated.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.window == 0 || self.data.len() < self.window {
            return None;
        }
        let frame = AudioFrame::new(self.data[..self.window].to_vec(), self.sample_rate);
        self.data.drain(..self.hop);
        Some(frame)
    }

    /// Like [`Self::next_frame`], also returning the time of the frame's last
    /// sample given the time `newest_ms` of the newest buffered sample.
    ///
    /// Stamping frames this way keeps event times independent of how long
    /// analysis of earlier frames took.
    pub fn next_frame_timed(&mut self, newest_ms: i64) -> Option<(AudioFrame, i64)> {
        if self.window == 0 || self.data.len() < self.window || self.sample_rate == 0 {
            return None;
        }
        let behind = (self.data.len() - self.window) as i64;
        let end_ms = newest_ms - behind * 1000 / self.sample_rate as i64;
        self.next_frame().map(|frame| (frame, end_ms))
    }

    /// Samples waiting for the next window.
    pub fn buffered(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// The audio capture collaborator.
///
/// `start` begins delivering raw sample chunks to `sink` and returns the
/// sample rate in use. `stop` releases the device; it must be safe to call
/// more than once. A refused microphone is reported as
/// [`CaptureError::PermissionDenied`], never as silence.
pub trait AudioSource {
    fn start(&mut self, sink: Sender<Vec<f32>>) -> Result<u32, CaptureError>;
    fn stop(&mut self);
}

/// Stops the source when dropped, so the device is released on every exit
/// path of the capture loop.
pub struct CaptureGuard<'a, S: AudioSource + ?Sized> {
    source: &'a mut S,
    sample_rate: u32,
}

impl<'a, S: AudioSource + ?Sized> CaptureGuard<'a, S> {
    pub fn start(source: &'a mut S, sink: Sender<Vec<f32>>) -> Result<Self, CaptureError> {
        let sample_rate = source.start(sink)?;
        Ok(Self { source, sample_rate })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl<S: AudioSource + ?Sized> Drop for CaptureGuard<'_, S> {
    fn drop(&mut self) {
        self.source.stop();
    }
}

/// A sine voice of the tone source.
#[derive(Debug, Clone)]
struct Voice {
    frequency: f32,
    start_sample: u64,
    end_sample: u64,
    amplitude: f32,
}

/// Renders sine tones sample by sample.
///
/// Used by the simulation mode of the runner and by tests to push known
/// pitches through the whole pipeline.
#[derive(Debug, Clone)]
pub struct ToneSource {
    sample_rate: u32,
    voices: Vec<Voice>,
    position: u64,
}

impl ToneSource {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, voices: Vec::new(), position: 0 }
    }

    /// A single tone that never stops.
    pub fn constant(frequency: f32, amplitude: f32, sample_rate: u32) -> Self {
        let mut source = Self::new(sample_rate);
        source.voices.push(Voice {
            frequency,
            start_sample: 0,
            end_sample: u64::MAX,
            amplitude,
        });
        source
    }

    /// One tone per note of the timeline, sounding for the note's duration
    /// (at least `min_duration_ms`), shifted by `offset_ms`.
    pub fn from_timeline(
        timeline: &SongTimeline,
        sample_rate: u32,
        offset_ms: f64,
        min_duration_ms: f64,
    ) -> Self {
        let mut source = Self::new(sample_rate);
        for note in timeline.notes() {
            let start_ms = (note.start_time_ms + offset_ms).max(0.0);
            let end_ms = start_ms + note.duration_ms.max(min_duration_ms);
            source.add_tone(
                note.key.frequency(),
                start_ms,
                end_ms,
                0.2 + 0.6 * note.velocity as f32 / 127.0,
            );
        }
        source
    }

    /// Adds a tone between two points in time.
    pub fn add_tone(&mut self, frequency: f32, start_ms: f64, end_ms: f64, amplitude: f32) {
        let to_sample = |ms: f64| (ms.max(0.0) * self.sample_rate as f64 / 1000.0) as u64;
        self.voices.push(Voice {
            frequency,
            start_sample: to_sample(start_ms),
            end_sample: to_sample(end_ms),
            amplitude,
        });
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Milliseconds rendered so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.position as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Renders the next `count` samples.
    pub fn render(&mut self, count: usize) -> Vec<f32> {
        let rate = self.sample_rate as f32;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let n = self.position;
            let mut sample = 0.0;
            for voice in &self.voices {
                if n >= voice.start_sample && n < voice.end_sample {
                    let t = (n - voice.start_sample) as f32 / rate;
                    sample += voice.amplitude * (2.0 * PI * voice.frequency * t).sin();
                }
            }
            out.push(sample.clamp(-1.0, 1.0));
            self.position += 1;
        }
        out
    }

    /// Renders a frame of `len` samples.
    pub fn next_frame(&mut self, len: usize) -> AudioFrame {
        AudioFrame::new(self.render(len), self.sample_rate)
    }
}

#[cfg(feature = "cpal-capture")]
pub use live::CpalSource;

#[cfg(feature = "cpal-capture")]
mod live {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::SupportedStreamConfigRange;
    use crossbeam_channel::Sender;

    use super::AudioSource;
    use crate::error::CaptureError;

    /// Microphone capture from the default input device.
    ///
    /// Streams mono f32 chunks as the driver delivers them; windowing is left
    /// to [`super::SampleBuffer`] on the consumer side.
    pub struct CpalSource {
        target_rate: u32,
        stream: Option<cpal::Stream>,
    }

    impl CpalSource {
        pub fn new(target_rate: u32) -> Self {
            Self { target_rate, stream: None }
        }
    }

    impl AudioSource for CpalSource {
        fn start(&mut self, sink: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
            if self.stream.is_some() {
                return Err(CaptureError::AlreadyRunning);
            }

            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()))?;

            if let Ok(name) = device.name() {
                log::info!("Using audio input device: {}", name);
            }

            let configs = device
                .supported_input_configs()
                .map_err(|e| classify(e.to_string()))?
                .collect::<Vec<_>>();
            let supported_config = find_supported_config(configs, self.target_rate)
                .ok_or(CaptureError::UnsupportedFormat(self.target_rate))?;

            let rate = self
                .target_rate
                .clamp(supported_config.min_sample_rate().0, supported_config.max_sample_rate().0);
            let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
            let sample_rate = config.sample_rate().0;
            let config: cpal::StreamConfig = config.into();

            log::info!("Selected sample rate: {} Hz", sample_rate);

            let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        // Never block the driver; a closed consumer just drops audio.
                        let _ = sink.try_send(data.to_vec());
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| match e {
                    cpal::BuildStreamError::DeviceNotAvailable => {
                        CaptureError::DeviceUnavailable("device disconnected".into())
                    }
                    cpal::BuildStreamError::StreamConfigNotSupported => {
                        CaptureError::UnsupportedFormat(sample_rate)
                    }
                    other => classify(other.to_string()),
                })?;

            stream.play().map_err(|e| classify(e.to_string()))?;
            self.stream = Some(stream);

            Ok(sample_rate)
        }

        fn stop(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(e) = stream.pause() {
                    log::warn!("Error pausing stream: {}", e);
                }
                drop(stream);
                log::info!("Audio capture stopped");
            }
        }
    }

    impl Drop for CpalSource {
        fn drop(&mut self) {
            self.stop();
        }
    }

    /// Backends report refused access as free text.
    fn classify(message: String) -> CaptureError {
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
            CaptureError::PermissionDenied
        } else {
            CaptureError::Backend(message)
        }
    }

    /// Picks a mono f32 configuration whose rate range is closest to the target.
    fn find_supported_config(
        configs: Vec<SupportedStreamConfigRange>,
        target_rate: u32,
    ) -> Option<SupportedStreamConfigRange> {
        configs
            .into_iter()
            .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
            .min_by_key(|c| {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                let inside = c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
                if inside { 0 } else { min_diff.min(max_diff) }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_emits_overlapping_windows() {
        let mut buffer = SampleBuffer::new(4, 2, 8000);
        buffer.push(&[0.0, 1.0, 2.0]);
        assert!(buffer.next_frame().is_none());

        buffer.push(&[3.0, 4.0, 5.0]);
        let first = buffer.next_frame().unwrap();
        assert_eq!(first.samples, vec![0.0, 1.0, 2.0, 3.0]);
        let second = buffer.next_frame().unwrap();
        assert_eq!(second.samples, vec![2.0, 3.0, 4.0, 5.0]);
        assert!(buffer.next_frame().is_none());
        assert_eq!(buffer.buffered(), 2);
        assert_eq!(second.sample_rate, 8000);
    }

    #[test]
    fn timed_frames_are_stamped_at_their_last_sample() {
        let mut buffer = SampleBuffer::new(4, 2, 1000);
        buffer.push(&[0.0; 8]);
        // Newest sample at 100 ms; one sample per millisecond.
        let (_, first) = buffer.next_frame_timed(100).unwrap();
        let (_, second) = buffer.next_frame_timed(100).unwrap();
        let (_, third) = buffer.next_frame_timed(100).unwrap();
        assert_eq!((first, second, third), (96, 98, 100));
        assert!(buffer.next_frame_timed(100).is_none());
    }

    #[test]
    fn tone_source_respects_tone_bounds() {
        let mut source = ToneSource::new(1000);
        source.add_tone(100.0, 10.0, 20.0, 0.5);
        let samples = source.render(30);
        assert!(samples[..10].iter().all(|&s| s == 0.0));
        assert!(samples[10..20].iter().any(|&s| s != 0.0));
        assert!(samples[20..].iter().all(|&s| s == 0.0));
        assert_eq!(source.elapsed_ms(), 30.0);
    }

    #[test]
    fn constant_tone_has_expected_rms() {
        let mut source = ToneSource::constant(440.0, 1.0, 44_100);
        let frame = source.next_frame(44_100);
        assert!((frame.rms() - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-2);
    }

    struct FlakySource {
        stopped: usize,
    }

    impl AudioSource for FlakySource {
        fn start(&mut self, _sink: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
            Ok(48_000)
        }
        fn stop(&mut self) {
            self.stopped += 1;
        }
    }

    #[test]
    fn guard_releases_on_drop() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut source = FlakySource { stopped: 0 };
        {
            let guard = CaptureGuard::start(&mut source, tx).unwrap();
            assert_eq!(guard.sample_rate(), 48_000);
        }
        assert_eq!(source.stopped, 1);
    }
}
