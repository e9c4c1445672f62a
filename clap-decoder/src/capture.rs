/// Audio capture sources
///
/// A source pushes mono samples into the detector's rolling window through
/// an `AudioIngest` handle. `CpalSource` listens to a live microphone,
/// `WavSource` replays a recording through the same path.

use crate::audio_buffer::{AudioIngest, AudioSample};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Input device not found: {0}")]
    NotFound(String),

    #[error("Failed to open input stream: {0}")]
    Open(String),

    #[error("Failed to start input stream: {0}")]
    Start(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Sample rate mismatch: source delivers {actual} Hz, detector expects {expected} Hz")]
    SampleRateMismatch { actual: u32, expected: u32 },

    #[error("Failed to read WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("Capture thread error: {0}")]
    Thread(String),
}

/// Something that feeds audio into a detector
#[cfg_attr(test, mockall::automock)]
pub trait AudioSource {
    /// Start delivering samples to `sink`. Failures are fatal for the caller.
    fn start(&mut self, sink: AudioIngest) -> Result<(), DeviceError>;

    /// Stop delivering samples; returns once no more samples will arrive
    fn stop(&mut self);
}

/// Names of the available input devices
pub fn list_input_devices() -> Result<Vec<String>, DeviceError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::Open(e.to_string()))?
        .filter_map(|device| device.name().ok())
        .collect();

    Ok(devices)
}

/// Live microphone capture
///
/// `cpal::Stream` is not `Send`, so the stream lives on its own thread for
/// its whole life; `start` waits until that thread reports the stream is
/// playing (or why it is not).
pub struct CpalSource {
    device_name: Option<String>,
    sample_rate: u32,
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSource {
    /// Capture from the default input device
    pub fn new(sample_rate: u32) -> Self {
        Self {
            device_name: None,
            sample_rate,
            shutdown_tx: None,
            thread: None,
        }
    }

    /// Capture from the input device with this name
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

impl AudioSource for CpalSource {
    fn start(&mut self, sink: AudioIngest) -> Result<(), DeviceError> {
        if self.thread.is_some() {
            warn!("Capture already running");
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let sample_rate = self.sample_rate;

        let thread = thread::Builder::new()
            .name("clap-capture".to_string())
            .spawn(move || match open_stream(device_name.as_deref(), sample_rate, sink) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Blocks until stop() or the source is dropped
                    let _ = shutdown_rx.recv();
                    if let Err(e) = stream.pause() {
                        warn!("Failed to pause capture stream: {}", e);
                    }
                    drop(stream);
                    info!("Capture stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Thread(e.to_string()))?;

        let started = ready_rx
            .recv()
            .map_err(|_| DeviceError::Thread("capture thread exited during start-up".to_string()))?;

        match started {
            Ok(()) => {
                self.shutdown_tx = Some(shutdown_tx);
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    sink: AudioIngest,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| DeviceError::Open(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))?,
        None => host.default_input_device().ok_or(DeviceError::NoInputDevice)?,
    };

    info!("Using audio device: {:?}", device.name());

    let default_config = device
        .default_input_config()
        .map_err(|e| DeviceError::Open(e.to_string()))?;

    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    };

    info!(
        "Audio config: {}Hz, {} channels, {:?}",
        sample_rate,
        config.channels,
        default_config.sample_format()
    );

    let stream = match default_config.sample_format() {
        SampleFormat::F32 => build_stream::<f32, _>(&device, &config, sink, |s| s)?,
        SampleFormat::I16 => {
            build_stream::<i16, _>(&device, &config, sink, |s| s as f32 / i16::MAX as f32)?
        }
        SampleFormat::U16 => {
            build_stream::<u16, _>(&device, &config, sink, |s| (s as f32 - 32768.0) / 32768.0)?
        }
        other => return Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream
        .play()
        .map_err(|e| DeviceError::Start(e.to_string()))?;

    info!("Capture stream started");
    Ok(stream)
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    sink: AudioIngest,
    convert: F,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + Send + 'static,
    F: Fn(T) -> AudioSample + Send + 'static,
{
    let channels = (config.channels as usize).max(1);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Channel 0 only, converted on the fly
                sink.ingest_iter(data.iter().step_by(channels).map(|&s| convert(s)));
            },
            |err| warn!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Open(e.to_string()))
}

/// Default replay block: ~21ms at 48kHz, a typical device period
pub const DEFAULT_WAV_BLOCK: usize = 1024;

/// Replays a WAV file as if it were a microphone
///
/// The file is read completely in `start`, so a missing file or a rate
/// mismatch fails there like an unavailable device would.
pub struct WavSource {
    path: PathBuf,
    sample_rate: u32,
    block_size: usize,
    realtime: bool,
    finished: CancellationToken,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WavSource {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            block_size: DEFAULT_WAV_BLOCK,
            realtime: true,
            finished: CancellationToken::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Pace blocks at the file's sample rate (default) or push them as fast
    /// as possible
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Cancelled once the whole file has been delivered
    pub fn finished(&self) -> CancellationToken {
        self.finished.clone()
    }
}

impl AudioSource for WavSource {
    fn start(&mut self, sink: AudioIngest) -> Result<(), DeviceError> {
        if self.thread.is_some() {
            warn!("WAV replay already running");
            return Ok(());
        }

        let samples = read_wav_mono(&self.path, self.sample_rate)?;
        info!(
            "Replaying {} ({} samples, {:.2}s)",
            self.path.display(),
            samples.len(),
            samples.len() as f64 / self.sample_rate as f64
        );

        let block_size = self.block_size;
        let realtime = self.realtime;
        let sample_rate = self.sample_rate as f64;
        let finished = self.finished.clone();
        let stop_flag = Arc::clone(&self.stop_flag);
        stop_flag.store(false, Ordering::SeqCst);

        let thread = thread::Builder::new()
            .name("clap-wav-replay".to_string())
            .spawn(move || {
                for block in samples.chunks(block_size) {
                    if stop_flag.load(Ordering::SeqCst) {
                        debug!("WAV replay stopped early");
                        break;
                    }
                    sink.ingest(block);
                    if realtime {
                        thread::sleep(Duration::from_secs_f64(block.len() as f64 / sample_rate));
                    }
                }
                finished.cancel();
            })
            .map_err(|e| DeviceError::Thread(e.to_string()))?;

        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("WAV replay thread panicked");
            }
        }
    }
}

impl Drop for WavSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read a WAV file as normalised mono samples (first channel)
pub fn read_wav_mono(path: &Path, expected_rate: u32) -> Result<Vec<AudioSample>, DeviceError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate != expected_rate {
        return Err(DeviceError::SampleRateMismatch {
            actual: spec.sample_rate,
            expected: expected_rate,
        });
    }

    let channels = (spec.channels as usize).max(1);
    let interleaved: Vec<AudioSample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(interleaved.into_iter().step_by(channels).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_buffer::AudioBuffer;
    use approx::assert_relative_eq;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_read_wav_normalises_and_takes_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 8000, 2, &[16384, -1, -16384, -1, 0, -1]);

        let samples = read_wav_mono(&path, 8000).unwrap();

        assert_eq!(samples.len(), 3);
        assert_relative_eq!(samples[0], 0.5);
        assert_relative_eq!(samples[1], -0.5);
        assert_relative_eq!(samples[2], 0.0);
    }

    #[test]
    fn test_read_wav_rejects_rate_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.wav");
        write_wav(&path, 16000, 1, &[0; 16]);

        let result = read_wav_mono(&path, 48000);
        assert!(matches!(
            result,
            Err(DeviceError::SampleRateMismatch { actual: 16000, expected: 48000 })
        ));
    }

    #[test]
    fn test_missing_wav_fails_at_start() {
        let buffer = Arc::new(AudioBuffer::with_capacity(16));
        let mut source = WavSource::new("/nonexistent/claps.wav", 8000);

        let result = source.start(AudioIngest::new(buffer));
        assert!(matches!(result, Err(DeviceError::Wav(_))));
    }

    #[test]
    fn test_wav_replay_fills_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let samples: Vec<i16> = (0..100).map(|i| i * 100).collect();
        write_wav(&path, 8000, 1, &samples);

        let buffer = Arc::new(AudioBuffer::with_capacity(50));
        let mut source = WavSource::new(&path, 8000).with_block_size(16).realtime(false);
        let finished = source.finished();

        source.start(AudioIngest::new(Arc::clone(&buffer))).unwrap();
        while !finished.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
        source.stop();

        let window = buffer.snapshot();
        assert_relative_eq!(window[49], 9900.0 / 32768.0);
        assert_relative_eq!(window[0], 5000.0 / 32768.0);
    }
}
