/// Clap detector main module
///
/// Ties the rolling audio window, signal conditioning, peak picking, the
/// clap classifier and word assembly together. One `ClapDetector` owns one
/// of each, so independent detectors never share state.

use crate::audio_buffer::{AudioBuffer, AudioIngest, AudioSample};
use crate::classifier::{ClapClassifier, ClapState, Transition};
use crate::conditioning::SignalConditioner;
use crate::config::{ConfigError, DetectorConfig};
use crate::capture::DeviceError;
use crate::dispatcher::EventDispatcher;
use crate::peaks::PeakDetector;
use crate::word::{Symbol, Word, WordAccumulator};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Processing task failed: {0}")]
    TaskFailed(String),
}

/// Detector statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub ticks_processed: u64,
    pub singles: u64,
    pub doubles: u64,
    pub words_completed: u64,
    pub echoes_suppressed: u64,
    pub callback_failures: u64,
}

/// Acoustic clap gesture decoder
pub struct ClapDetector {
    config: DetectorConfig,
    buffer: Arc<AudioBuffer>,
    conditioner: SignalConditioner,
    peaks: PeakDetector,
    classifier: ClapClassifier,
    word: WordAccumulator,
    dispatcher: EventDispatcher,
    snapshot: Vec<AudioSample>,
    stats: DetectorStats,
}

impl ClapDetector {
    /// Create a new clap detector
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        info!("Initializing clap detector");
        info!(
            "Sample rate: {} Hz, window: {} samples",
            config.sample_rate,
            config.buffer_capacity()
        );
        info!(
            "Threshold: {}, sigma: {}, double clap gap: {}s, word length: {}",
            config.amplitude_threshold,
            config.smoothing_sigma,
            config.max_double_clap_gap,
            config.word_length
        );

        let capacity = config.buffer_capacity();

        Ok(Self {
            buffer: Arc::new(AudioBuffer::with_capacity(capacity)),
            conditioner: SignalConditioner::from_config(&config),
            peaks: PeakDetector::from_config(&config),
            classifier: ClapClassifier::new(config.double_clap_gap()),
            word: WordAccumulator::new(config.word_length),
            dispatcher: EventDispatcher::new(),
            snapshot: Vec::with_capacity(capacity),
            stats: DetectorStats::default(),
            config,
        })
    }

    /// Push a block of mono samples into the rolling window
    pub fn ingest(&self, samples: &[AudioSample]) {
        self.buffer.ingest(samples);
    }

    /// Producer handle for a capture source
    pub fn ingest_handle(&self) -> AudioIngest {
        AudioIngest::new(Arc::clone(&self.buffer))
    }

    pub fn on_waiting_second_clap<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatcher.on_waiting_second_clap(callback);
        self
    }

    pub fn on_clap_completed<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(Symbol) -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatcher.on_clap_completed(callback);
        self
    }

    pub fn on_word_completed<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&Word) -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatcher.on_word_completed(callback);
        self
    }

    /// Run one processing tick
    ///
    /// Snapshots the window, looks for a clap, advances the classifier and
    /// fires the resulting callbacks before returning.
    pub fn tick(&mut self, now: Instant) -> Transition {
        self.buffer.snapshot_into(&mut self.snapshot);
        let peak = self.detect_peak();

        let transition = self.classifier.step(peak, now);
        self.stats.ticks_processed += 1;

        if transition.clears_buffer() {
            self.buffer.clear();
        }

        match transition {
            Transition::Quiet => {}
            Transition::EchoSuppressed { .. } => {
                self.stats.echoes_suppressed += 1;
            }
            Transition::FirstClap { amplitude } => {
                debug!("First clap (amplitude={:.4}), waiting for a second", amplitude);
                self.dispatcher.waiting_second_clap();
            }
            Transition::Classified(event) => {
                match event.symbol {
                    Symbol::Single => self.stats.singles += 1,
                    Symbol::Double => self.stats.doubles += 1,
                }
                info!(
                    "Clap completed: {} (amplitude={:.4})",
                    event.symbol, event.peak_amplitude
                );
                self.dispatcher.clap_completed(event.symbol);

                if let Some(word) = self.word.append_symbol(event.symbol) {
                    self.stats.words_completed += 1;
                    info!("Word completed: {}", word);
                    self.dispatcher.word_completed(&word);
                }
            }
        }

        self.stats.callback_failures = self.dispatcher.failures();
        transition
    }

    /// Envelope amplitude of this tick's clap, if the window holds one
    fn detect_peak(&self) -> Option<f32> {
        let thresholded = self.conditioner.apply_threshold(&self.snapshot);
        if thresholded.iter().all(|&s| s == 0.0) {
            return None;
        }

        let envelope = self.conditioner.apply_smoothing(&thresholded);
        let peaks = self.peaks.find_peaks(&envelope);
        if peaks.is_empty() {
            return None;
        }

        let amplitude = envelope.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
        trace!("Found {} peak(s), amplitude={}", peaks.len(), amplitude);
        Some(amplitude)
    }

    pub fn state(&self) -> ClapState {
        self.classifier.state()
    }

    /// Symbols of the word in progress
    pub fn pending_word(&self) -> &[Symbol] {
        self.word.pending()
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Current contents of the rolling window
    pub fn window(&self) -> Vec<AudioSample> {
        self.buffer.snapshot()
    }

    /// Reset detector state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.classifier.reset();
        self.word.reset();
        self.dispatcher.reset_failures();
        self.stats = DetectorStats::default();
        info!("Detector reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    const RATE: u32 = 8000;
    const TICK_SAMPLES: usize = RATE as usize / 10;

    fn test_config() -> DetectorConfig {
        DetectorConfig {
            sample_rate: RATE,
            ..Default::default()
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    /// One tick worth of audio with a decaying clap at the start
    fn clap_block(amplitude: f32) -> Vec<f32> {
        let mut block = vec![0.0; TICK_SAMPLES];
        for (i, sample) in block.iter_mut().take(200).enumerate() {
            *sample = amplitude * (1.0 - i as f32 / 200.0);
        }
        block
    }

    fn silence_block() -> Vec<f32> {
        vec![0.0; TICK_SAMPLES]
    }

    #[test]
    fn test_detector_creation() {
        let detector = ClapDetector::new(test_config()).unwrap();

        assert_eq!(detector.state(), ClapState::Idle);
        assert_eq!(detector.stats(), DetectorStats::default());
        assert_eq!(detector.window().len(), RATE as usize);
        assert!(detector.pending_word().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DetectorConfig {
            word_length: 0,
            ..test_config()
        };
        assert!(matches!(
            ClapDetector::new(config),
            Err(ConfigError::InvalidWordLength(0))
        ));
    }

    #[test]
    fn test_oversized_gap_fails_construction() {
        let config = DetectorConfig {
            max_double_clap_gap: 1e20,
            ..test_config()
        };
        assert!(matches!(
            ClapDetector::new(config),
            Err(ConfigError::InvalidDoubleClapGap(_))
        ));
    }

    #[test]
    fn test_silence_never_fires() {
        let fired = Arc::new(Mutex::new(0));
        let mut detector = ClapDetector::new(test_config()).unwrap();
        let f = Arc::clone(&fired);
        detector.on_waiting_second_clap(move || {
            *f.lock().unwrap() += 1;
            Ok(())
        });

        let t0 = Instant::now();
        for tick in 0..50 {
            detector.ingest(&silence_block());
            assert_eq!(detector.tick(t0 + ms(tick * 100)), Transition::Quiet);
        }

        assert_eq!(*fired.lock().unwrap(), 0);
        assert_eq!(detector.state(), ClapState::Idle);
        assert_eq!(detector.stats().ticks_processed, 50);
    }

    #[test]
    fn test_sub_threshold_noise_is_ignored() {
        let mut detector = ClapDetector::new(test_config()).unwrap();
        detector.ingest(&clap_block(0.09));

        assert_eq!(detector.tick(Instant::now()), Transition::Quiet);
    }

    #[test]
    fn test_classified_peak_clears_window() {
        let mut detector = ClapDetector::new(test_config()).unwrap();
        detector.ingest(&clap_block(0.5));

        let transition = detector.tick(Instant::now());

        assert!(matches!(transition, Transition::FirstClap { .. }));
        assert!(detector.window().iter().all(|&s| s == 0.0));
        assert_eq!(detector.state(), ClapState::WaitingSecondClap);
    }

    #[test]
    fn test_echo_leaves_window_untouched() {
        let mut detector = ClapDetector::new(test_config()).unwrap();
        let t0 = Instant::now();

        detector.ingest(&clap_block(0.5));
        detector.tick(t0);

        // Same clap, same position in the window: identical envelope
        detector.ingest(&clap_block(0.5));
        let transition = detector.tick(t0 + ms(100));

        assert!(matches!(transition, Transition::EchoSuppressed { .. }));
        assert!(detector.window().iter().any(|&s| s != 0.0));
        assert_eq!(detector.stats().echoes_suppressed, 1);
    }

    #[test]
    fn test_double_clap_and_stats() {
        let mut detector = ClapDetector::new(test_config()).unwrap();
        let t0 = Instant::now();

        detector.ingest(&clap_block(0.5));
        detector.tick(t0);
        detector.ingest(&silence_block());
        detector.tick(t0 + ms(100));
        detector.ingest(&clap_block(0.8));
        let transition = detector.tick(t0 + ms(200));

        match transition {
            Transition::Classified(event) => assert_eq!(event.symbol, Symbol::Double),
            other => panic!("Expected double clap, got {:?}", other),
        }
        assert_eq!(detector.pending_word(), &[Symbol::Double]);
        assert_eq!(detector.stats().doubles, 1);
    }

    #[test]
    fn test_callback_failure_does_not_alter_state() {
        let mut detector = ClapDetector::new(test_config()).unwrap();
        detector.on_waiting_second_clap(|| anyhow::bail!("speaker busy"));

        detector.ingest(&clap_block(0.5));
        detector.tick(Instant::now());

        assert_eq!(detector.state(), ClapState::WaitingSecondClap);
        assert_eq!(detector.stats().callback_failures, 1);
    }

    #[test]
    fn test_reset() {
        let mut detector = ClapDetector::new(test_config()).unwrap();
        let t0 = Instant::now();

        detector.ingest(&clap_block(0.5));
        detector.tick(t0);
        detector.tick(t0 + ms(1500));
        detector.ingest(&clap_block(0.7));

        detector.reset();

        assert_eq!(detector.state(), ClapState::Idle);
        assert!(detector.pending_word().is_empty());
        assert_eq!(detector.stats(), DetectorStats::default());
        assert!(detector.window().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_independent_detectors_do_not_interfere() {
        let mut a = ClapDetector::new(test_config()).unwrap();
        let mut b = ClapDetector::new(test_config()).unwrap();
        let t0 = Instant::now();

        a.ingest(&clap_block(0.5));
        a.tick(t0);
        b.tick(t0);

        assert_eq!(a.state(), ClapState::WaitingSecondClap);
        assert_eq!(b.state(), ClapState::Idle);
    }
}
