/// Clap gesture decoder library
///
/// Decodes hand claps from a live mono audio stream into command words made
/// of Single ('S') and Double ('D') clap symbols: rolling audio window,
/// threshold + Gaussian conditioning, peak picking, an echo-suppressing
/// single/double classifier and word assembly with host callbacks.

pub mod audio_buffer;
pub mod capture;
pub mod classifier;
pub mod conditioning;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod peaks;
pub mod service;
pub mod word;

// Re-export main types
pub use audio_buffer::{AudioBuffer, AudioIngest, AudioSample};
pub use capture::{list_input_devices, AudioSource, CpalSource, DeviceError, WavSource};
pub use classifier::{ClapClassifier, ClapEvent, ClapState, Transition};
pub use conditioning::SignalConditioner;
pub use config::{ConfigError, DetectorConfig, DEFAULT_SAMPLE_RATE};
pub use detector::{ClapDetector, DetectorError, DetectorStats};
pub use dispatcher::{CallbackError, EventDispatcher};
pub use peaks::PeakDetector;
pub use service::DetectorHandle;
pub use word::{Symbol, Word, WordAccumulator, WordError};
