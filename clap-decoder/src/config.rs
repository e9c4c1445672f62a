/// Detector configuration
///
/// All parameters are fixed once a detector is built. Values can come from
/// code, from a JSON file, or from a mix of both (missing JSON fields take the
/// defaults below).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default capture rate of the clap microphone
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default processing period
pub const DEFAULT_TICK_PERIOD_MS: u64 = 100;

/// Highest accepted capture rate
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Longest accepted rolling window, in seconds
pub const MAX_WINDOW_SECONDS: f64 = 60.0;

/// Widest accepted smoothing kernel, in samples (radius is 4 sigma)
pub const MAX_SMOOTHING_SIGMA: f32 = 1000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid sample rate: {0} Hz (must be 1..={max} Hz)", max = MAX_SAMPLE_RATE)]
    InvalidSampleRate(u32),

    #[error("Invalid word length: {0} (must be > 0)")]
    InvalidWordLength(usize),

    #[error("Invalid max double clap gap: {0}s (must be > 0 and fit a Duration)")]
    InvalidDoubleClapGap(f64),

    #[error("Invalid amplitude threshold: {0} (must be >= 0)")]
    InvalidThreshold(f32),

    #[error("Invalid smoothing sigma: {0} (must be 0..={max})", max = MAX_SMOOTHING_SIGMA)]
    InvalidSmoothingSigma(f32),

    #[error("Invalid min clap duration: {0}s (must be >= 0)")]
    InvalidClapDuration(f64),

    #[error("Invalid window: {0}s (must be > 0, <= {max}s)", max = MAX_WINDOW_SECONDS)]
    InvalidWindow(f64),

    #[error("Invalid tick period: {0}ms (must be > 0)")]
    InvalidTickPeriod(u64),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for the clap detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples whose magnitude is at or below this value are zeroed
    #[serde(alias = "threshold")]
    pub amplitude_threshold: f32,

    /// Gaussian smoothing width, in samples
    #[serde(alias = "gaussian_sigma")]
    pub smoothing_sigma: f32,

    /// Shortest clap worth counting, in seconds
    pub min_clap_duration: f64,

    /// Longest wait for a second clap before settling on a single, in seconds
    pub max_double_clap_gap: f64,

    /// Number of symbols in a command word
    pub word_length: usize,

    /// Length of the rolling audio window, in seconds
    pub window_seconds: f64,

    /// Processing loop period in milliseconds
    pub tick_period_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            amplitude_threshold: 0.1,
            smoothing_sigma: 4.0,
            min_clap_duration: 0.08,
            max_double_clap_gap: 1.0,
            word_length: 4,
            window_seconds: 1.0,
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
        }
    }
}

impl DetectorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }

        if self.word_length == 0 {
            return Err(ConfigError::InvalidWordLength(self.word_length));
        }

        if self.max_double_clap_gap <= 0.0
            || Duration::try_from_secs_f64(self.max_double_clap_gap).is_err()
        {
            return Err(ConfigError::InvalidDoubleClapGap(self.max_double_clap_gap));
        }

        if !self.amplitude_threshold.is_finite() || self.amplitude_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.amplitude_threshold));
        }

        if !(0.0..=MAX_SMOOTHING_SIGMA).contains(&self.smoothing_sigma) {
            return Err(ConfigError::InvalidSmoothingSigma(self.smoothing_sigma));
        }

        if !self.min_clap_duration.is_finite() || self.min_clap_duration < 0.0 {
            return Err(ConfigError::InvalidClapDuration(self.min_clap_duration));
        }

        if !(self.window_seconds > 0.0 && self.window_seconds <= MAX_WINDOW_SECONDS)
            || self.buffer_capacity() == 0
        {
            return Err(ConfigError::InvalidWindow(self.window_seconds));
        }

        if self.tick_period_ms == 0 {
            return Err(ConfigError::InvalidTickPeriod(self.tick_period_ms));
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading detector config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Number of samples held by the rolling window
    pub fn buffer_capacity(&self) -> usize {
        (self.sample_rate as f64 * self.window_seconds).round() as usize
    }

    /// Saturates at `Duration::MAX` for gaps `validate` would reject
    pub fn double_clap_gap(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_double_clap_gap).unwrap_or(Duration::MAX)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Minimum distance between two accepted peaks, in samples
    ///
    /// Half a second of audio (at most two claps per second), widened to
    /// `min_clap_duration` when that is longer.
    pub fn min_peak_distance(&self) -> usize {
        let half_second = self.sample_rate as usize / 2;
        let clap = (self.min_clap_duration * self.sample_rate as f64).ceil() as usize;
        half_second.max(clap).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity(), 48000);
        assert_eq!(config.min_peak_distance(), 24000);
        assert_eq!(config.double_clap_gap(), Duration::from_secs(1));
        assert_eq!(config.tick_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_config_validation() {
        let mut config = DetectorConfig::default();

        config.sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSampleRate(0))));
        config.sample_rate = MAX_SAMPLE_RATE + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSampleRate(_))));
        config.sample_rate = 48000;

        config.word_length = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWordLength(0))));
        config.word_length = 4;

        config.max_double_clap_gap = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDoubleClapGap(_))));
        config.max_double_clap_gap = -1.0;
        assert!(config.validate().is_err());
        config.max_double_clap_gap = f64::NAN;
        assert!(config.validate().is_err());
        config.max_double_clap_gap = 1e20;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDoubleClapGap(_))));
        config.max_double_clap_gap = 1.0;

        config.amplitude_threshold = -0.1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreshold(_))));
        config.amplitude_threshold = 0.1;

        config.smoothing_sigma = -2.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSmoothingSigma(_))));
        config.smoothing_sigma = 1e30;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSmoothingSigma(_))));
        config.smoothing_sigma = f32::NAN;
        assert!(config.validate().is_err());
        config.smoothing_sigma = 0.0;
        assert!(config.validate().is_ok());

        config.window_seconds = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWindow(_))));
        config.window_seconds = 1e12;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWindow(_))));
        config.window_seconds = f64::INFINITY;
        assert!(config.validate().is_err());
        config.window_seconds = 1.0;

        config.tick_period_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTickPeriod(0))));
    }

    #[test]
    fn test_long_clap_duration_widens_peak_distance() {
        let config = DetectorConfig {
            sample_rate: 1000,
            min_clap_duration: 0.75,
            ..Default::default()
        };
        assert_eq!(config.min_peak_distance(), 750);
    }

    #[test]
    fn test_partial_json_uses_defaults_and_aliases() {
        let config = DetectorConfig::from_json_str(
            r#"{
                "sample_rate": 16000,
                "threshold": 0.2,
                "gaussian_sigma": 2.0,
                "word_length": 3
            }"#,
        )
        .unwrap();

        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.amplitude_threshold, 0.2);
        assert_eq!(config.smoothing_sigma, 2.0);
        assert_eq!(config.word_length, 3);
        assert_eq!(config.max_double_clap_gap, 1.0);
        assert_eq!(config.buffer_capacity(), 16000);
    }

    #[test]
    fn test_invalid_json_values_rejected() {
        let result = DetectorConfig::from_json_str(r#"{ "word_length": 0 }"#);
        assert!(matches!(result, Err(ConfigError::InvalidWordLength(0))));

        let result = DetectorConfig::from_json_str(r#"{ "max_double_clap_gap": 1e20 }"#);
        assert!(matches!(result, Err(ConfigError::InvalidDoubleClapGap(_))));

        let result = DetectorConfig::from_json_str(r#"{ "window_seconds": 1e9 }"#);
        assert!(matches!(result, Err(ConfigError::InvalidWindow(_))));

        let result = DetectorConfig::from_json_str("not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_double_clap_gap": 0.5, "tick_period_ms": 50 }}"#).unwrap();

        let config = DetectorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.double_clap_gap(), Duration::from_millis(500));
        assert_eq!(config.tick_period(), Duration::from_millis(50));

        let missing = DetectorConfig::from_json_file("/nonexistent/clap.json");
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
