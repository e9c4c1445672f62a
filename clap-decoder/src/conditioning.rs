/// Signal conditioning for clap detection
///
/// Turns a raw window into an envelope that is easy to peak-pick: quiet
/// samples are zeroed, then a Gaussian blur merges the many zero-crossings
/// of one clap into a single broad bump.

use crate::audio_buffer::AudioSample;
use crate::config::{DetectorConfig, MAX_SMOOTHING_SIGMA};
use tracing::debug;

/// Gaussian kernel extends this many sigmas either side of the centre
const KERNEL_TRUNCATE: f32 = 4.0;

/// Stateless threshold + smoothing stage
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    threshold: f32,
    kernel: Vec<f32>,
}

impl SignalConditioner {
    /// Create a conditioner; the Gaussian kernel is built once here
    ///
    /// `sigma` is clamped to `0..=MAX_SMOOTHING_SIGMA`; NaN means no smoothing.
    pub fn new(threshold: f32, sigma: f32) -> Self {
        let sigma = if sigma.is_nan() {
            0.0
        } else {
            sigma.clamp(0.0, MAX_SMOOTHING_SIGMA)
        };
        let kernel = gaussian_kernel(sigma);
        debug!(
            "Signal conditioner: threshold={}, sigma={}, kernel={} taps",
            threshold,
            sigma,
            kernel.len()
        );

        Self { threshold, kernel }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.amplitude_threshold, config.smoothing_sigma)
    }

    /// Zero every sample whose magnitude is at or below the threshold
    ///
    /// Louder samples keep their value and sign.
    pub fn apply_threshold(&self, signal: &[AudioSample]) -> Vec<AudioSample> {
        signal
            .iter()
            .map(|&s| if s.abs() > self.threshold { s } else { 0.0 })
            .collect()
    }

    /// Convolve with the Gaussian kernel
    ///
    /// Edges are handled by mirroring the window about its boundary
    /// (`d c b a | a b c d | d c b a`), so a constant signal stays constant.
    pub fn apply_smoothing(&self, signal: &[AudioSample]) -> Vec<AudioSample> {
        let n = signal.len();
        if n == 0 || self.kernel.len() == 1 {
            return signal.to_vec();
        }

        let radius = (self.kernel.len() / 2) as isize;
        let mut smoothed = Vec::with_capacity(n);

        for i in 0..n as isize {
            let start = i - radius;
            let end = i + radius;

            let value: f32 = if start >= 0 && end < n as isize {
                let window = &signal[start as usize..=end as usize];
                window
                    .iter()
                    .zip(&self.kernel)
                    .map(|(&s, &w)| s * w)
                    .sum()
            } else {
                self.kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| signal[reflect_index(start + k as isize, n)] * w)
                    .sum()
            };

            smoothed.push(value);
        }

        smoothed
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Kernel half-width in samples
    pub fn radius(&self) -> usize {
        self.kernel.len() / 2
    }
}

/// Normalised Gaussian weights over `[-r, r]`, `r = round(4 * sigma)`
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (KERNEL_TRUNCATE * sigma + 0.5) as usize;
    if radius == 0 {
        return vec![1.0];
    }

    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (-(radius as isize)..=radius as isize)
        .map(|x| (-((x * x) as f32) / denom).exp())
        .collect();
    let total: f32 = weights.iter().sum();

    weights.into_iter().map(|w| w / total).collect()
}

/// Map an out-of-range index back into `0..n` by half-sample reflection
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}
