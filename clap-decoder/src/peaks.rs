/// Peak picking over the smoothed clap envelope
///
/// A peak is a sample higher than its left neighbour and not lower than its
/// right one; flat tops report their midpoint and the window edges never
/// count. Peaks closer than the minimum distance are thinned, tallest first,
/// so the ringing tail of one clap cannot register as several events.

use crate::audio_buffer::AudioSample;
use crate::config::DetectorConfig;
use tracing::trace;

/// Local-maximum detector with a minimum separation
#[derive(Debug, Clone, Copy)]
pub struct PeakDetector {
    min_distance: usize,
}

impl PeakDetector {
    /// `min_distance` is in samples; 0 is treated as 1 (no thinning)
    pub fn new(min_distance: usize) -> Self {
        Self {
            min_distance: min_distance.max(1),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.min_peak_distance())
    }

    /// Indices of accepted peaks, in ascending order
    pub fn find_peaks(&self, envelope: &[AudioSample]) -> Vec<usize> {
        let candidates = local_maxima(envelope);
        if candidates.len() < 2 || self.min_distance == 1 {
            return candidates;
        }

        let peaks = select_by_distance(&candidates, envelope, self.min_distance);
        trace!(
            "Peak detection: {} candidates, {} kept",
            candidates.len(),
            peaks.len()
        );
        peaks
    }

    pub fn min_distance(&self) -> usize {
        self.min_distance
    }
}

fn local_maxima(x: &[AudioSample]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let last = x.len() - 1;
    let mut i = 1;

    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }

            if x[ahead] < x[i] {
                let right = ahead - 1;
                peaks.push((i + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

fn select_by_distance(peaks: &[usize], x: &[AudioSample], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];

    // Stable sort: among equal heights the later peak is visited first
    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in by_height.iter().rev() {
        if !keep[j] {
            continue;
        }

        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }

        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}
