/// Audio buffer module for the rolling clap window
///
/// Holds the most recent `window_seconds` of mono audio. The window is
/// always full length: new samples enter at the tail and push the oldest
/// ones out, so it never grows and never needs allocation on the capture path.
/// At the default 48kHz, one second is 48,000 f32 samples (~192KB).

use cache_padded::CachePadded;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Audio sample format (f32 normalized to -1.0 to 1.0)
pub type AudioSample = f32;

/// Fixed-capacity rolling window of audio samples
///
/// Written by the capture callback, read and cleared by the processing loop.
/// Every access holds the lock only for a bounded copy.
pub struct AudioBuffer {
    ring: CachePadded<Mutex<HeapRb<AudioSample>>>,
    capacity: usize,
}

impl AudioBuffer {
    /// Create a zero-filled window of `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        debug!("Creating audio window with capacity: {} samples", capacity);

        let mut ring = HeapRb::<AudioSample>::new(capacity);
        ring.push_iter_overwrite(std::iter::repeat(0.0).take(capacity));

        Self {
            ring: CachePadded::new(Mutex::new(ring)),
            capacity,
        }
    }

    /// Append a mono block at the tail, dropping as many of the oldest samples
    ///
    /// The frame count is the slice length. When a block is longer than the
    /// window only its newest `capacity` samples are kept.
    pub fn ingest(&self, samples: &[AudioSample]) {
        self.ring.lock().push_slice_overwrite(samples);
    }

    /// Append samples produced by an iterator (e.g. one channel of an
    /// interleaved device block)
    pub fn ingest_iter<I>(&self, samples: I)
    where
        I: Iterator<Item = AudioSample>,
    {
        self.ring.lock().push_iter_overwrite(samples);
    }

    /// Copy the whole window, oldest sample first, into `out`
    ///
    /// `out` is reused between calls so a warm snapshot does not allocate.
    pub fn snapshot_into(&self, out: &mut Vec<AudioSample>) {
        out.clear();
        let ring = self.ring.lock();
        out.extend(ring.iter().copied());
    }

    /// Copy the whole window into a fresh vector
    pub fn snapshot(&self) -> Vec<AudioSample> {
        let mut out = Vec::with_capacity(self.capacity);
        self.snapshot_into(&mut out);
        out
    }

    /// Overwrite the window with silence
    pub fn clear(&self) {
        self.ring
            .lock()
            .push_iter_overwrite(std::iter::repeat(0.0).take(self.capacity));
        debug!("Cleared audio window");
    }

    /// Window capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples held; always equal to the capacity
    pub fn len(&self) -> usize {
        self.ring.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cloneable producer handle handed to a capture source
#[derive(Clone)]
pub struct AudioIngest {
    buffer: Arc<AudioBuffer>,
}

impl AudioIngest {
    pub(crate) fn new(buffer: Arc<AudioBuffer>) -> Self {
        Self { buffer }
    }

    /// Append a mono block
    pub fn ingest(&self, samples: &[AudioSample]) {
        self.buffer.ingest(samples);
    }

    /// Append the first channel of an interleaved block
    pub fn ingest_interleaved(&self, data: &[AudioSample], channels: usize) {
        if channels <= 1 {
            self.buffer.ingest(data);
        } else {
            self.buffer.ingest_iter(data.iter().step_by(channels).copied());
        }
    }

    /// Append converted samples without an intermediate allocation
    pub fn ingest_iter<I>(&self, samples: I)
    where
        I: Iterator<Item = AudioSample>,
    {
        self.buffer.ingest_iter(samples);
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

impl fmt::Debug for AudioIngest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioIngest")
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}
