/// Clap classification state machine
///
/// Consumes at most one peak observation per processing tick and decides
/// whether it starts a gesture, completes a double clap, or is an echo of
/// the previous clap. A pending first clap becomes a single once
/// `max_double_clap_gap` has elapsed, checked at tick granularity: a single
/// is reported on the first tick strictly after the gap, so never earlier
/// than the gap and at most one tick period later.

use crate::word::Symbol;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Classifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClapState {
    /// No gesture in progress
    Idle,

    /// First clap seen, waiting to see if a second one follows
    WaitingSecondClap,
}

/// A classified clap gesture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClapEvent {
    pub symbol: Symbol,

    /// Envelope amplitude of the clap that decided the symbol
    pub peak_amplitude: f32,

    /// Tick at which the symbol was decided
    pub timestamp: Instant,
}

/// Outcome of one classifier step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Nothing to report
    Quiet,

    /// The peak repeated the last clap amplitude exactly and was ignored
    EchoSuppressed { amplitude: f32 },

    /// First clap of a gesture; now waiting for a second one
    FirstClap { amplitude: f32 },

    /// A symbol was decided
    Classified(ClapEvent),
}

impl Transition {
    /// Whether the peak was consumed, so the audio window must be cleared
    pub fn clears_buffer(&self) -> bool {
        matches!(self, Transition::FirstClap { .. } | Transition::Classified(_))
    }
}

/// Single/double clap state machine
#[derive(Debug, Clone)]
pub struct ClapClassifier {
    max_gap: Duration,
    state: ClapState,
    first_clap_time: Option<Instant>,
    first_clap_amplitude: Option<f32>,
    last_clap_amplitude: Option<f32>,
}

impl ClapClassifier {
    pub fn new(max_gap: Duration) -> Self {
        Self {
            max_gap,
            state: ClapState::Idle,
            first_clap_time: None,
            first_clap_amplitude: None,
            last_clap_amplitude: None,
        }
    }

    /// Advance by one tick
    ///
    /// `peak` is the envelope amplitude when the tick found a peak, `None`
    /// otherwise.
    pub fn step(&mut self, peak: Option<f32>, now: Instant) -> Transition {
        trace!("Classifier step: state={:?}, peak={:?}", self.state, peak);

        match self.state {
            ClapState::Idle => match peak {
                None => Transition::Quiet,
                Some(amplitude) if self.is_echo(amplitude) => {
                    debug!("Echo of last clap ignored (amplitude={})", amplitude);
                    Transition::EchoSuppressed { amplitude }
                }
                Some(amplitude) => {
                    self.first_clap_time = Some(now);
                    self.first_clap_amplitude = Some(amplitude);
                    self.last_clap_amplitude = Some(amplitude);
                    self.state = ClapState::WaitingSecondClap;
                    debug!(
                        "State: Idle -> WaitingSecondClap (amplitude={})",
                        amplitude
                    );
                    Transition::FirstClap { amplitude }
                }
            },

            ClapState::WaitingSecondClap => {
                if self.gap_expired(now) {
                    let amplitude = self.first_clap_amplitude.unwrap_or_default();
                    self.state = ClapState::Idle;
                    debug!("State: WaitingSecondClap -> Idle (single clap)");
                    return Transition::Classified(ClapEvent {
                        symbol: Symbol::Single,
                        peak_amplitude: amplitude,
                        timestamp: now,
                    });
                }

                match peak {
                    None => Transition::Quiet,
                    Some(amplitude) if self.is_echo(amplitude) => {
                        debug!("Echo of first clap ignored (amplitude={})", amplitude);
                        Transition::EchoSuppressed { amplitude }
                    }
                    Some(amplitude) => {
                        self.state = ClapState::Idle;
                        debug!(
                            "State: WaitingSecondClap -> Idle (double clap, amplitude={})",
                            amplitude
                        );
                        Transition::Classified(ClapEvent {
                            symbol: Symbol::Double,
                            peak_amplitude: amplitude,
                            timestamp: now,
                        })
                    }
                }
            }
        }
    }

    /// Exact repeat of the last recorded clap amplitude
    ///
    /// Deliberately bit-exact: it only catches a literal re-read of the same
    /// window. Clearing the window after each classified peak is what stops
    /// ordinary ringing from being counted twice.
    fn is_echo(&self, amplitude: f32) -> bool {
        self.last_clap_amplitude == Some(amplitude)
    }

    fn gap_expired(&self, now: Instant) -> bool {
        self.first_clap_time
            .map(|first| now.saturating_duration_since(first) > self.max_gap)
            .unwrap_or(false)
    }

    pub fn state(&self) -> ClapState {
        self.state
    }

    pub fn first_clap_time(&self) -> Option<Instant> {
        self.first_clap_time
    }

    pub fn last_clap_amplitude(&self) -> Option<f32> {
        self.last_clap_amplitude
    }

    pub fn max_gap(&self) -> Duration {
        self.max_gap
    }

    /// Back to Idle, forgetting any recorded clap
    pub fn reset(&mut self) {
        self.state = ClapState::Idle;
        self.first_clap_time = None;
        self.first_clap_amplitude = None;
        self.last_clap_amplitude = None;
        debug!("Classifier reset to Idle");
    }
}
