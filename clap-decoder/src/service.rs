/// Processing loop
///
/// Runs `ClapDetector::tick` on a fixed period in a Tokio task while a
/// capture source feeds the rolling window. Ticks always run to completion:
/// stopping takes effect between ticks, so every clap or word decided in a
/// tick is delivered and no callback is running once `stop` returns.

use crate::capture::AudioSource;
use crate::detector::{ClapDetector, DetectorError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A running detector
pub struct DetectorHandle {
    cancel: CancellationToken,
    task: JoinHandle<ClapDetector>,
    source: Box<dyn AudioSource + Send>,
}

impl ClapDetector {
    /// Start capture and the processing loop
    ///
    /// The source is started first; if it fails the error is returned and
    /// nothing is spawned.
    pub async fn start<S>(self, mut source: S) -> Result<DetectorHandle, DetectorError>
    where
        S: AudioSource + Send + 'static,
    {
        source.start(self.ingest_handle())?;

        let period = self.config().tick_period();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(self, period, cancel.clone()));

        info!("Clap detector started (tick period {:?})", period);

        Ok(DetectorHandle {
            cancel,
            task,
            source: Box::new(source),
        })
    }
}

impl DetectorHandle {
    /// Stop the loop and the source, handing the detector back
    pub async fn stop(mut self) -> Result<ClapDetector, DetectorError> {
        self.cancel.cancel();
        let result = (&mut self.task).await;
        self.source.stop();

        let detector = result.map_err(|e| DetectorError::TaskFailed(e.to_string()))?;
        info!("Clap detector stopped: {:?}", detector.stats());
        Ok(detector)
    }

    /// Token that stops the loop when cancelled (the source keeps running
    /// until `stop`)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            warn!("Detector handle dropped without stop(); cancelling loop");
            self.cancel.cancel();
        }
    }
}

async fn run_loop(
    mut detector: ClapDetector,
    period: Duration,
    cancel: CancellationToken,
) -> ClapDetector {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Processing loop cancelled");
                break;
            }
            instant = interval.tick() => {
                detector.tick(instant.into_std());
            }
        }
    }

    detector
}
