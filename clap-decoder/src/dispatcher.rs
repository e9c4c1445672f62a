/// Host callback dispatch
///
/// Callbacks run synchronously on the processing task, one at a time, in the
/// order `waiting_second_clap -> clap_completed -> word_completed`. A
/// callback that returns an error or panics is logged and counted; it never
/// changes detector state or stops the loop.

use crate::word::{Symbol, Word};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("{callback} callback failed: {source}")]
    Failed {
        callback: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{callback} callback panicked: {message}")]
    Panicked {
        callback: &'static str,
        message: String,
    },
}

type WaitingCallback = Box<dyn FnMut() -> anyhow::Result<()> + Send>;
type ClapCallback = Box<dyn FnMut(Symbol) -> anyhow::Result<()> + Send>;
type WordCallback = Box<dyn FnMut(&Word) -> anyhow::Result<()> + Send>;

/// Holds the three host callbacks
#[derive(Default)]
pub struct EventDispatcher {
    waiting_second_clap: Option<WaitingCallback>,
    clap_completed: Option<ClapCallback>,
    word_completed: Option<WordCallback>,
    failures: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a first clap was heard and a second one may follow
    pub fn on_waiting_second_clap<F>(&mut self, callback: F)
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.waiting_second_clap = Some(Box::new(callback));
    }

    /// Called with each classified symbol
    pub fn on_clap_completed<F>(&mut self, callback: F)
    where
        F: FnMut(Symbol) -> anyhow::Result<()> + Send + 'static,
    {
        self.clap_completed = Some(Box::new(callback));
    }

    /// Called with each completed word
    pub fn on_word_completed<F>(&mut self, callback: F)
    where
        F: FnMut(&Word) -> anyhow::Result<()> + Send + 'static,
    {
        self.word_completed = Some(Box::new(callback));
    }

    pub fn waiting_second_clap(&mut self) {
        if let Some(callback) = self.waiting_second_clap.as_mut() {
            let result = invoke("waiting_second_clap", || callback());
            self.record(result);
        }
    }

    pub fn clap_completed(&mut self, symbol: Symbol) {
        if let Some(callback) = self.clap_completed.as_mut() {
            let result = invoke("clap_completed", || callback(symbol));
            self.record(result);
        }
    }

    pub fn word_completed(&mut self, word: &Word) {
        if let Some(callback) = self.word_completed.as_mut() {
            let result = invoke("word_completed", || callback(word));
            self.record(result);
        }
    }

    /// Number of callbacks that failed or panicked so far
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub(crate) fn reset_failures(&mut self) {
        self.failures = 0;
    }

    fn record(&mut self, result: Result<(), CallbackError>) {
        if let Err(e) = result {
            self.failures += 1;
            error!("{}", e);
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("waiting_second_clap", &self.waiting_second_clap.is_some())
            .field("clap_completed", &self.clap_completed.is_some())
            .field("word_completed", &self.word_completed.is_some())
            .field("failures", &self.failures)
            .finish()
    }
}

fn invoke<F>(callback: &'static str, f: F) -> Result<(), CallbackError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(CallbackError::Failed { callback, source }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CallbackError::Panicked { callback, message })
        }
    }
}
