//! Simulated recognition for runtimes without a speech engine
//!
//! Listens for 3 s, processes for 1 s, then answers with a random phrase
//! from a fixed corpus. The timings are observable by the UI and tests.

use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::adapter::{AdapterError, AdapterEvent, AdapterSink, BackendAdapter, BackendKind};

/// Time spent "listening" before switching to processing
pub const LISTEN_DELAY: Duration = Duration::from_millis(3000);

/// Time spent "processing" before the result is delivered
pub const PROCESS_DELAY: Duration = Duration::from_millis(1000);

/// Phrases the simulated backend answers with
pub const SIMULATED_PHRASES: [&str; 6] = [
    "bagaimana cara ganti oli",
    "kenapa mesin overheat",
    "cara check aki mobil",
    "suara mesin kasar",
    "rem blong penyebabnya",
    "ac mobil tidak dingin",
];

/// Timer-driven stand-in for a real recognizer
#[derive(Default)]
pub struct SimulatedAdapter {
    sink: Option<AdapterSink>,
    timers: Option<JoinHandle<()>>,
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendAdapter for SimulatedAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulated
    }

    fn start(&mut self, locale: &str, sink: AdapterSink) -> Result<(), AdapterError> {
        if self.is_active() {
            return Err(AdapterError::AlreadyActive(BackendKind::Simulated));
        }

        info!(session = sink.session(), locale, "starting simulated recognition");

        let timer_sink = sink.clone();
        self.timers = Some(tokio::spawn(async move {
            tokio::time::sleep(LISTEN_DELAY).await;
            timer_sink.emit(AdapterEvent::PhaseChange);

            tokio::time::sleep(PROCESS_DELAY).await;
            let phrase = pick_phrase();
            debug!(session = timer_sink.session(), phrase, "simulated result ready");
            timer_sink.emit(AdapterEvent::Result(phrase.to_string()));
        }));
        self.sink = Some(sink);

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            debug!(session = sink.session(), "cancelling simulated recognition");
            sink.close();
        }
        if let Some(timers) = self.timers.take() {
            timers.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.sink.is_some()
    }
}

fn pick_phrase() -> &'static str {
    SIMULATED_PHRASES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(SIMULATED_PHRASES[0])
}
