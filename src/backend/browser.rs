//! Browser speech recognition adapter
//!
//! Drives a browser-hosted recognizer configured for single-shot, final-only
//! recognition with one alternative. Browser engines report failures as
//! short error codes, which are turned into readable reasons here.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::adapter::{AdapterError, AdapterEvent, AdapterSink, BackendAdapter, BackendKind};
use super::engine::{spawn_pump, RecognitionConfig, SpeechEngine};

/// Adapter over a browser recognition engine
pub struct BrowserSpeechAdapter {
    engine: Arc<dyn SpeechEngine>,
    sink: Option<AdapterSink>,
    pump: Option<JoinHandle<()>>,
}

impl BrowserSpeechAdapter {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            sink: None,
            pump: None,
        }
    }
}

impl BackendAdapter for BrowserSpeechAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Browser
    }

    fn start(&mut self, locale: &str, sink: AdapterSink) -> Result<(), AdapterError> {
        if self.is_active() {
            return Err(AdapterError::AlreadyActive(BackendKind::Browser));
        }

        let config = RecognitionConfig::single_shot(locale);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        info!(
            engine = self.engine.name(),
            session = sink.session(),
            locale,
            "starting browser recognition"
        );

        match self.engine.start(&config, engine_tx) {
            Ok(()) => {
                self.pump = Some(spawn_pump(engine_rx, sink.clone(), describe_error_code));
            }
            Err(e) => {
                warn!(?e, "browser recognition failed to start");
                sink.emit(AdapterEvent::Error(e.to_string()));
            }
        }

        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(sink) = self.sink.take() else {
            return;
        };

        debug!(session = sink.session(), "stopping browser recognition");
        sink.close();
        self.engine.stop();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.sink.is_some()
    }
}

/// Map a browser recognition error code to a readable reason
pub fn describe_error_code(code: &str) -> String {
    let reason = match code.trim() {
        "not-allowed" | "service-not-allowed" => "permission denied",
        "no-speech" => "no speech detected",
        "audio-capture" => "no microphone available",
        "network" => "network error",
        "aborted" => "recognition aborted",
        "language-not-supported" => "language not supported",
        "bad-grammar" => "invalid grammar",
        other => other,
    };
    reason.to_string()
}
