//! Native device speech adapter
//!
//! Used on non-browser runtimes. Whatever goes wrong while starting the
//! device engine is reported as an error event with the engine's own
//! message; nothing escapes `start` except a double start.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::adapter::{AdapterError, AdapterEvent, AdapterSink, BackendAdapter, BackendKind};
use super::engine::{spawn_pump, EngineError, RecognitionConfig, SpeechEngine};

/// Adapter over a device-level speech engine
pub struct NativeSpeechAdapter {
    engine: Option<Arc<dyn SpeechEngine>>,
    sink: Option<AdapterSink>,
    pump: Option<JoinHandle<()>>,
}

impl NativeSpeechAdapter {
    /// `engine` is `None` when the runtime has no device engine installed;
    /// sessions then fail with an unavailable error.
    pub fn new(engine: Option<Arc<dyn SpeechEngine>>) -> Self {
        Self {
            engine,
            sink: None,
            pump: None,
        }
    }
}

impl BackendAdapter for NativeSpeechAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn start(&mut self, locale: &str, sink: AdapterSink) -> Result<(), AdapterError> {
        if self.is_active() {
            return Err(AdapterError::AlreadyActive(BackendKind::Native));
        }

        let started = match &self.engine {
            Some(engine) => {
                info!(
                    engine = engine.name(),
                    session = sink.session(),
                    locale,
                    "starting native recognition"
                );
                let (engine_tx, engine_rx) = mpsc::unbounded_channel();
                engine
                    .start(&RecognitionConfig::single_shot(locale), engine_tx)
                    .map(|()| engine_rx)
            }
            None => Err(EngineError::Unavailable("no native engine configured".to_string())),
        };

        match started {
            Ok(engine_rx) => {
                self.pump = Some(spawn_pump(engine_rx, sink.clone(), str::to_string));
            }
            Err(e) => {
                warn!(?e, "native recognition failed to start");
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

        debug!(session = sink.session(), "stopping native recognition");
        sink.close();
        if let Some(engine) = &self.engine {
            engine.stop();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.sink.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::engine::testing::ScriptedEngine;
    use crate::backend::engine::EngineEvent;

    fn adapter_with(engine: ScriptedEngine) -> (NativeSpeechAdapter, Arc<ScriptedEngine>) {
        let engine = Arc::new(engine);
        (NativeSpeechAdapter::new(Some(engine.clone())), engine)
    }

    #[tokio::test]
    async fn test_permission_failure_is_reported_as_event() {
        let (mut adapter, _engine) =
            adapter_with(ScriptedEngine::failing(EngineError::PermissionDenied));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(adapter.start("id-ID", AdapterSink::new(1, tx)).is_ok());
        assert_eq!(
            rx.recv().await.unwrap().event,
            AdapterEvent::Error("permission denied".into())
        );
    }

    #[tokio::test]
    async fn test_missing_engine_is_reported_as_event() {
        let mut adapter = NativeSpeechAdapter::new(None);
        let (tx, mut rx) = mpsc::unbounded_channel();

        adapter.start("id-ID", AdapterSink::new(1, tx)).unwrap();
        assert_eq!(
            rx.recv().await.unwrap().event,
            AdapterEvent::Error("speech engine unavailable: no native engine configured".into())
        );
    }

    #[tokio::test]
    async fn test_engine_messages_pass_through() {
        let (mut adapter, _engine) =
            adapter_with(ScriptedEngine::new(vec![EngineEvent::Error("7/No match".into())]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        adapter.start("id-ID", AdapterSink::new(1, tx)).unwrap();
        assert_eq!(
            rx.recv().await.unwrap().event,
            AdapterEvent::Error("7/No match".into())
        );
    }

    #[tokio::test]
    async fn test_end_of_speech_without_result() {
        let (mut adapter, engine) = adapter_with(ScriptedEngine::new(vec![EngineEvent::End]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        adapter.start("id-ID", AdapterSink::new(5, tx)).unwrap();
        assert_eq!(rx.recv().await.unwrap().event, AdapterEvent::End);
        assert_eq!(engine.last_config().unwrap().locale, "id-ID");
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (mut adapter, _engine) = adapter_with(ScriptedEngine::new(Vec::new()));
        let (tx, _rx) = mpsc::unbounded_channel();

        adapter.start("id-ID", AdapterSink::new(1, tx.clone())).unwrap();
        assert!(matches!(
            adapter.start("id-ID", AdapterSink::new(2, tx)),
            Err(AdapterError::AlreadyActive(BackendKind::Native))
        ));

        adapter.stop();
        assert!(!adapter.is_active());
    }
}
