//! Raw speech engines wrapped by the browser and native adapters
//!
//! An engine knows nothing about sessions. It is started with a
//! [`RecognitionConfig`] and an event channel, and reports what the
//! underlying recognizer does. Adapters turn those reports into
//! [`AdapterEvent`]s.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::adapter::{AdapterEvent, AdapterSink};

/// Recognizer settings passed to an engine at start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub locale: String,
    pub interim_results: bool,
    pub max_alternatives: u32,
    pub continuous: bool,
}

impl RecognitionConfig {
    /// Single-shot, final-only, top-alternative recognition for `locale`
    pub fn single_shot(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
            interim_results: false,
            max_alternatives: 1,
            continuous: false,
        }
    }
}

/// What an engine reports while running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Ranked alternatives of the first result, best first
    Result { alternatives: Vec<String> },
    /// Engine failure; browser engines report an error code here
    Error(String),
    /// Engine finished listening
    End,
}

/// Failure to start an engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// A recognizer the browser or native adapter can drive
pub trait SpeechEngine: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the engine can be used right now
    fn is_available(&self) -> bool;

    /// Start recognizing; events are sent on `events` until a terminal one
    fn start(
        &self,
        config: &RecognitionConfig,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), EngineError>;

    /// Abort recognition. Must tolerate being called when not running.
    fn stop(&self);
}

/// Forward engine events to `sink` until the session's terminal event.
///
/// Only the first alternative of a result is kept. If the engine drops its
/// channel without a terminal event the session ends silently.
pub(crate) fn spawn_pump<F>(
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    sink: AdapterSink,
    describe_error: F,
) -> JoinHandle<()>
where
    F: Fn(&str) -> String + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mapped = match event {
                EngineEvent::Result { alternatives } => {
                    AdapterEvent::Result(alternatives.into_iter().next().unwrap_or_default())
                }
                EngineEvent::Error(reason) => AdapterEvent::Error(describe_error(&reason)),
                EngineEvent::End => AdapterEvent::End,
            };
            sink.emit(mapped);
            if !sink.is_open() {
                return;
            }
        }

        debug!(session = sink.session(), "engine channel closed without terminal event");
        sink.emit(AdapterEvent::End);
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// In-memory engine that replays a fixed script on start
    pub(crate) struct ScriptedEngine {
        available: AtomicBool,
        start_error: Option<EngineError>,
        script: Vec<EngineEvent>,
        starts: AtomicUsize,
        stops: AtomicUsize,
        last_config: Mutex<Option<RecognitionConfig>>,
        sender: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
    }

    impl ScriptedEngine {
        pub(crate) fn new(script: Vec<EngineEvent>) -> Self {
            Self {
                available: AtomicBool::new(true),
                start_error: None,
                script,
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                last_config: Mutex::new(None),
                sender: Mutex::new(None),
            }
        }

        pub(crate) fn failing(error: EngineError) -> Self {
            Self {
                start_error: Some(error),
                ..Self::new(Vec::new())
            }
        }

        pub(crate) fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        pub(crate) fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        pub(crate) fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        pub(crate) fn last_config(&self) -> Option<RecognitionConfig> {
            self.last_config.lock().unwrap().clone()
        }

        /// Push an event as if the engine fired it late
        pub(crate) fn fire(&self, event: EngineEvent) -> bool {
            match self.sender.lock().unwrap().as_ref() {
                Some(tx) => tx.send(event).is_ok(),
                None => false,
            }
        }
    }

    impl SpeechEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn start(
            &self,
            config: &RecognitionConfig,
            events: mpsc::UnboundedSender<EngineEvent>,
        ) -> Result<(), EngineError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.last_config.lock().unwrap() = Some(config.clone());
            if let Some(err) = &self.start_error {
                return Err(err.clone());
            }
            for event in &self.script {
                let _ = events.send(event.clone());
            }
            *self.sender.lock().unwrap() = Some(events);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::adapter::SessionEvent;

    #[test]
    fn test_single_shot_config() {
        let config = RecognitionConfig::single_shot("id-ID");
        assert_eq!(config.locale, "id-ID");
        assert!(!config.interim_results);
        assert!(!config.continuous);
        assert_eq!(config.max_alternatives, 1);
    }

    #[tokio::test]
    async fn test_pump_keeps_first_alternative_only() {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = AdapterSink::new(3, tx);

        engine_tx
            .send(EngineEvent::Result {
                alternatives: vec!["cara ganti oli".into(), "cara ganti roda".into()],
            })
            .unwrap();
        engine_tx.send(EngineEvent::End).unwrap();

        spawn_pump(engine_rx, sink, str::to_string).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent { session: 3, event: AdapterEvent::Result("cara ganti oli".into()) }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pump_ends_session_when_engine_goes_away() {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(engine_tx);

        spawn_pump(engine_rx, AdapterSink::new(1, tx), str::to_string)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().event, AdapterEvent::End);
    }

    #[test]
    fn test_engine_error_messages() {
        assert_eq!(EngineError::PermissionDenied.to_string(), "permission denied");
        assert_eq!(EngineError::Failed("mic busy".into()).to_string(), "mic busy");
    }
}
