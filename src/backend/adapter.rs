//! Backend adapter contract
//!
//! Every recognition backend is driven through [`BackendAdapter`] and reports
//! back through an [`AdapterSink`]. A sink belongs to exactly one session and
//! stops delivering once that session has seen its terminal event or has been
//! stopped, so late engine callbacks never reach the controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Which kind of backend serves a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Browser-hosted recognition engine
    Browser,
    /// Device-level speech engine
    Native,
    /// Timed fallback used when no real engine exists
    Simulated,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Browser => write!(f, "browser"),
            BackendKind::Native => write!(f, "native"),
            BackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// Events an adapter reports for its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Internal phase moved from listening to processing (simulated only)
    PhaseChange,
    /// Terminal: top transcript, possibly empty
    Result(String),
    /// Terminal: backend failure with a human-readable reason
    Error(String),
    /// Terminal: engine finished without producing a result
    End,
}

impl AdapterEvent {
    /// Whether this event ends the session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AdapterEvent::PhaseChange)
    }
}

/// An adapter event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: u64,
    pub event: AdapterEvent,
}

/// Errors returned synchronously by [`BackendAdapter::start`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("{0} adapter already has an active session")]
    AlreadyActive(BackendKind),
}

/// Delivery handle from an adapter to the session controller
#[derive(Debug, Clone)]
pub struct AdapterSink {
    session: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
    open: Arc<AtomicBool>,
}

impl AdapterSink {
    /// Create a sink for the given session id
    pub fn new(session: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            session,
            tx,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Session this sink delivers for
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Whether events are still delivered
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Stop delivering; anything emitted afterwards is dropped
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Deliver an event. Terminal events close the sink, so only the first
    /// one per session gets through.
    ///
    /// Returns `true` if the event was handed to the controller.
    pub fn emit(&self, event: AdapterEvent) -> bool {
        let open = if event.is_terminal() {
            self.open.swap(false, Ordering::SeqCst)
        } else {
            self.open.load(Ordering::SeqCst)
        };

        if !open {
            debug!(session = self.session, ?event, "discarding event from closed session");
            return false;
        }

        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Uniform contract over browser, native, and simulated recognition
///
/// `start` returns an error only when the same instance already runs a
/// session. Every other failure is delivered as [`AdapterEvent::Error`]
/// through the sink. `stop` is idempotent and emits nothing.
pub trait BackendAdapter: Send {
    /// Backend this adapter represents
    fn kind(&self) -> BackendKind;

    /// Begin a session for `locale`, reporting through `sink`
    fn start(&mut self, locale: &str, sink: AdapterSink) -> Result<(), AdapterError>;

    /// Cancel the running session, if any
    fn stop(&mut self);

    /// Whether a started session has not yet been stopped
    fn is_active(&self) -> bool;
}
