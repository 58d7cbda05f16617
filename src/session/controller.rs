//! Voice session controller
//!
//! Owns the session state and the single active adapter. Start and stop
//! requests arrive as [`Command`]s, adapter reports arrive as
//! [`SessionEvent`]s, and both are handled one at a time on the task
//! running [`SessionController::run`].

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::backend::{
    select_backend, AdapterEvent, AdapterFactory, AdapterSink, BackendAdapter, BackendKind,
    SessionEvent, LOCALE,
};
use crate::events::VoiceEvent;

use super::state::{normalize_error, SessionState, STATUS_UNAVAILABLE};

/// Requests the controller accepts from the outside
#[derive(Debug)]
pub enum Command {
    Start,
    Stop,
    SetEnabled(bool),
    Status(oneshot::Sender<SessionStatus>),
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: String,
    pub status_text: String,
    pub is_listening: bool,
    pub enabled: bool,
    /// Backend of the running session
    pub backend: Option<BackendKind>,
    /// Milliseconds since the running session started
    pub elapsed_ms: Option<u64>,
    /// Sessions started since the daemon came up
    pub sessions: u64,
}

struct ActiveSession {
    id: u64,
    adapter: Box<dyn BackendAdapter>,
}

/// State machine driving one voice session at a time
pub struct SessionController {
    state: SessionState,
    enabled: bool,
    /// Last listening flag sent to subscribers
    is_listening: bool,
    /// Last status text sent to subscribers
    last_status: String,
    active: Option<ActiveSession>,
    /// Id of the most recently created session
    last_session: u64,
    factory: AdapterFactory,
    adapter_tx: mpsc::UnboundedSender<SessionEvent>,
    adapter_rx: mpsc::UnboundedReceiver<SessionEvent>,
    event_tx: broadcast::Sender<VoiceEvent>,
}

impl SessionController {
    /// Create an idle controller
    pub fn new(
        factory: AdapterFactory,
        enabled: bool,
        event_tx: broadcast::Sender<VoiceEvent>,
    ) -> Self {
        let (adapter_tx, adapter_rx) = mpsc::unbounded_channel();
        let mut controller = Self {
            state: SessionState::Idle,
            enabled,
            is_listening: false,
            last_status: String::new(),
            active: None,
            last_session: 0,
            factory,
            adapter_tx,
            adapter_rx,
            event_tx,
        };
        controller.last_status = controller.status_text().to_string();
        controller
    }

    /// Get the current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_listening(&self) -> bool {
        self.is_listening
    }

    /// Number of sessions (and adapters) created so far
    pub fn sessions_started(&self) -> u64 {
        self.last_session
    }

    /// Backend serving the running session
    pub fn backend(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|active| active.adapter.kind())
    }

    /// Text a display should show right now
    pub fn status_text(&self) -> &str {
        if self.enabled {
            self.state.status_text()
        } else {
            STATUS_UNAVAILABLE
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state.name().to_string(),
            status_text: self.status_text().to_string(),
            is_listening: self.is_listening(),
            enabled: self.enabled,
            sessions: self.sessions_started(),
            backend: self.backend(),
            elapsed_ms: self
                .state
                .started_at()
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }

    /// Run the controller until the command channel closes
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        info!(enabled = self.enabled, "session controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.adapter_rx.recv() => {
                    self.handle_adapter_event(event);
                }
            }
        }

        self.stop();
        info!("session controller stopped");
    }

    /// Apply a single command
    pub fn handle_command(&mut self, command: Command) {
        debug!(?command, "command received");
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::SetEnabled(enabled) => self.set_enabled(enabled),
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Begin a session on the backend the runtime supports right now
    pub fn start(&mut self) {
        if !self.enabled {
            debug!("start ignored: voice input disabled");
            return;
        }
        if self.state.is_active() {
            debug!(state = %self.state, "start ignored: session already active");
            return;
        }

        let env = self.factory.detect();
        let kind = select_backend(&env);
        let mut adapter = self.factory.create(kind);

        self.last_session += 1;
        let session = self.last_session;

        info!(
            session,
            backend = %kind,
            platform = ?env.platform,
            browser_speech = env.browser_speech,
            "starting voice session"
        );

        if let Err(e) = adapter.start(LOCALE, AdapterSink::new(session, self.adapter_tx.clone())) {
            warn!(?e, session, "adapter refused to start");
            self.transition_to(SessionState::Error {
                message: normalize_error(&e.to_string()),
            });
            return;
        }

        self.active = Some(ActiveSession { id: session, adapter });
        self.transition_to(SessionState::Listening {
            started_at: Instant::now(),
        });
    }

    /// Cancel the running session; nothing happens when idle
    pub fn stop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.adapter.stop();
            info!(session = active.id, "voice session stopped");
        }

        if self.state == SessionState::Idle {
            debug!("stop ignored: already idle");
            return;
        }

        self.transition_to(SessionState::Idle);
    }

    /// Toggle voice input; disabling ends a running session
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }

        info!(enabled, "voice input availability changed");
        self.enabled = enabled;
        if !enabled && self.state.is_active() {
            self.stop();
        }
        self.publish_status();
    }

    /// Apply an adapter report. Reports from any session other than the
    /// running one are dropped.
    pub fn handle_adapter_event(&mut self, event: SessionEvent) {
        let SessionEvent { session, event } = event;
        let current = self.active.as_ref().map(|active| active.id);
        if current != Some(session) {
            debug!(session, ?current, ?event, "ignoring event for inactive session");
            return;
        }

        match event {
            AdapterEvent::PhaseChange => match self.state {
                SessionState::Listening { started_at } => {
                    self.transition_to(SessionState::Processing { started_at });
                }
                _ => debug!(state = %self.state, "phase change ignored"),
            },
            AdapterEvent::Result(text) => {
                self.finish_session(SessionState::Idle);

                let text = text.trim();
                if text.is_empty() {
                    debug!(session, "session ended with an empty transcript");
                } else {
                    info!(session, chars = text.chars().count(), "voice result ready");
                    self.emit(VoiceEvent::VoiceResult {
                        text: text.to_string(),
                    });
                }
            }
            AdapterEvent::End => {
                debug!(session, "backend ended without a result");
                self.finish_session(SessionState::Idle);
            }
            AdapterEvent::Error(detail) => {
                warn!(session, %detail, "voice session failed");
                self.finish_session(SessionState::Error {
                    message: normalize_error(&detail),
                });
            }
        }
    }

    fn finish_session(&mut self, next: SessionState) {
        if let Some(mut active) = self.active.take() {
            active.adapter.stop();
        }
        self.transition_to(next);
    }

    fn transition_to(&mut self, new_state: SessionState) {
        info!(from = %self.state, to = %new_state, "session transition");

        self.state = new_state;
        self.set_listening(self.state.is_active());
        self.publish_status();
    }

    fn set_listening(&mut self, is_listening: bool) {
        if self.is_listening != is_listening {
            self.is_listening = is_listening;
            self.emit(VoiceEvent::ListeningChanged { is_listening });
        }
    }

    fn publish_status(&mut self) {
        if self.status_text() != self.last_status {
            self.last_status = self.status_text().to_string();
            self.emit(VoiceEvent::StatusChanged {
                status: self.last_status.clone(),
            });
        }
    }

    fn emit(&self, event: VoiceEvent) {
        debug!(%event, "emitting voice event");
        let _ = self.event_tx.send(event);
    }
}
