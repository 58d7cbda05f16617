//! Session states and the status text shown for them

use std::time::Instant;

/// Status shown while idle
pub const STATUS_IDLE: &str = "Tekan untuk berbicara";
/// Status shown while listening
pub const STATUS_LISTENING: &str = "Mendengarkan...";
/// Status shown while the simulated backend "processes"
pub const STATUS_PROCESSING: &str = "Memproses...";
/// Status shown whenever voice input is disabled
pub const STATUS_UNAVAILABLE: &str = "Input suara tidak tersedia";

/// Prefix every surfaced backend error carries
pub const ERROR_PREFIX: &str = "Voice error: ";

/// Where the current voice session stands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session, waiting for a start request
    #[default]
    Idle,
    /// A backend is capturing speech
    Listening { started_at: Instant },
    /// Capture finished, waiting for the transcript (simulated backend only)
    Processing { started_at: Instant },
    /// The last session failed; holds the normalized message
    Error { message: String },
}

impl SessionState {
    /// A session is running (listening or processing)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Listening { .. } | SessionState::Processing { .. }
        )
    }

    /// When the running session started
    pub fn started_at(&self) -> Option<Instant> {
        match self {
            SessionState::Listening { started_at } | SessionState::Processing { started_at } => {
                Some(*started_at)
            }
            _ => None,
        }
    }

    /// Text a display should show for this state
    pub fn status_text(&self) -> &str {
        match self {
            SessionState::Idle => STATUS_IDLE,
            SessionState::Listening { .. } => STATUS_LISTENING,
            SessionState::Processing { .. } => STATUS_PROCESSING,
            SessionState::Error { message } => message,
        }
    }

    /// Short lowercase name for logs and status snapshots
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening { .. } => "listening",
            SessionState::Processing { .. } => "processing",
            SessionState::Error { .. } => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Format a backend failure the way the UI expects it
pub fn normalize_error(detail: &str) -> String {
    format!("{ERROR_PREFIX}{detail}")
}
