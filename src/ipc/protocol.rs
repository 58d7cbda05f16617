//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::VoiceEvent;
use crate::session::SessionStatus;

/// Largest frame either side accepts
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current voice status
    GetStatus,

    /// Begin a voice session
    Start,

    /// Cancel the running voice session
    Stop,

    /// Enable or disable voice input
    SetEnabled { enabled: bool },

    /// Ping to check connectivity
    Ping,

    /// Subscribe to voice event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current voice status
    Status(VoiceStatus),

    /// Command handed to the session controller
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Voice event occurred
    Voice { event: VoiceEvent },
}

/// Full status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Session controller view, inlined into the status object
    #[serde(flatten)]
    pub session: SessionStatus,
}

impl VoiceStatus {
    pub fn new(session: SessionStatus, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            session,
        }
    }
}
