//! Events pushed to voice-input subscribers
//!
//! The UI renders from these: a listening flag for the button and
//! animation, status text for the label, and the final transcript.

use serde::{Deserialize, Serialize};

/// Events emitted by the session controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Crossed the idle/active boundary
    ListeningChanged {
        is_listening: bool,
    },

    /// Final non-empty transcript of a session
    VoiceResult {
        text: String,
    },

    /// Display text changed
    StatusChanged {
        status: String,
    },
}

impl std::fmt::Display for VoiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceEvent::ListeningChanged { is_listening } => {
                write!(f, "LISTENING_CHANGED ({})", is_listening)
            }
            VoiceEvent::VoiceResult { text } => {
                write!(f, "VOICE_RESULT ({} chars)", text.chars().count())
            }
            VoiceEvent::StatusChanged { status } => write!(f, "STATUS_CHANGED ({})", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = VoiceEvent::ListeningChanged { is_listening: true };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("listening_changed"));
        assert!(json.contains("\"is_listening\":true"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"voice_result","text":"cara check aki mobil"}"#;
        let event: VoiceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            VoiceEvent::VoiceResult { text: "cara check aki mobil".into() }
        );
    }
}
