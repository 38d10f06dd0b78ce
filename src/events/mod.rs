//! Events published to voice subscribers
//!
//! Every subscriber sees the same ordered stream. A new subscriber first
//! receives the current state, then everything published after it joined.

use serde::{Deserialize, Serialize};

use crate::ports::CommandResponse;
use crate::state::{VoiceMode, VoiceState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// The arbitrator moved to a new state
    StateChanged { state: VoiceState },

    ModeChanged { mode: VoiceMode },

    /// Interim or final recognition result
    Transcript { text: String, is_final: bool },

    /// Digits pulled out of a final transcript
    Digits {
        digits: String,
        /// Display form, e.g. `555-123-4567`
        formatted: String,
    },

    /// What the command sink answered
    Response { response: CommandResponse },

    /// Fatal capture errors and failed dispatches
    Error { message: String },
}

impl std::fmt::Display for VoiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceEvent::StateChanged { state } => write!(f, "STATE_CHANGED ({state})"),
            VoiceEvent::ModeChanged { mode } => write!(f, "MODE_CHANGED ({mode})"),
            VoiceEvent::Transcript { text, is_final: true } => write!(f, "TRANSCRIPT {text:?}"),
            VoiceEvent::Transcript { text, is_final: false } => write!(f, "INTERIM {text:?}"),
            VoiceEvent::Digits { formatted, .. } => write!(f, "DIGITS {formatted}"),
            VoiceEvent::Response { response } => match response.narration() {
                Some(text) => write!(f, "RESPONSE {text:?}"),
                None => write!(f, "RESPONSE"),
            },
            VoiceEvent::Error { message } => write!(f, "ERROR {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = VoiceEvent::StateChanged {
            state: VoiceState::Speaking,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"state_changed","state":"speaking"}"#);
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"transcript","text":"open cart","is_final":true}"#;
        let event: VoiceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            VoiceEvent::Transcript {
                text: "open cart".to_string(),
                is_final: true
            }
        );
    }

    #[test]
    fn test_response_event_shape() {
        let event = VoiceEvent::Response {
            response: CommandResponse::text("Done"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "response");
        assert_eq!(value["response"]["narratable_text"], "Done");
    }

    #[test]
    fn test_display() {
        let event = VoiceEvent::Digits {
            digits: "5551234567".to_string(),
            formatted: "555-123-4567".to_string(),
        };
        assert_eq!(event.to_string(), "DIGITS 555-123-4567");
        assert_eq!(
            VoiceEvent::ModeChanged { mode: VoiceMode::Text }.to_string(),
            "MODE_CHANGED (text)"
        );
    }
}
