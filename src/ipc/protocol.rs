//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;
use crate::events::VoiceEvent;
use crate::state::{VoiceMode, VoiceState};

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Push voice events to this connection
    Subscribe,

    Init,
    Start,
    Stop,
    Toggle,
    Pause,
    Resume,

    /// Narrate text, suspending capture while it plays
    Speak { text: String },

    StopSpeaking,

    SetMode { mode: VoiceMode },

    /// Typed input, handled like a final transcript
    SubmitText { text: String },

    /// Current UI location, forwarded to the command sink
    SetLocation {
        #[serde(default)]
        location: Option<String>,
    },
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Control request accepted
    Ack,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<ArbiterError> for Response {
    fn from(error: ArbiterError) -> Self {
        let code = match error {
            ArbiterError::Closed => "closed",
            ArbiterError::Unsupported => "unsupported",
        };
        Self::error(code, error.to_string())
    }
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: VoiceEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub state: VoiceState,

    pub mode: VoiceMode,

    /// Whether the last caller request was to keep listening
    pub listening_requested: bool,

    /// Registered voice subscribers, IPC clients included
    pub subscribers: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: VoiceState::default(),
            mode: VoiceMode::default(),
            listening_requested: false,
            subscribers: 0,
            uptime_secs: 0,
        }
    }
}
