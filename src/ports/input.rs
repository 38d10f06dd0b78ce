//! Speech input port: streaming recognition sessions

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one capture session requested by the arbitrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "capture-{}", self.0)
    }
}

/// How the arbitrator reacts to a capture error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Normal engine noise; swallowed without a transition
    Harmless,
    /// Logged; the end/restart path recovers
    Transient,
    /// Ends the session and moves the arbitrator to `error`
    Fatal,
}

/// Error kinds reported by a recognition engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureError {
    #[error("no speech detected")]
    NoSpeech,

    #[error("capture session aborted")]
    Aborted,

    #[error("microphone access denied")]
    PermissionDenied,

    #[error("speech service not allowed")]
    ServiceNotAllowed,

    #[error("no microphone available")]
    AudioCapture,

    #[error("speech service unreachable")]
    Network,

    #[error("capture session already started")]
    AlreadyStarted,

    #[error("speech recognition not supported")]
    Unsupported,

    #[error("speech recognition error: {0}")]
    Other(String),
}

impl CaptureError {
    /// Parse the error code emitted by a recognition engine
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "not-allowed" => Self::PermissionDenied,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "already-started" => Self::AlreadyStarted,
            "not-supported" | "unsupported" => Self::Unsupported,
            other => Self::Other(other.to_string()),
        }
    }

    /// Engine code for this error kind
    pub fn code(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Aborted => "aborted",
            Self::PermissionDenied => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::AudioCapture => "audio-capture",
            Self::Network => "network",
            Self::AlreadyStarted => "already-started",
            Self::Unsupported => "not-supported",
            Self::Other(code) => code,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NoSpeech | Self::Aborted | Self::AlreadyStarted => Severity::Harmless,
            Self::PermissionDenied | Self::ServiceNotAllowed | Self::Unsupported => Severity::Fatal,
            Self::AudioCapture | Self::Network | Self::Other(_) => Severity::Transient,
        }
    }
}

/// Notifications from a recognition engine
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Interim or final recognition result
    Result {
        session: SessionId,
        text: String,
        is_final: bool,
    },
    /// Engine-reported error
    Error {
        session: SessionId,
        error: CaptureError,
    },
    /// Session ended, either on request or on the engine's own initiative
    End { session: SessionId },
}

impl InputEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Result { session, .. } | Self::Error { session, .. } | Self::End { session } => *session,
        }
    }
}

/// Sender handed to a [`SpeechInput`] when it is bound to the arbitrator
///
/// Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct InputEvents {
    tx: mpsc::UnboundedSender<InputEvent>,
}

impl InputEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<InputEvent>) -> Self {
        Self { tx }
    }

    pub fn result(&self, session: SessionId, text: impl Into<String>, is_final: bool) {
        self.send(InputEvent::Result {
            session,
            text: text.into(),
            is_final,
        });
    }

    pub fn error(&self, session: SessionId, error: CaptureError) {
        self.send(InputEvent::Error { session, error });
    }

    pub fn end(&self, session: SessionId) {
        self.send(InputEvent::End { session });
    }

    fn send(&self, event: InputEvent) {
        if self.tx.send(event).is_err() {
            debug!("arbiter stopped, dropping capture event");
        }
    }
}

/// Streaming recognition engine driven by the arbitrator
///
/// `start` may be followed by `End` at any time, including immediately.
pub trait SpeechInput: Send {
    /// Attach the event sender; called once before any other method
    fn bind(&mut self, events: InputEvents);

    /// Whether the engine exists at all on this platform
    fn is_available(&self) -> bool {
        true
    }

    /// Begin a capture session tagged with `session`
    fn start(&mut self, session: SessionId) -> Result<(), CaptureError>;

    /// Request termination of the live session
    fn stop(&mut self);
}
