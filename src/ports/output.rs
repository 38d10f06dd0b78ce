//! Speech output port: turn-based narration

use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one narration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "utterance-{}", self.0)
    }
}

/// Errors reported by a narration engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrationError {
    #[error("narration engine unavailable")]
    Unavailable,

    #[error("narration interrupted")]
    Interrupted,

    #[error("narration failed: {0}")]
    Engine(String),
}

/// Notifications from a narration engine
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Started { utterance: UtteranceId },
    Ended { utterance: UtteranceId },
    Failed {
        utterance: UtteranceId,
        error: NarrationError,
    },
}

impl OutputEvent {
    pub fn utterance(&self) -> UtteranceId {
        match self {
            Self::Started { utterance } | Self::Ended { utterance } | Self::Failed { utterance, .. } => *utterance,
        }
    }
}

/// Sender handed to a [`SpeechOutput`] when it is bound to the arbitrator
#[derive(Debug, Clone)]
pub struct OutputEvents {
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl OutputEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<OutputEvent>) -> Self {
        Self { tx }
    }

    pub fn started(&self, utterance: UtteranceId) {
        self.send(OutputEvent::Started { utterance });
    }

    pub fn ended(&self, utterance: UtteranceId) {
        self.send(OutputEvent::Ended { utterance });
    }

    pub fn failed(&self, utterance: UtteranceId, error: NarrationError) {
        self.send(OutputEvent::Failed { utterance, error });
    }

    fn send(&self, event: OutputEvent) {
        if self.tx.send(event).is_err() {
            debug!("arbiter stopped, dropping narration event");
        }
    }
}

/// Narration engine driven by the arbitrator
pub trait SpeechOutput: Send {
    /// Attach the event sender; called once before any other method
    fn bind(&mut self, events: OutputEvents);

    /// Begin narrating `text`; completion is reported through the bound events
    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), NarrationError>;

    /// Silence any in-flight narration
    fn cancel(&mut self);
}
