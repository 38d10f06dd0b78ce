use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Externally visible arbitrator state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceState {
    /// Nothing captured, nothing narrated
    #[default]
    Idle,
    /// A capture session is live
    Listening,
    /// A final transcript is with the command sink
    Processing,
    /// Narration in progress; capture is suspended
    Speaking,
    /// Capture suspended, waiting on a settle delay or a wake hold
    Paused,
    /// Unrecoverable capture failure; cleared by `init`
    Error,
}

impl std::fmt::Display for VoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VoiceState::Idle => "idle",
            VoiceState::Listening => "listening",
            VoiceState::Processing => "processing",
            VoiceState::Speaking => "speaking",
            VoiceState::Paused => "paused",
            VoiceState::Error => "error",
        };
        f.write_str(name)
    }
}

/// How transcripts are gathered and answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    /// Voice in, no narrated replies
    #[default]
    Interactive,
    /// Voice in, sink replies narrated back
    Talkative,
    /// Typed input only; capture stays off
    Text,
}

impl std::fmt::Display for VoiceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VoiceMode::Interactive => "interactive",
            VoiceMode::Talkative => "talkative",
            VoiceMode::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown voice mode {0:?}")]
pub struct ParseModeError(String);

impl FromStr for VoiceMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "talkative" => Ok(Self::Talkative),
            "text" => Ok(Self::Text),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_names() {
        assert_eq!(serde_json::to_string(&VoiceState::Listening).unwrap(), "\"listening\"");
        assert_eq!(VoiceState::Paused.to_string(), "paused");
        assert_eq!(VoiceState::default(), VoiceState::Idle);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(" Talkative ".parse::<VoiceMode>().unwrap(), VoiceMode::Talkative);
        assert_eq!("text".parse::<VoiceMode>().unwrap(), VoiceMode::Text);
        assert!("loud".parse::<VoiceMode>().is_err());
        assert_eq!(VoiceMode::default(), VoiceMode::Interactive);
    }
}
