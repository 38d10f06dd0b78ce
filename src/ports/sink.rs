//! Command sink: where final transcripts go

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::extract::speakable_phone;
use crate::state::VoiceMode;

/// Caller context attached to every dispatched transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Current UI location (page route), if the UI reported one
    pub location: Option<String>,
    /// Who is talking (e.g. "user", "boss")
    pub user_type: String,
    /// Mode at dispatch time
    pub mode: VoiceMode,
}

/// A final transcript handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Transcript as recognized
    pub transcript: String,
    /// Trimmed, lower-cased transcript
    pub command: String,
    /// Digits extracted from the transcript, if any
    pub digits: Option<String>,
    pub context: CommandContext,
}

/// What the sink answered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Text to narrate back in talkative mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narratable_text: Option<String>,
    /// Opaque payload surfaced to subscribers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            narratable_text: Some(text.into()),
            data: None,
        }
    }

    /// Narratable text, if present and not blank
    pub fn narration(&self) -> Option<&str> {
        self.narratable_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Dispatch failures; never fatal to the voice session
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("command sink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("command sink answered with status {0}")]
    Status(u16),

    #[error("command sink rejected transcript: {0}")]
    Rejected(String),
}

/// Receives final transcripts from the arbitrator
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn dispatch(&self, request: CommandRequest) -> Result<CommandResponse, SinkError>;
}

/// Sink that narrates the transcript back; used when no endpoint is configured
#[derive(Debug, Default, Clone)]
pub struct EchoSink;

#[async_trait]
impl CommandSink for EchoSink {
    async fn dispatch(&self, request: CommandRequest) -> Result<CommandResponse, SinkError> {
        let text = match &request.digits {
            Some(digits) => format!("I heard {}", speakable_phone(digits)),
            None => format!("You said: {}", request.transcript),
        };
        Ok(CommandResponse {
            narratable_text: Some(text),
            data: Some(json!({ "command": request.command })),
        })
    }
}

/// Sink that POSTs transcripts to a backend as JSON
#[derive(Debug, Clone)]
pub struct HttpCommandSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpCommandSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// JSON body sent to the backend
fn request_body(request: &CommandRequest) -> Value {
    json!({
        "raw_transcript": request.transcript,
        "command": request.command,
        "digits": request.digits,
        "user_type": request.context.user_type,
        "page_route": request.context.location,
        "mode": request.context.mode,
    })
}

/// Pull the narratable text out of a backend reply
///
/// Backends answer with either `tts_response.text` or `response.text`;
/// the whole body is kept as data.
fn response_from_json(body: Value) -> CommandResponse {
    let narratable_text = ["/tts_response/text", "/response/text"]
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .map(str::to_owned);

    CommandResponse {
        narratable_text,
        data: Some(body),
    }
}

#[async_trait]
impl CommandSink for HttpCommandSink {
    async fn dispatch(&self, request: CommandRequest) -> Result<CommandResponse, SinkError> {
        debug!(endpoint = %self.endpoint, "posting transcript");

        let reply = self
            .client
            .post(&self.endpoint)
            .json(&request_body(&request))
            .send()
            .await?;

        let status = reply.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        let body: Value = reply.json().await?;
        Ok(response_from_json(body))
    }
}
