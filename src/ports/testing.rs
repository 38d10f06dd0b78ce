//! Scriptable engines for exercising the arbitrator in tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::input::{CaptureError, InputEvents, SessionId, SpeechInput};
use super::output::{NarrationError, OutputEvents, SpeechOutput, UtteranceId};
use super::sink::{CommandRequest, CommandResponse, CommandSink, SinkError};

/// A call made by the arbitrator into one of the engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    CaptureStart(SessionId),
    CaptureStop,
    Speak(UtteranceId, String),
    CancelNarration,
}

#[derive(Default)]
struct Engines {
    calls: Vec<PortCall>,
    input_events: Option<InputEvents>,
    output_events: Option<OutputEvents>,
    session: Option<SessionId>,
    utterance: Option<UtteranceId>,
    unavailable: bool,
    start_error: Option<CaptureError>,
    speak_error: Option<NarrationError>,
}

/// Shared view of both fake engines; injects events as if they came from them
#[derive(Clone, Default)]
pub struct Rig {
    engines: Arc<Mutex<Engines>>,
}

impl Rig {
    pub fn new() -> (Self, FakeInput, FakeOutput) {
        let rig = Self::default();
        let input = FakeInput { rig: rig.clone() };
        let output = FakeOutput { rig: rig.clone() };
        (rig, input, output)
    }

    pub fn calls(&self) -> Vec<PortCall> {
        self.engines.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.engines.lock().calls.clear();
    }

    /// Number of capture sessions started so far
    pub fn starts(&self) -> usize {
        self.engines
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, PortCall::CaptureStart(_)))
            .count()
    }

    /// Most recently started capture session
    pub fn session(&self) -> Option<SessionId> {
        self.engines.lock().session
    }

    /// Most recently requested utterance
    pub fn utterance(&self) -> Option<UtteranceId> {
        self.engines.lock().utterance
    }

    pub fn set_unavailable(&self) {
        self.engines.lock().unavailable = true;
    }

    pub fn set_available(&self) {
        self.engines.lock().unavailable = false;
    }

    /// Make the next `start` fail
    pub fn fail_next_start(&self, error: CaptureError) {
        self.engines.lock().start_error = Some(error);
    }

    /// Make the next `speak` fail
    pub fn fail_next_speak(&self, error: NarrationError) {
        self.engines.lock().speak_error = Some(error);
    }

    fn input(&self) -> (InputEvents, SessionId) {
        let engines = self.engines.lock();
        let events = engines.input_events.clone().expect("input not bound");
        let session = engines.session.expect("no capture session started");
        (events, session)
    }

    fn output(&self) -> (OutputEvents, UtteranceId) {
        let engines = self.engines.lock();
        let events = engines.output_events.clone().expect("output not bound");
        let utterance = engines.utterance.expect("nothing narrated yet");
        (events, utterance)
    }

    pub fn final_result(&self, text: &str) {
        let (events, session) = self.input();
        events.result(session, text, true);
    }

    pub fn interim(&self, text: &str) {
        let (events, session) = self.input();
        events.result(session, text, false);
    }

    pub fn capture_error(&self, error: CaptureError) {
        let (events, session) = self.input();
        events.error(session, error);
    }

    pub fn end_capture(&self) {
        let (events, session) = self.input();
        events.end(session);
    }

    /// Emit an End for a specific (possibly stale) session
    pub fn end_session(&self, session: SessionId) {
        let (events, _) = self.input();
        events.end(session);
    }

    pub fn narration_ended(&self) {
        let (events, utterance) = self.output();
        events.ended(utterance);
    }

    pub fn narration_failed(&self) {
        let (events, utterance) = self.output();
        events.failed(utterance, NarrationError::Engine("device lost".to_string()));
    }

    /// Emit an Ended for a specific (possibly superseded) utterance
    pub fn end_utterance(&self, utterance: UtteranceId) {
        let (events, _) = self.output();
        events.ended(utterance);
    }
}

pub struct FakeInput {
    rig: Rig,
}

impl SpeechInput for FakeInput {
    fn bind(&mut self, events: InputEvents) {
        self.rig.engines.lock().input_events = Some(events);
    }

    fn is_available(&self) -> bool {
        !self.rig.engines.lock().unavailable
    }

    fn start(&mut self, session: SessionId) -> Result<(), CaptureError> {
        let mut engines = self.rig.engines.lock();
        if let Some(error) = engines.start_error.take() {
            return Err(error);
        }
        engines.calls.push(PortCall::CaptureStart(session));
        engines.session = Some(session);
        Ok(())
    }

    fn stop(&mut self) {
        self.rig.engines.lock().calls.push(PortCall::CaptureStop);
    }
}

pub struct FakeOutput {
    rig: Rig,
}

impl SpeechOutput for FakeOutput {
    fn bind(&mut self, events: OutputEvents) {
        self.rig.engines.lock().output_events = Some(events);
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), NarrationError> {
        let mut engines = self.rig.engines.lock();
        if let Some(error) = engines.speak_error.take() {
            return Err(error);
        }
        engines.calls.push(PortCall::Speak(utterance, text.to_string()));
        engines.utterance = Some(utterance);
        if let Some(events) = &engines.output_events {
            events.started(utterance);
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.rig.engines.lock().calls.push(PortCall::CancelNarration);
    }
}

#[derive(Clone)]
enum Script {
    Reply(CommandResponse),
    Fail(String),
    Silent,
}

/// Command sink with a canned answer that records what it was sent
#[derive(Clone)]
pub struct ScriptedSink {
    script: Script,
    requests: Arc<Mutex<Vec<CommandRequest>>>,
}

impl ScriptedSink {
    pub fn replying(text: &str) -> Self {
        Self::with(Script::Reply(CommandResponse::text(text)))
    }

    pub fn empty() -> Self {
        Self::with(Script::Reply(CommandResponse::default()))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with(Script::Fail(reason.to_string()))
    }

    /// Never answers
    pub fn silent() -> Self {
        Self::with(Script::Silent)
    }

    fn with(script: Script) -> Self {
        Self {
            script,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CommandSink for ScriptedSink {
    async fn dispatch(&self, request: CommandRequest) -> Result<CommandResponse, SinkError> {
        self.requests.lock().push(request);
        match &self.script {
            Script::Reply(response) => Ok(response.clone()),
            Script::Fail(reason) => Err(SinkError::Rejected(reason.clone())),
            Script::Silent => std::future::pending().await,
        }
    }
}
