//! Voice arbitrator state machine
//!
//! Owns the capture and narration engines and sequences every request to
//! them. All inputs (caller commands, engine notifications, dispatch
//! completions, timer expiries) are handled one at a time from a single
//! loop, so no two handlers ever interleave.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::handle::{Command, Shared, VoiceHandle};
use super::timer::{expiry, TimerSlot};
use super::types::{VoiceMode, VoiceState};
use crate::config::VoiceConfig;
use crate::error::{ArbiterError, ArbiterResult};
use crate::events::VoiceEvent;
use crate::extract::{extract_digits, format_phone_number, normalize_command, WakePhrases};
use crate::ports::{
    CaptureError, CommandContext, CommandRequest, CommandResponse, CommandSink, InputEvent, InputEvents,
    OutputEvent, OutputEvents, SessionId, Severity, SinkError, SpeechInput, SpeechOutput, UtteranceId,
};

/// The narration currently in flight
#[derive(Debug)]
struct Utterance {
    id: UtteranceId,
    started_at: Instant,
}

/// A finished command sink call
#[derive(Debug)]
struct Dispatched {
    seq: u64,
    outcome: Result<CommandResponse, SinkError>,
}

#[derive(Debug)]
enum Message {
    Command(Command),
    Input(InputEvent),
    Output(OutputEvent),
    Dispatched(Dispatched),
    RestartDue,
    WakeExpired,
}

/// The voice arbitrator
///
/// Construct with [`Arbiter::new`], drive with [`Arbiter::run`], and talk
/// to it through the returned [`VoiceHandle`].
pub struct Arbiter {
    config: VoiceConfig,
    wake_phrases: WakePhrases,
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    sink: Arc<dyn CommandSink>,
    shared: Arc<Shared>,

    commands: mpsc::UnboundedReceiver<Command>,
    input_rx: mpsc::UnboundedReceiver<InputEvent>,
    output_rx: mpsc::UnboundedReceiver<OutputEvent>,
    dispatch_tx: mpsc::UnboundedSender<Dispatched>,
    dispatch_rx: mpsc::UnboundedReceiver<Dispatched>,

    state: VoiceState,
    state_entered_at: Instant,
    mode: VoiceMode,
    /// Caller intent; capture is only ever (re)started while this holds
    should_be_listening: bool,
    initialized: bool,
    paused_by_caller: bool,

    /// Live capture session, if any
    capture: Option<SessionId>,
    next_session: u64,
    utterance: Option<Utterance>,
    next_utterance: u64,

    /// Session-end debounce and resume settle share this slot
    restart: TimerSlot,
    /// Hold placed by a wake phrase
    wake: TimerSlot,

    last_transcript: Option<(String, bool)>,
    location: Option<String>,
    dispatch_seq: u64,
    /// Sequence number of the dispatch still awaiting an answer
    in_flight: Option<u64>,
}

impl Arbiter {
    pub fn new(
        config: VoiceConfig,
        input: impl SpeechInput + 'static,
        output: impl SpeechOutput + 'static,
        sink: Arc<dyn CommandSink>,
    ) -> (Self, VoiceHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let mut input: Box<dyn SpeechInput> = Box::new(input);
        let mut output: Box<dyn SpeechOutput> = Box::new(output);
        input.bind(InputEvents::new(input_tx));
        output.bind(OutputEvents::new(output_tx));

        let shared = Arc::new(Shared::new(config.mode, config.event_capacity));
        let handle = VoiceHandle::new(command_tx, Arc::clone(&shared));

        let arbiter = Self {
            wake_phrases: WakePhrases::new(&config.wake_phrases),
            mode: config.mode,
            config,
            input,
            output,
            sink,
            shared,
            commands,
            input_rx,
            output_rx,
            dispatch_tx,
            dispatch_rx,
            state: VoiceState::Idle,
            state_entered_at: Instant::now(),
            should_be_listening: false,
            initialized: false,
            paused_by_caller: false,
            capture: None,
            next_session: 0,
            utterance: None,
            next_utterance: 0,
            restart: TimerSlot::new("restart"),
            wake: TimerSlot::new("wake"),
            last_transcript: None,
            location: None,
            dispatch_seq: 0,
            in_flight: None,
        };

        (arbiter, handle)
    }

    /// Process messages until shutdown is requested or every handle is dropped
    pub async fn run(mut self) {
        info!(mode = %self.mode, "voice arbiter started");

        while let Some(message) = self.next_message().await {
            if !self.handle(message) {
                break;
            }
        }

        self.teardown();
        info!("voice arbiter stopped");
    }

    async fn next_message(&mut self) -> Option<Message> {
        let restart = expiry(self.restart.deadline());
        let wake = expiry(self.wake.deadline());

        tokio::select! {
            biased;
            command = self.commands.recv() => command.map(Message::Command),
            Some(event) = self.input_rx.recv() => Some(Message::Input(event)),
            Some(event) = self.output_rx.recv() => Some(Message::Output(event)),
            Some(done) = self.dispatch_rx.recv() => Some(Message::Dispatched(done)),
            _ = restart => Some(Message::RestartDue),
            _ = wake => Some(Message::WakeExpired),
        }
    }

    /// Returns false when the loop should exit
    fn handle(&mut self, message: Message) -> bool {
        let keep_running = match message {
            Message::Command(command) => self.on_command(command),
            Message::Input(event) => {
                self.on_input(event);
                true
            }
            Message::Output(event) => {
                self.on_output(event);
                true
            }
            Message::Dispatched(done) => {
                self.on_dispatched(done);
                true
            }
            Message::RestartDue => {
                self.on_restart_due();
                true
            }
            Message::WakeExpired => {
                self.on_wake_expired();
                true
            }
        };

        debug_assert!(
            !(self.capture.is_some() && self.utterance.is_some()),
            "capture and narration active together"
        );
        keep_running
    }

    fn on_command(&mut self, command: Command) -> bool {
        debug!(?command, "command received");
        match command {
            Command::Init { reply } => {
                let result = self.init();
                let _ = reply.send(result);
            }
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Toggle => self.toggle(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Speak(text) => self.speak(&text),
            Command::StopSpeaking => self.stop_speaking(),
            Command::SetMode(mode) => self.set_mode(mode),
            Command::SubmitText(text) => self.submit_text(&text),
            Command::SetLocation(location) => self.set_location(location),
            Command::Shutdown => return false,
        }
        true
    }

    // Control surface

    fn init(&mut self) -> ArbiterResult<()> {
        if self.initialized && self.state != VoiceState::Error {
            return Ok(());
        }

        if !self.input.is_available() {
            self.fail(CaptureError::Unsupported.to_string());
            return Err(ArbiterError::Unsupported);
        }

        self.initialized = true;
        if self.state == VoiceState::Error {
            self.transition_to(VoiceState::Idle);
        }
        info!("voice arbiter initialized");
        Ok(())
    }

    fn start(&mut self) {
        if self.mode == VoiceMode::Text {
            debug!("text mode, ignoring start");
            return;
        }
        if self.state == VoiceState::Error {
            warn!("voice arbiter in error state, init required");
            return;
        }
        if self.init().is_err() {
            return;
        }

        self.cancel_narration();
        self.wake.cancel();
        self.paused_by_caller = false;
        self.set_intent(true);

        if self.state != VoiceState::Listening {
            self.begin_capture();
        }
    }

    fn stop(&mut self) {
        self.restart.cancel();
        self.set_intent(false);
        self.wake.cancel();
        self.paused_by_caller = false;
        self.suspend_capture();

        // an utterance in flight settles to idle when it ends
        if self.utterance.is_none() && self.state != VoiceState::Error {
            self.transition_to(VoiceState::Idle);
        }
    }

    fn toggle(&mut self) {
        if self.should_be_listening || self.state == VoiceState::Listening {
            self.stop();
        } else {
            self.start();
        }
    }

    fn pause(&mut self) {
        if self.state == VoiceState::Error {
            return;
        }
        self.restart.cancel();
        self.paused_by_caller = true;
        self.suspend_capture();
        self.transition_to(VoiceState::Paused);
    }

    fn resume(&mut self) {
        self.wake.cancel();
        self.paused_by_caller = false;

        if !self.should_be_listening {
            if self.state == VoiceState::Paused && self.utterance.is_none() {
                self.transition_to(VoiceState::Idle);
            }
            return;
        }

        self.schedule_resume();
    }

    fn stop_speaking(&mut self) {
        if self.cancel_narration() {
            self.after_narration();
        }
    }

    fn set_mode(&mut self, mode: VoiceMode) {
        if mode == self.mode {
            return;
        }

        info!(from = %self.mode, to = %mode, "mode changed");
        self.mode = mode;
        self.shared.set_mode(mode);

        if mode == VoiceMode::Text {
            self.stop();
        }
    }

    fn submit_text(&mut self, text: &str) {
        if self.state == VoiceState::Error {
            warn!("voice arbiter in error state, dropping typed input");
            return;
        }
        self.cancel_narration();
        self.on_transcript(text, true);
    }

    fn set_location(&mut self, location: Option<String>) {
        let location = location.filter(|route| !route.trim().is_empty());
        debug!(?location, "location updated");
        self.location = location;
    }

    // Capture

    fn begin_capture(&mut self) {
        self.restart.cancel();

        if self.capture.is_some() {
            self.enter_listening();
            return;
        }

        self.next_session += 1;
        let session = SessionId(self.next_session);

        match self.input.start(session) {
            Ok(()) => {
                debug!(%session, "capture started");
                self.capture = Some(session);
                self.enter_listening();
            }
            Err(error) if error.severity() == Severity::Fatal => {
                error!(%error, "capture could not start");
                self.fail(error.to_string());
            }
            Err(error) => {
                warn!(%error, "capture could not start, retrying");
                if self.should_be_listening {
                    self.restart.arm(self.config.restart_debounce());
                }
            }
        }
    }

    fn enter_listening(&mut self) {
        if self.state != VoiceState::Processing || self.in_flight.is_none() {
            self.transition_to(VoiceState::Listening);
        }
    }

    fn suspend_capture(&mut self) {
        if let Some(session) = self.capture.take() {
            debug!(%session, "suspending capture");
            self.input.stop();
        }
    }

    /// Queue a new capture session after the settle delay
    fn schedule_resume(&mut self) {
        if self.utterance.is_some()
            || self.mode == VoiceMode::Text
            || self.state == VoiceState::Error
            || self.capture.is_some()
        {
            return;
        }
        debug!(delay_ms = self.config.resume_settle_ms, "capture resume scheduled");
        self.restart.arm(self.config.resume_settle());
    }

    fn is_held(&self) -> bool {
        self.paused_by_caller || self.wake.is_armed()
    }

    fn on_input(&mut self, event: InputEvent) {
        if self.capture != Some(event.session()) {
            trace!(session = %event.session(), "ignoring event from stale capture session");
            return;
        }

        match event {
            InputEvent::Result { text, is_final, .. } => self.on_transcript(&text, is_final),
            InputEvent::Error { error, .. } => self.on_capture_error(error),
            InputEvent::End { session } => self.on_capture_end(session),
        }
    }

    fn on_capture_error(&mut self, error: CaptureError) {
        match error.severity() {
            Severity::Harmless => debug!(%error, "ignoring capture error"),
            Severity::Transient => warn!(%error, "capture error"),
            Severity::Fatal => {
                error!(%error, "fatal capture error");
                self.fail(error.to_string());
            }
        }
    }

    fn on_capture_end(&mut self, session: SessionId) {
        debug!(%session, "capture session ended");
        self.capture = None;
        self.restart.cancel();

        match self.state {
            VoiceState::Speaking | VoiceState::Paused | VoiceState::Error => {}
            _ if self.should_be_listening => {
                debug!(delay_ms = self.config.restart_debounce_ms, "capture restart scheduled");
                self.restart.arm(self.config.restart_debounce());
            }
            VoiceState::Processing => {}
            _ => self.transition_to(VoiceState::Idle),
        }
    }

    fn on_restart_due(&mut self) {
        self.restart.cancel();

        if !self.should_be_listening
            || self.mode == VoiceMode::Text
            || self.utterance.is_some()
            || self.is_held()
            || self.state == VoiceState::Error
        {
            debug!(state = %self.state, "restart no longer wanted");
            return;
        }

        debug!("restarting capture");
        self.begin_capture();
    }

    /// Give up on capture until the caller re-initializes
    fn fail(&mut self, message: String) {
        self.restart.cancel();
        self.wake.cancel();
        self.paused_by_caller = false;
        self.set_intent(false);
        self.suspend_capture();
        self.transition_to(VoiceState::Error);
        self.shared.publish(VoiceEvent::Error { message });
    }

    // Transcripts

    fn on_transcript(&mut self, text: &str, is_final: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let key = (text.to_string(), is_final);
        if self.last_transcript.as_ref() != Some(&key) {
            self.shared.publish(VoiceEvent::Transcript {
                text: text.to_string(),
                is_final,
            });
            self.last_transcript = Some(key);
        }

        if !is_final {
            return;
        }

        if let Some(phrase) = self.wake_phrases.find(text).map(str::to_owned) {
            info!(phrase = %phrase, "wake phrase heard");
            self.on_wake_phrase();
            return;
        }

        let digits = extract_digits(text);
        if !digits.is_empty() {
            self.shared.publish(VoiceEvent::Digits {
                formatted: format_phone_number(&digits),
                digits: digits.clone(),
            });
        }

        self.dispatch(text, digits);
    }

    fn on_wake_phrase(&mut self) {
        self.cancel_narration();
        self.restart.cancel();
        self.suspend_capture();
        self.wake.arm(self.config.wake_timeout());

        let acknowledgement = self.config.wake_acknowledgement.clone();
        self.speak(&acknowledgement);
        if self.utterance.is_none() {
            self.transition_to(VoiceState::Paused);
        }
    }

    fn on_wake_expired(&mut self) {
        self.wake.cancel();
        debug!("wake pause expired");

        if self.utterance.is_some() || self.paused_by_caller || self.state != VoiceState::Paused {
            return;
        }
        if !self.should_be_listening || self.mode == VoiceMode::Text {
            self.transition_to(VoiceState::Idle);
            return;
        }

        match self.config.resume_prompt.clone() {
            Some(prompt) if !prompt.trim().is_empty() => self.speak(&prompt),
            _ => self.begin_capture(),
        }
    }

    // Dispatch

    fn dispatch(&mut self, transcript: &str, digits: String) {
        self.transition_to(VoiceState::Processing);
        self.dispatch_seq += 1;
        let seq = self.dispatch_seq;
        self.in_flight = Some(seq);

        let request = CommandRequest {
            transcript: transcript.to_string(),
            command: normalize_command(transcript),
            digits: (!digits.is_empty()).then_some(digits),
            context: CommandContext {
                location: self.location.clone(),
                user_type: self.config.user_type.clone(),
                mode: self.mode,
            },
        };
        info!(seq, command = %request.command, "dispatching transcript");

        let sink = Arc::clone(&self.sink);
        let done = self.dispatch_tx.clone();
        tokio::spawn(async move {
            let outcome = sink.dispatch(request).await;
            let _ = done.send(Dispatched { seq, outcome });
        });
    }

    fn on_dispatched(&mut self, Dispatched { seq, outcome }: Dispatched) {
        let current = self.in_flight == Some(seq) && self.state == VoiceState::Processing;
        if self.in_flight == Some(seq) {
            self.in_flight = None;
        }

        match outcome {
            Ok(response) => {
                debug!(seq, "command sink answered");
                let narration = response.narration().map(str::to_owned);
                self.shared.publish(VoiceEvent::Response { response });

                if !current {
                    debug!(seq, "dispatch superseded, response not acted on");
                    return;
                }
                match narration {
                    Some(text) if self.mode == VoiceMode::Talkative => self.speak(&text),
                    _ => self.settle_after_dispatch(),
                }
            }
            Err(error) => {
                warn!(seq, %error, "command dispatch failed");
                self.shared.publish(VoiceEvent::Error {
                    message: format!("command dispatch failed: {error}"),
                });
                if current {
                    self.settle_after_dispatch();
                }
            }
        }
    }

    fn settle_after_dispatch(&mut self) {
        if self.is_held() {
            self.transition_to(VoiceState::Paused);
            return;
        }

        if self.should_be_listening && self.mode != VoiceMode::Text {
            // the dispatch round trip already spaced out a session that ended meanwhile
            if self.capture.is_none() {
                self.begin_capture();
            } else {
                self.transition_to(VoiceState::Listening);
            }
        } else {
            self.transition_to(VoiceState::Idle);
        }
    }

    // Narration

    fn speak(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        // capture goes quiet before narration begins
        self.cancel_narration();
        self.restart.cancel();
        self.suspend_capture();

        self.next_utterance += 1;
        let id = UtteranceId(self.next_utterance);

        match self.output.speak(id, text) {
            Ok(()) => {
                debug!(utterance = %id, "narration requested");
                self.utterance = Some(Utterance {
                    id,
                    started_at: Instant::now(),
                });
                if self.state != VoiceState::Error {
                    self.transition_to(VoiceState::Speaking);
                }
            }
            Err(error) => {
                warn!(%error, "narration could not start");
                self.after_narration();
            }
        }
    }

    /// Returns whether an utterance was in flight
    fn cancel_narration(&mut self) -> bool {
        let Some(utterance) = self.utterance.take() else {
            return false;
        };
        debug!(utterance = %utterance.id, "cancelling narration");
        self.output.cancel();
        true
    }

    fn on_output(&mut self, event: OutputEvent) {
        let Some(current) = self.utterance.as_ref().map(|u| u.id) else {
            trace!(utterance = %event.utterance(), "ignoring narration event, nothing in flight");
            return;
        };
        if event.utterance() != current {
            trace!(utterance = %event.utterance(), "ignoring event for superseded utterance");
            return;
        }

        match event {
            OutputEvent::Started { .. } => debug!(utterance = %current, "narration started"),
            OutputEvent::Ended { .. } => {
                if let Some(utterance) = self.utterance.take() {
                    debug!(
                        utterance = %utterance.id,
                        duration_ms = utterance.started_at.elapsed().as_millis() as u64,
                        "narration ended"
                    );
                }
                self.after_narration();
            }
            OutputEvent::Failed { error, .. } => {
                warn!(utterance = %current, %error, "narration failed");
                self.utterance = None;
                self.after_narration();
            }
        }
    }

    /// Resume step once narration has fully ended
    fn after_narration(&mut self) {
        if self.state == VoiceState::Error {
            return;
        }

        if self.is_held() {
            self.transition_to(VoiceState::Paused);
            return;
        }

        if self.should_be_listening && self.mode != VoiceMode::Text {
            self.transition_to(VoiceState::Paused);
            self.schedule_resume();
        } else {
            self.transition_to(VoiceState::Idle);
        }
    }

    // Bookkeeping

    fn set_intent(&mut self, listening: bool) {
        if self.should_be_listening != listening {
            debug!(listening, "listening intent changed");
        }
        self.should_be_listening = listening;
        self.shared.set_listening_requested(listening);
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: VoiceState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }

        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
        info!(
            from = %old_state,
            to = %new_state,
            duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = Instant::now();
        self.shared.set_state(new_state);
    }

    fn teardown(&mut self) {
        self.restart.cancel();
        self.wake.cancel();
        self.paused_by_caller = false;
        self.cancel_narration();
        self.suspend_capture();
        self.set_intent(false);
        if self.state != VoiceState::Error {
            self.transition_to(VoiceState::Idle);
        }
    }
}

#[cfg(test)]
impl Arbiter {
    /// Next message that is ready right now, timers included
    fn try_message(&mut self) -> Option<Message> {
        if let Ok(command) = self.commands.try_recv() {
            return Some(Message::Command(command));
        }
        if let Ok(event) = self.input_rx.try_recv() {
            return Some(Message::Input(event));
        }
        if let Ok(event) = self.output_rx.try_recv() {
            return Some(Message::Output(event));
        }
        if let Ok(done) = self.dispatch_rx.try_recv() {
            return Some(Message::Dispatched(done));
        }

        let now = Instant::now();
        if self.restart.is_due(now) {
            return Some(Message::RestartDue);
        }
        if self.wake.is_due(now) {
            return Some(Message::WakeExpired);
        }
        None
    }

    fn pump(&mut self) {
        while let Some(message) = self.try_message() {
            self.handle(message);
        }
    }
}
