//! Terminal-backed engines for running the daemon without audio hardware
//!
//! [`ConsoleInput`] treats each stdin line as something the user said:
//!
//! - `~text` is an interim result
//! - `!code` is an engine error (`!no-speech`, `!not-allowed`, ...)
//! - `.` ends the session as if the engine timed out
//! - anything else is a final result
//!
//! Once stdin is closed the engine reports itself unavailable.
//!
//! [`LoggingOutput`] logs narration and reports it finished after the time
//! it would take to say it aloud.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::input::{CaptureError, InputEvents, SessionId, SpeechInput};
use super::output::{NarrationError, OutputEvents, SpeechOutput, UtteranceId};
use crate::config::{CaptureConfig, NarrationConfig};

/// A parsed line of console input
#[derive(Debug, PartialEq, Eq)]
enum ConsoleLine<'a> {
    Skip,
    End,
    Error(&'a str),
    Result { text: &'a str, is_final: bool },
}

fn parse_line(line: &str, interim_results: bool) -> ConsoleLine<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Skip;
    }
    if line == "." {
        return ConsoleLine::End;
    }
    if let Some(code) = line.strip_prefix('!') {
        return ConsoleLine::Error(code.trim());
    }
    if let Some(text) = line.strip_prefix('~') {
        if !interim_results {
            return ConsoleLine::Skip;
        }
        return ConsoleLine::Result {
            text: text.trim(),
            is_final: false,
        };
    }
    ConsoleLine::Result {
        text: line,
        is_final: true,
    }
}

/// Recognition engine that reads utterances from stdin
pub struct ConsoleInput {
    config: CaptureConfig,
    events: Option<InputEvents>,
    session: Arc<Mutex<Option<SessionId>>>,
    running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
}

impl ConsoleInput {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            events: None,
            session: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            exhausted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the stdin reader; it lives until EOF
    fn spawn_reader(&self, events: InputEvents) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let session = Arc::clone(&self.session);
        let running = Arc::clone(&self.running);
        let exhausted = Arc::clone(&self.exhausted);
        let interim_results = self.config.interim_results;

        thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || {
                info!("console input thread started");
                read_lines(std::io::stdin().lock(), &events, &session, &exhausted, interim_results);
                running.store(false, Ordering::SeqCst);
                info!("console input thread stopped");
            })
            .map(|_| ())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::Other(format!("failed to spawn console reader: {e}"))
            })
    }
}

fn read_lines(
    reader: impl BufRead,
    events: &InputEvents,
    session: &Mutex<Option<SessionId>>,
    exhausted: &AtomicBool,
    interim_results: bool,
) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to read console input");
                break;
            }
        };

        let Some(current) = *session.lock() else {
            debug!("no live capture session, dropping line");
            continue;
        };

        match parse_line(&line, interim_results) {
            ConsoleLine::Skip => {}
            ConsoleLine::End => {
                session.lock().take();
                events.end(current);
            }
            ConsoleLine::Error(code) => events.error(current, CaptureError::from_code(code)),
            ConsoleLine::Result { text, is_final } => events.result(current, text, is_final),
        }
    }

    exhausted.store(true, Ordering::SeqCst);
    if let Some(current) = session.lock().take() {
        events.end(current);
    }
}

impl SpeechInput for ConsoleInput {
    fn bind(&mut self, events: InputEvents) {
        self.events = Some(events);
    }

    fn is_available(&self) -> bool {
        !self.exhausted.load(Ordering::SeqCst)
    }

    fn start(&mut self, session: SessionId) -> Result<(), CaptureError> {
        if !self.is_available() {
            warn!(%session, "console input closed, cannot capture");
            return Err(CaptureError::Unsupported);
        }

        let events = self
            .events
            .clone()
            .ok_or_else(|| CaptureError::Other("console input not bound".to_string()))?;

        {
            let mut slot = self.session.lock();
            if slot.is_some() {
                return Err(CaptureError::AlreadyStarted);
            }
            *slot = Some(session);
        }

        if let Err(e) = self.spawn_reader(events) {
            self.session.lock().take();
            return Err(e);
        }

        debug!(%session, language = %self.config.language, "console capture started");
        Ok(())
    }

    fn stop(&mut self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        if let Some(events) = &self.events {
            events.error(session, CaptureError::Aborted);
            events.end(session);
        }
    }
}

/// How long narrating `text` takes at the configured pace
pub fn narration_duration(text: &str, config: &NarrationConfig) -> Duration {
    let words = text.split_whitespace().count().max(1) as f64;
    let per_minute = f64::from(config.words_per_minute) * f64::from(config.rate);
    let secs = words * 60.0 / per_minute.max(1.0);
    Duration::from_secs_f64(secs).max(Duration::from_millis(400))
}

/// Narration engine that writes to the log instead of a speaker
pub struct LoggingOutput {
    config: NarrationConfig,
    events: Option<OutputEvents>,
    current: Option<(UtteranceId, JoinHandle<()>)>,
}

impl LoggingOutput {
    pub fn new(config: NarrationConfig) -> Self {
        Self {
            config,
            events: None,
            current: None,
        }
    }
}

impl SpeechOutput for LoggingOutput {
    fn bind(&mut self, events: OutputEvents) {
        self.events = Some(events);
    }

    fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), NarrationError> {
        let events = self.events.clone().ok_or(NarrationError::Unavailable)?;
        let runtime = Handle::try_current().map_err(|_| NarrationError::Unavailable)?;

        self.cancel();

        let duration = narration_duration(text, &self.config);
        info!(
            %utterance,
            rate = self.config.rate,
            pitch = self.config.pitch,
            volume = self.config.volume,
            language = %self.config.language,
            duration_ms = duration.as_millis() as u64,
            "narrating: {text}"
        );

        events.started(utterance);
        let task = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            events.ended(utterance);
        });
        self.current = Some((utterance, task));

        Ok(())
    }

    fn cancel(&mut self) {
        let Some((utterance, task)) = self.current.take() else {
            return;
        };
        if task.is_finished() {
            return;
        }
        task.abort();
        debug!(%utterance, "narration cancelled");
        if let Some(events) = &self.events {
            events.failed(utterance, NarrationError::Interrupted);
        }
    }
}
