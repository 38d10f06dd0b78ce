//! Boundary contracts between the arbitrator and the engines it drives
//!
//! - [`SpeechInput`]: streaming recognition (start/stop, result/error/end)
//! - [`SpeechOutput`]: turn-based narration (speak/cancel, start/end/error)
//! - [`CommandSink`]: receives final transcripts, may return text to narrate
//!
//! Only the arbitrator talks to these; everything else goes through
//! [`crate::state::VoiceHandle`].

mod console;
mod input;
mod output;
mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use console::{ConsoleInput, LoggingOutput};
pub use input::{CaptureError, InputEvent, InputEvents, SessionId, Severity, SpeechInput};
pub use output::{NarrationError, OutputEvent, OutputEvents, SpeechOutput, UtteranceId};
pub use sink::{
    CommandContext, CommandRequest, CommandResponse, CommandSink, EchoSink, HttpCommandSink, SinkError,
};
