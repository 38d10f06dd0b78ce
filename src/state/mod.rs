//! Voice arbitration
//!
//! One capture engine and one narration engine share a single audio path.
//! The [`Arbiter`] owns both and guarantees they are never active together:
//! capture is suspended before narration starts and resumed only after it
//! ends and a settle delay has passed. Callers drive it through a
//! [`VoiceHandle`] and observe it through [`Subscription`]s.
//!
//! States:
//! - Idle: nothing running
//! - Listening: a capture session is live
//! - Processing: a final transcript is with the command sink
//! - Speaking: narration in progress
//! - Paused: capture held off (settle delay, wake phrase, or caller pause)
//! - Error: capture failed for good; `init` clears it

mod handle;
mod machine;
mod timer;
mod types;

pub use handle::{Subscription, VoiceHandle};
pub use machine::Arbiter;
pub use types::{ParseModeError, VoiceMode, VoiceState};
