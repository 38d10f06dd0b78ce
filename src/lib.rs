//! voice-arbiter: single owner of a shared speech capture and narration path
//!
//! The [`Arbiter`] keeps one recognition session and one narration in
//! strict turn-taking, restarts capture when the engine drops it, handles
//! wake phrases, and hands final transcripts to a [`CommandSink`]. UIs
//! drive it through a [`VoiceHandle`] and watch it through subscriptions.

pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod ipc;
pub mod lifecycle;
pub mod ports;
pub mod state;

pub use config::Config;
pub use error::{ArbiterError, ArbiterResult};
pub use events::VoiceEvent;
pub use ports::{CommandSink, SpeechInput, SpeechOutput};
pub use state::{Arbiter, Subscription, VoiceHandle, VoiceMode, VoiceState};
