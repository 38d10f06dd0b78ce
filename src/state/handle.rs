//! Public control surface and subscriber registry

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::warn;

use super::types::{VoiceMode, VoiceState};
use crate::error::{ArbiterError, ArbiterResult};
use crate::events::VoiceEvent;

/// Requests queued for the arbitrator loop
#[derive(Debug)]
pub(crate) enum Command {
    Init { reply: oneshot::Sender<ArbiterResult<()>> },
    Start,
    Stop,
    Toggle,
    Pause,
    Resume,
    Speak(String),
    StopSpeaking,
    SetMode(VoiceMode),
    SubmitText(String),
    SetLocation(Option<String>),
    Shutdown,
}

/// What getters see without a round trip to the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub state: VoiceState,
    pub mode: VoiceMode,
    pub listening_requested: bool,
}

/// State shared between the arbitrator and its handles
pub(crate) struct Shared {
    snapshot: Mutex<Snapshot>,
    events: broadcast::Sender<VoiceEvent>,
    /// Latest state, for subscribers that fell behind the broadcast
    current: watch::Sender<VoiceState>,
}

impl Shared {
    pub fn new(mode: VoiceMode, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (current, _) = watch::channel(VoiceState::default());
        Self {
            snapshot: Mutex::new(Snapshot {
                mode,
                ..Snapshot::default()
            }),
            events,
            current,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.snapshot.lock()
    }

    /// Record a new state and announce it
    ///
    /// Publishing under the snapshot lock means a concurrent `subscribe`
    /// either replays the old state and then receives this event, or
    /// replays the new state and never sees it.
    pub fn set_state(&self, state: VoiceState) {
        let mut snapshot = self.snapshot.lock();
        snapshot.state = state;
        self.current.send_replace(state);
        let _ = self.events.send(VoiceEvent::StateChanged { state });
    }

    pub fn set_mode(&self, mode: VoiceMode) {
        let mut snapshot = self.snapshot.lock();
        snapshot.mode = mode;
        let _ = self.events.send(VoiceEvent::ModeChanged { mode });
    }

    pub fn set_listening_requested(&self, requested: bool) {
        self.snapshot.lock().listening_requested = requested;
    }

    /// Send to every current subscriber; nobody listening is fine
    pub fn publish(&self, event: VoiceEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        let snapshot = self.snapshot.lock();
        Subscription {
            replay: Some(VoiceEvent::StateChanged {
                state: snapshot.state,
            }),
            rx: self.events.subscribe(),
            current: self.current.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

/// A registered listener
///
/// Yields the state current at subscription time first, then every event
/// published afterwards. A subscriber that falls behind and misses events
/// is handed the current state again before it continues. Dropping it
/// unsubscribes.
pub struct Subscription {
    replay: Option<VoiceEvent>,
    rx: broadcast::Receiver<VoiceEvent>,
    current: watch::Receiver<VoiceState>,
}

impl Subscription {
    /// Next event; `None` once the arbitrator is gone
    pub async fn recv(&mut self) -> Option<VoiceEvent> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "voice subscriber lagged");
                    return Some(self.resync());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<VoiceEvent> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }

        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "voice subscriber lagged");
                    return Some(self.resync());
                }
                Err(_) => return None,
            }
        }
    }

    /// Skipped events may have included state changes
    fn resync(&self) -> VoiceEvent {
        VoiceEvent::StateChanged {
            state: *self.current.borrow(),
        }
    }

    pub fn unsubscribe(self) {}
}

/// Cloneable handle to a running [`super::Arbiter`]
///
/// Control calls are queued and applied in order by the arbitrator loop;
/// getters read the last published snapshot.
#[derive(Clone)]
pub struct VoiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl VoiceHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, shared: Arc<Shared>) -> Self {
        Self { commands, shared }
    }

    fn send(&self, command: Command) -> ArbiterResult<()> {
        self.commands.send(command).map_err(|_| ArbiterError::Closed)
    }

    /// Probe the capture engine; also clears the error state
    pub async fn init(&self) -> ArbiterResult<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Init { reply })?;
        response.await.map_err(|_| ArbiterError::Closed)?
    }

    pub fn start(&self) -> ArbiterResult<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> ArbiterResult<()> {
        self.send(Command::Stop)
    }

    pub fn toggle(&self) -> ArbiterResult<()> {
        self.send(Command::Toggle)
    }

    pub fn pause(&self) -> ArbiterResult<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> ArbiterResult<()> {
        self.send(Command::Resume)
    }

    pub fn speak(&self, text: impl Into<String>) -> ArbiterResult<()> {
        self.send(Command::Speak(text.into()))
    }

    pub fn stop_speaking(&self) -> ArbiterResult<()> {
        self.send(Command::StopSpeaking)
    }

    pub fn set_mode(&self, mode: VoiceMode) -> ArbiterResult<()> {
        self.send(Command::SetMode(mode))
    }

    /// Feed typed text through the transcript pipeline as a final result
    pub fn submit_text(&self, text: impl Into<String>) -> ArbiterResult<()> {
        self.send(Command::SubmitText(text.into()))
    }

    /// UI location reported to the command sink
    pub fn set_location(&self, location: Option<String>) -> ArbiterResult<()> {
        self.send(Command::SetLocation(location))
    }

    /// Stop the arbitrator loop after tearing down capture and narration
    pub fn shutdown(&self) -> ArbiterResult<()> {
        self.send(Command::Shutdown)
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.subscribe()
    }

    pub fn state(&self) -> VoiceState {
        self.shared.snapshot().state
    }

    pub fn mode(&self) -> VoiceMode {
        self.shared.snapshot().mode
    }

    pub fn is_listening(&self) -> bool {
        self.state() == VoiceState::Listening
    }

    pub fn is_speaking(&self) -> bool {
        self.state() == VoiceState::Speaking
    }

    /// Whether the last caller request was to keep listening
    pub fn listening_requested(&self) -> bool {
        self.shared.snapshot().listening_requested
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (VoiceHandle, mpsc::UnboundedReceiver<Command>, Arc<Shared>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(VoiceMode::Interactive, 4));
        (VoiceHandle::new(tx, Arc::clone(&shared)), rx, shared)
    }

    #[test]
    fn test_subscribe_replays_current_state() {
        let (handle, _rx, shared) = handle();
        shared.set_state(VoiceState::Paused);

        let mut sub = handle.subscribe();
        assert_eq!(
            sub.try_recv(),
            Some(VoiceEvent::StateChanged {
                state: VoiceState::Paused
            })
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_subscriber_sees_later_events_in_order() {
        let (handle, _rx, shared) = handle();
        let mut sub = handle.subscribe();

        shared.set_state(VoiceState::Listening);
        shared.publish(VoiceEvent::Error {
            message: "boom".to_string(),
        });

        assert_eq!(
            sub.try_recv(),
            Some(VoiceEvent::StateChanged { state: VoiceState::Idle })
        );
        assert_eq!(
            sub.try_recv(),
            Some(VoiceEvent::StateChanged {
                state: VoiceState::Listening
            })
        );
        assert!(matches!(sub.try_recv(), Some(VoiceEvent::Error { .. })));
        assert_eq!(handle.state(), VoiceState::Listening);
        assert!(handle.is_listening());
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let (handle, _rx, _shared) = handle();
        let first = handle.subscribe();
        let second = handle.subscribe();
        assert_eq!(handle.subscriber_count(), 2);

        first.unsubscribe();
        drop(second);
        assert_eq!(handle.subscriber_count(), 0);
    }

    #[test]
    fn test_lagging_subscriber_keeps_going() {
        let (handle, _rx, shared) = handle();
        let mut sub = handle.subscribe();
        sub.try_recv();

        for _ in 0..10 {
            shared.publish(VoiceEvent::Error {
                message: "noise".to_string(),
            });
        }
        shared.set_state(VoiceState::Speaking);

        let mut last = None;
        while let Some(event) = sub.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(VoiceEvent::StateChanged {
                state: VoiceState::Speaking
            })
        );
    }

    #[test]
    fn test_lagging_subscriber_relearns_state() {
        let (handle, _rx, shared) = handle();
        let mut sub = handle.subscribe();
        sub.try_recv();

        shared.set_state(VoiceState::Speaking);
        for _ in 0..10 {
            shared.publish(VoiceEvent::Error {
                message: "noise".to_string(),
            });
        }

        let events: Vec<_> = std::iter::from_fn(|| sub.try_recv()).collect();
        assert_eq!(
            events.first(),
            Some(&VoiceEvent::StateChanged {
                state: VoiceState::Speaking
            })
        );
        assert_eq!(events.len(), 5);
        assert!(events[1..]
            .iter()
            .all(|event| matches!(event, VoiceEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_lagging_async_subscriber_relearns_state() {
        let (handle, _rx, shared) = handle();
        let mut sub = handle.subscribe();
        sub.recv().await;

        shared.set_state(VoiceState::Processing);
        for _ in 0..10 {
            shared.publish(VoiceEvent::Error {
                message: "noise".to_string(),
            });
        }

        assert_eq!(
            sub.recv().await,
            Some(VoiceEvent::StateChanged {
                state: VoiceState::Processing
            })
        );
    }

    #[test]
    fn test_commands_are_queued_in_order() {
        let (handle, mut rx, _shared) = handle();
        handle.start().unwrap();
        handle.speak("hello").unwrap();

        assert!(matches!(rx.try_recv(), Ok(Command::Start)));
        assert!(matches!(rx.try_recv(), Ok(Command::Speak(text)) if text == "hello"));
    }

    #[test]
    fn test_closed_arbiter() {
        let (handle, rx, _shared) = handle();
        drop(rx);
        assert!(matches!(handle.start(), Err(ArbiterError::Closed)));
    }

    #[tokio::test]
    async fn test_init_closed_when_reply_dropped() {
        let (handle, mut rx, _shared) = handle();
        let task = tokio::spawn(async move { handle.init().await });

        match rx.recv().await {
            Some(Command::Init { reply }) => drop(reply),
            other => panic!("unexpected command {other:?}"),
        }
        let result = task.await.unwrap();
        assert!(matches!(result, Err(ArbiterError::Closed)));
    }

    #[tokio::test]
    async fn test_recv_ends_when_arbiter_gone() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(VoiceMode::Text, 4));
        let handle = VoiceHandle::new(tx, Arc::clone(&shared));
        let mut sub = handle.subscribe();
        drop(handle);
        drop(shared);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
