//! Single-shot deadlines owned by the arbitrator
//!
//! A slot holds at most one pending deadline; arming replaces it and a
//! cancelled slot can never fire. The arbitrator polls the slot's deadline
//! in its select loop, so nothing fires behind its back.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
pub struct TimerSlot {
    name: &'static str,
    deadline: Option<Instant>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self { name, deadline: None }
    }

    /// Schedule the slot to fire after `delay`, replacing any pending deadline
    pub fn arm(&mut self, delay: Duration) {
        trace!(timer = self.name, delay_ms = delay.as_millis() as u64, "timer armed");
        self.deadline = Some(Instant::now() + delay);
    }

    /// Returns whether a deadline was pending
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.deadline.take().is_some();
        if was_armed {
            trace!(timer = self.name, "timer cancelled");
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

/// Resolves at `deadline`, or never when there is none
pub fn expiry(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
