//! Debounced trigger.
//!
//! Coalesces bursts of change notifications into a single delayed action.
//! A fire never happens sooner than `min_spacing` after the previous fire,
//! and never sooner than `jitter` after the latest schedule call.
//!
//! The trigger does not run the action itself. When the timer elapses it
//! posts a message carrying the schedule generation to the owner's event
//! channel; the owner confirms with [`DebouncedTrigger::fired`], which
//! rejects messages from timers that were superseded in the meantime.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Single-action debounced trigger.
pub(crate) struct DebouncedTrigger<M> {
    min_spacing: Duration,
    jitter: Duration,
    next_allowed: Instant,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    sender: UnboundedSender<M>,
    make: fn(u64) -> M,
}

impl<M: Send + 'static> DebouncedTrigger<M> {
    /// Create a trigger that posts `make(generation)` to `sender` on fire.
    pub(crate) fn new(
        min_spacing: Duration,
        jitter: Duration,
        sender: UnboundedSender<M>,
        make: fn(u64) -> M,
    ) -> Self {
        Self {
            min_spacing,
            jitter,
            next_allowed: Instant::now(),
            generation: 0,
            pending: None,
            sender,
            make,
        }
    }

    /// Time at which a schedule call made at `now` fires.
    pub(crate) fn deadline(&self, now: Instant) -> Instant {
        if now >= self.next_allowed {
            now + self.jitter
        } else {
            self.next_allowed
        }
    }

    /// Schedule a fire, replacing any pending one.
    pub(crate) fn schedule(&mut self) {
        self.cancel();
        self.generation += 1;

        let deadline = self.deadline(Instant::now());
        let sender = self.sender.clone();
        let message = (self.make)(self.generation);

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Owner gone means shutdown
            let _ = sender.send(message);
        }));
    }

    /// Confirm a fire message.
    ///
    /// Returns `false` for messages from superseded or cancelled timers.
    /// On `true` the spacing window restarts from now.
    pub(crate) fn fired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.pending.is_none() {
            return false;
        }
        self.pending = None;
        self.next_allowed = Instant::now() + self.min_spacing;
        true
    }

    /// Drop the pending fire, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether a fire is outstanding.
    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<M> Drop for DebouncedTrigger<M> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
