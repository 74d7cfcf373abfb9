//! Stream lifetime tracking: counts attached writer connections
//! and schedules the grace period that ends a replay once the last writer
//! disconnects without a replacement showing up in time.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::latch::Latch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At least one writer is attached; `n` is the attached count.
    Active(u32),
    /// No writer attached; a timer tied to the current `generation` ends
    /// the stream after the grace period unless a writer reattaches first.
    Grace,
    Ended,
}

struct Inner {
    state: Cell<State>,
    grace_period: Duration,
    generation: Cell<u64>,
    ended: Latch,
}

/// Tracks how many writers are attached to a replay's canonical stream and
/// ends the stream after `grace_period` elapses with none attached.
///
/// A fresh lifetime starts in `Grace` state (no writer has connected yet),
/// so a match that never gets a single writer still times out instead of
/// hanging forever.
#[derive(Clone)]
pub struct StreamLifetime(Rc<Inner>);

impl StreamLifetime {
    pub fn new(grace_period: Duration) -> Self {
        let inner = Rc::new(Inner {
            state: Cell::new(State::Grace),
            grace_period,
            generation: Cell::new(0),
            ended: Latch::new(),
        });
        let this = Self(inner);
        this.schedule_grace_timeout();
        this
    }

    fn schedule_grace_timeout(&self) {
        let inner = self.0.clone();
        let generation = inner.generation.get();
        let deadline = Instant::now() + inner.grace_period;
        tokio::task::spawn_local(async move {
            sleep(deadline.saturating_duration_since(Instant::now())).await;
            // Only end the stream if nothing reset the grace period (a new
            // writer attaching, or another timer already firing) since this
            // timer was scheduled.
            if inner.generation.get() == generation && matches!(inner.state.get(), State::Grace) {
                inner.state.set(State::Ended);
                inner.ended.set();
            }
        });
    }

    /// A writer connection attached. Cancels any pending grace-period
    /// timeout.
    pub fn stream_added(&self) {
        match self.0.state.get() {
            State::Active(n) => self.0.state.set(State::Active(n + 1)),
            State::Grace => {
                self.0.generation.set(self.0.generation.get() + 1);
                self.0.state.set(State::Active(1));
            }
            State::Ended => {}
        }
    }

    /// A writer connection detached. Once the last one detaches, the grace
    /// period starts counting down again.
    pub fn stream_removed(&self) {
        match self.0.state.get() {
            State::Active(n) if n > 1 => self.0.state.set(State::Active(n - 1)),
            State::Active(_) => {
                self.0.state.set(State::Grace);
                self.0.generation.set(self.0.generation.get() + 1);
                self.schedule_grace_timeout();
            }
            State::Grace | State::Ended => {}
        }
    }

    /// Forces the grace period to elapse immediately, used when a replay is
    /// being closed out from above (per-match timeout, forced shutdown).
    /// Idempotent: calling this twice, or after the stream already ended,
    /// does nothing further.
    pub fn disable_grace_period(&self) {
        if matches!(self.0.state.get(), State::Ended) {
            return;
        }
        self.0.generation.set(self.0.generation.get() + 1);
        self.0.state.set(State::Grace);
        let inner = self.0.clone();
        tokio::task::spawn_local(async move {
            if matches!(inner.state.get(), State::Grace) {
                inner.state.set(State::Ended);
                inner.ended.set();
            }
        });
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.0.state.get(), State::Ended)
    }

    pub async fn wait_ended(&self) {
        self.0.ended.wait().await;
    }
}
