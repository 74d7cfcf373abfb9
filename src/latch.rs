//! A one-shot "ended" signal with many waiters: once set, all current and
//! future `wait()` calls complete immediately. Used for `StreamLifetime`,
//! `ReplayStream`, `DelayedStream` and `Sender`'s `ended` fields — a latched
//! broadcast primitive.
//!
//! All `Replay` state lives on a single scheduler (a `tokio::task::LocalSet`)
//! so this is built on `Rc`/`Cell`, not `Arc`/`Mutex` — no task in the same
//! `Replay` ever contends with another for this lock.

use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    set: Cell<bool>,
    notify: Notify,
}

/// A cloneable handle to a single one-shot signal.
#[derive(Clone, Default)]
pub struct Latch(Rc<Inner>);

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: setting an already-set latch is a no-op.
    pub fn set(&self) {
        if !self.0.set.replace(true) {
            self.0.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.set.get()
    }

    /// Resolves immediately if already set; otherwise waits for `set()`.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
