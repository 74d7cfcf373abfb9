//! The delayed (reader-visible) view of a canonical stream:
//! samples the canonical length on a fixed tick and exposes only the prefix
//! that is at least `delay` old, so a reader can never see data less stale
//! than the configured playback delay.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep, Instant};

use crate::latch::Latch;
use crate::stream::ReplayStream;

struct Inner {
    canonical: ReplayStream,
    delay: Duration,
    samples: RefCell<VecDeque<(Instant, usize)>>,
    changed: Notify,
    ended: Latch,
}

/// A time-delayed read-only view over a [`ReplayStream`].
#[derive(Clone)]
pub struct DelayedStream(Rc<Inner>);

impl DelayedStream {
    pub fn new(canonical: ReplayStream, delay: Duration, sample_tick: Duration) -> Self {
        let inner = Rc::new(Inner {
            canonical,
            delay,
            samples: RefCell::new(VecDeque::new()),
            changed: Notify::new(),
            ended: Latch::new(),
        });
        let this = Self(inner);
        let sampler = this.clone();
        tokio::task::spawn_local(async move {
            sampler.sample_loop(sample_tick).await;
        });
        this
    }

    async fn sample_loop(&self, sample_tick: Duration) {
        loop {
            self.take_sample();
            if self.0.canonical.is_ended() {
                break;
            }
            sleep(sample_tick).await;
        }
        // The canonical stream is done growing. Readers stay delayed until
        // the window fully elapses past the final length, then this stream
        // is done too.
        sleep(self.0.delay).await;
        self.take_sample();
        self.0.ended.set();
        self.0.changed.notify_waiters();
    }

    fn take_sample(&self) {
        let now = Instant::now();
        let len = self.0.canonical.len();
        let mut samples = self.0.samples.borrow_mut();
        samples.push_back((now, len));
        // Drop samples no query could still need: once two consecutive
        // entries both predate the current delay cutoff, the older of the
        // two can never be the answer (the newer one is, and is closer).
        let cutoff = now.checked_sub(self.0.delay).unwrap_or(now);
        while samples.len() >= 2 && samples[1].0 <= cutoff {
            samples.pop_front();
        }
        drop(samples);
        self.0.changed.notify_waiters();
    }

    /// The longest canonical prefix old enough to be shown to readers.
    pub fn stable_position(&self) -> usize {
        let cutoff = Instant::now().checked_sub(self.0.delay).unwrap_or_else(Instant::now);
        let samples = self.0.samples.borrow();
        samples
            .iter()
            .rev()
            .find(|(t, _)| *t <= cutoff)
            .map(|(_, len)| *len)
            .unwrap_or(0)
    }

    pub fn is_ended(&self) -> bool {
        self.0.ended.is_set()
    }

    pub async fn wait_ended(&self) {
        self.0.ended.wait().await;
    }

    /// Waits until the header is available, or the canonical stream ends
    /// without ever having one (no writer ever completed its handshake).
    pub async fn wait_for_header(&self) -> Option<Vec<u8>> {
        loop {
            if let Some(bytes) = self.0.canonical.header_bytes() {
                return Some(bytes);
            }
            if self.0.canonical.is_ended() {
                return None;
            }
            let notified = self.0.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(bytes) = self.0.canonical.header_bytes() {
                return Some(bytes);
            }
            if self.0.canonical.is_ended() {
                return None;
            }
            notified.await;
        }
    }

    /// Waits until stable data exists past `from`, or the stream ends.
    /// Returns the new bytes (empty iff the stream ended with nothing left).
    pub async fn wait_for_data(&self, from: usize) -> Vec<u8> {
        loop {
            let pos = self.stable_position();
            if pos > from {
                return self.0.canonical.slice(from, pos);
            }
            if self.is_ended() {
                return Vec::new();
            }
            let notified = self.0.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let pos = self.stable_position();
            if pos > from || self.is_ended() {
                continue;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stable_position_trails_canonical_by_delay() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let canonical = ReplayStream::new();
                let delayed = DelayedStream::new(
                    canonical.clone(),
                    Duration::from_secs(10),
                    Duration::from_secs(1),
                );
                canonical.extend(b"hello");
                tokio::time::advance(Duration::from_secs(1)).await;
                assert_eq!(delayed.stable_position(), 0);

                tokio::time::advance(Duration::from_secs(10)).await;
                assert_eq!(delayed.stable_position(), 5);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn ends_delay_after_canonical_ends() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let canonical = ReplayStream::new();
                let delayed = DelayedStream::new(
                    canonical.clone(),
                    Duration::from_secs(5),
                    Duration::from_secs(1),
                );
                canonical.extend(b"abc");
                canonical.set_ended();
                tokio::time::advance(Duration::from_secs(4)).await;
                assert!(!delayed.is_ended());
                tokio::time::advance(Duration::from_secs(2)).await;
                delayed.wait_ended().await;
                assert!(delayed.is_ended());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_data_unblocks_once_stable() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let canonical = ReplayStream::new();
                let delayed = DelayedStream::new(
                    canonical.clone(),
                    Duration::from_secs(2),
                    Duration::from_secs(1),
                );
                canonical.extend(b"xy");
                let waiter = tokio::task::spawn_local({
                    let delayed = delayed.clone();
                    async move { delayed.wait_for_data(0).await }
                });
                tokio::time::advance(Duration::from_secs(3)).await;
                let data = waiter.await.unwrap();
                assert_eq!(data, b"xy");
            })
            .await;
    }
}
