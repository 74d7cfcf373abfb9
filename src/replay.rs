//! Composes one match's `Merger`, `DelayedStream`, `Sender` and bookkeeping
//! into the single per-replay state machine, and enforces the
//! hard per-match timeout.

use std::rc::Rc;

use tracing::{info, warn};

use crate::bookkeeper::Bookkeeper;
use crate::config::Config;
use crate::connection::{Connection, ConnectionHeader, ConnectionKind};
use crate::delayed::DelayedStream;
use crate::error::ReplayError;
use crate::latch::Latch;
use crate::merger::Merger;
use crate::metrics::ReplayMetrics;
use crate::sender::Sender;

pub struct Replay {
    match_id: u64,
    merger: Rc<Merger>,
    sender: Rc<Sender>,
    bookkeeper: Rc<dyn Bookkeeper>,
    metrics: Rc<dyn ReplayMetrics>,
    ended: Latch,
}

impl Replay {
    /// Builds a running replay and spawns its background tasks (the canonical
    /// shutdown watcher, the bookkeeping handoff, and the per-match timeout).
    /// Must be called from within a `tokio::task::LocalSet`.
    pub fn new(
        match_id: u64,
        config: Config,
        bookkeeper: Rc<dyn Bookkeeper>,
        metrics: Rc<dyn ReplayMetrics>,
    ) -> Rc<Self> {
        let merger = Merger::new(config.grace_period, config.header_max_len, metrics.clone());
        let delayed = DelayedStream::new(merger.canonical(), config.default_delay, config.sample_tick);
        let sender = Sender::new(delayed, metrics.clone());

        let this = Rc::new(Self {
            match_id,
            merger,
            sender,
            bookkeeper,
            metrics,
            ended: Latch::new(),
        });

        this.metrics.running_replays_delta(1);

        // Bookkeeping fires as soon as the canonical stream is done, and
        // never waits on the sender: a slow or wedged reader must not block
        // persistence of a finished match.
        let bk = this.clone();
        tokio::task::spawn_local(async move {
            bk.merger.wait_ended().await;
            bk.metrics.replay_finished();
            let canonical = bk.merger.canonical();
            let mut full = canonical.header_bytes().unwrap_or_default();
            full.extend(canonical.slice(0, canonical.len()));
            match bk.bookkeeper.save_replay(bk.match_id, &full).await {
                Ok(()) => bk.metrics.replay_saved(),
                Err(e) => warn!(match_id = bk.match_id, error = %e, "bookkeeping failed"),
            }
        });

        // The replay itself ends only once the sender has drained to its own
        // ended state, independent of how long bookkeeping took.
        let sw = this.clone();
        tokio::task::spawn_local(async move {
            sw.sender.wait_ended().await;
            sw.ended.set();
            sw.metrics.running_replays_delta(-1);
            info!(match_id = sw.match_id, "replay ended");
        });

        let tw = this.clone();
        let match_timeout = config.match_timeout;
        tokio::task::spawn_local(async move {
            tokio::time::sleep(match_timeout).await;
            if !tw.is_ended() {
                warn!(match_id = tw.match_id, "match timeout reached, forcing shutdown");
                tw.close();
            }
        });

        this
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_set()
    }

    pub async fn wait_ended(&self) {
        self.ended.wait().await;
    }

    /// Dispatches a connection to the merger or sender by its pre-parsed
    /// kind. The handshake itself (deciding what kind a connection is) is a
    /// dispatcher concern upstream of this call.
    pub async fn handle_connection(
        self: &Rc<Self>,
        header: ConnectionHeader,
        conn: Box<dyn Connection>,
    ) -> Result<(), ReplayError> {
        match header.kind {
            ConnectionKind::Writer => self.merger.handle_writer(conn).await,
            ConnectionKind::Reader => self.sender.handle_reader(conn).await,
            ConnectionKind::Unknown(tag) => {
                self.metrics
                    .connection_served(crate::metrics::ConnResult::MalformedData);
                Err(ReplayError::MalformedData(format!(
                    "unknown connection type tag {tag}"
                )))
            }
        }
    }

    /// Forces an immediate shutdown: disables the grace period, closes every
    /// writer and reader connection. Used by the per-match timeout and by a
    /// collaborator that needs to force-close a match early.
    pub fn close(&self) {
        self.merger.close();
        self.sender.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookkeeper::NullBookkeeper;
    use crate::metrics::NoopMetrics;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct FeedConnection(VecDeque<Vec<u8>>);

    impl FeedConnection {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self(chunks.into())
        }
    }

    #[async_trait(?Send)]
    impl Connection for FeedConnection {
        async fn read(&mut self, _n: usize) -> Result<Vec<u8>, ReplayError> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
        async fn write(&mut self, _data: &[u8]) -> Result<(), ReplayError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    struct RecordingBookkeeper {
        saved: RefCell<Vec<(u64, Vec<u8>)>>,
    }

    impl RecordingBookkeeper {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                saved: RefCell::new(Vec::new()),
            })
        }
    }

    #[async_trait(?Send)]
    impl Bookkeeper for RecordingBookkeeper {
        async fn save_replay(&self, match_id: u64, canonical: &[u8]) -> Result<(), ReplayError> {
            self.saved.borrow_mut().push((match_id, canonical.to_vec()));
            Ok(())
        }
    }

    fn minimal_header() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"v1.0\0");
        b.extend_from_slice(&[0, 0, 0]);
        b.extend_from_slice(b"rv\r\nMap\0");
        b.extend_from_slice(&[0, 0, 0, 0]);
        b.extend_from_slice(&0u32.to_le_bytes());
        b.push(2);
        b.extend_from_slice(&0u32.to_le_bytes());
        b.push(0);
        b.push(0);
        b.push(0);
        b.extend_from_slice(&1u32.to_le_bytes());
        b
    }

    #[tokio::test(start_paused = true)]
    async fn writer_data_is_persisted_once_merger_ends() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let bookkeeper = RecordingBookkeeper::new();
                let mut config = Config::default();
                config.grace_period = Duration::from_secs(1);
                config.default_delay = Duration::from_secs(1);
                config.sample_tick = Duration::from_millis(100);

                let replay = Replay::new(7, config, bookkeeper.clone(), Rc::new(NoopMetrics));

                let mut bytes = minimal_header();
                bytes.extend_from_slice(b"GAMEDATA");
                let conn: Box<dyn Connection> = Box::new(FeedConnection::new(vec![bytes, vec![]]));
                let header = ConnectionHeader {
                    kind: ConnectionKind::Writer,
                    uid: 1,
                };
                replay.handle_connection(header, conn).await.unwrap();

                tokio::time::advance(Duration::from_secs(2)).await;
                tokio::task::yield_now().await;
                tokio::time::advance(Duration::from_secs(3)).await;
                tokio::task::yield_now().await;

                let saved = bookkeeper.saved.borrow();
                assert_eq!(saved.len(), 1);
                assert_eq!(saved[0].0, 7);
                assert!(saved[0].1.ends_with(b"GAMEDATA"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn match_timeout_force_closes_replay() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let mut config = Config::default();
                config.match_timeout = Duration::from_secs(5);
                config.grace_period = Duration::from_secs(30);
                let replay = Replay::new(
                    1,
                    config,
                    Rc::new(NullBookkeeper),
                    Rc::new(NoopMetrics),
                );
                tokio::time::advance(Duration::from_secs(6)).await;
                replay.wait_ended().await;
                assert!(replay.is_ended());
            })
            .await;
    }
}
