//! Merges concurrent writer connections into one canonical stream (spec
//! §4.3). Accepts any number of writers for the same match; the first one to
//! finish its handshake installs the header, and data from every writer is
//! reconciled against the canonical stream by longest-prefix match.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::ReplayError;
use crate::header::parse_header;
use crate::latch::Latch;
use crate::lifetime::StreamLifetime;
use crate::metrics::{ConnCategory, ConnResult, ConnectionTrack, ReplayMetrics};
use crate::stream::{ReplayStream, WriterView};

const READ_CHUNK: usize = 4096;

pub struct Merger {
    canonical: ReplayStream,
    lifetime: StreamLifetime,
    header_max_len: usize,
    metrics: Rc<dyn ReplayMetrics>,
    closed: Cell<bool>,
    /// Broadcast to every in-flight `handle_writer` call on `close()`. Each
    /// writer's read loop races this against its own connection, so closing
    /// never needs a second mutable borrow into a connection that's already
    /// parked in an in-flight read.
    close_signal: Latch,
}

impl Merger {
    pub fn new(grace_period: Duration, header_max_len: usize, metrics: Rc<dyn ReplayMetrics>) -> Rc<Self> {
        let canonical = ReplayStream::new();
        let lifetime = StreamLifetime::new(grace_period);
        let this = Rc::new(Self {
            canonical,
            lifetime,
            header_max_len,
            metrics,
            closed: Cell::new(false),
            close_signal: Latch::new(),
        });
        let watcher = this.clone();
        tokio::task::spawn_local(async move {
            watcher.lifetime.wait_ended().await;
            watcher.canonical.set_ended();
        });
        this
    }

    pub fn canonical(&self) -> ReplayStream {
        self.canonical.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.canonical.is_ended()
    }

    pub async fn wait_ended(&self) {
        self.canonical.wait_ended().await;
    }

    /// Reconciles one writer connection's read loop against the canonical
    /// stream. Runs until the connection closes, errors, or the merger is
    /// closed out from under it.
    pub async fn handle_writer(self: &Rc<Self>, mut conn: Box<dyn Connection>) -> Result<(), ReplayError> {
        if self.closed.get() || self.canonical.is_ended() {
            self.metrics.connection_served(ConnResult::StreamEnded);
            return Err(ReplayError::StreamEnded);
        }

        let _track = ConnectionTrack::new(self.metrics.as_ref(), ConnCategory::Writer);
        self.lifetime.stream_added();

        let result = self.run_writer(&mut conn).await;

        self.lifetime.stream_removed();

        match &result {
            Ok(()) => self.metrics.connection_served(ConnResult::Ok),
            Err(ReplayError::MalformedData(_)) => {
                self.metrics.connection_served(ConnResult::MalformedData)
            }
            Err(_) => self.metrics.connection_served(ConnResult::ConnectionError),
        }
        result
    }

    /// Races the writer's parse-then-read loop against `close_signal`. On a
    /// forced close, the in-flight read is dropped (cancelling it) and the
    /// connection is closed here, where we're its sole owner again — no
    /// second mutable borrow into a connection that's mid-read is ever
    /// needed.
    async fn run_writer(&self, conn: &mut Box<dyn Connection>) -> Result<(), ReplayError> {
        tokio::select! {
            result = self.run_writer_inner(conn) => result,
            () = self.close_signal.wait() => {
                conn.close();
                Err(ReplayError::Connection("writer closed by merger shutdown".into()))
            }
        }
    }

    async fn run_writer_inner(&self, conn: &mut Box<dyn Connection>) -> Result<(), ReplayError> {
        let mut view = WriterView::new();

        let conn_ref: &mut dyn Connection = &mut **conn;
        let (header, leftover) = parse_header(conn_ref, self.header_max_len).await?;
        self.canonical.set_header_if_absent(header);
        view.append(&leftover);
        self.reconcile(&view);

        loop {
            let chunk = conn.read(READ_CHUNK).await?;
            if chunk.is_empty() {
                debug!("writer connection reached eof");
                return Ok(());
            }
            view.append(&chunk);
            self.reconcile(&view);
        }
    }

    /// Advances the canonical stream if this writer is ahead of it — the
    /// longest-prefix reconciliation policy.
    fn reconcile(&self, view: &WriterView) {
        let canonical_len = self.canonical.len();
        if view.position > canonical_len {
            let tail = view.slice_from(canonical_len);
            self.canonical.extend(tail);
        }
    }

    /// Stops accepting new writers, forces the grace period to elapse, and
    /// signals every attached writer's read loop to close its connection and
    /// stop. Does not itself wait for `ended` — callers that need that
    /// should await `wait_ended()`.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        warn!("merger closing, disabling grace period");
        self.lifetime.disable_grace_period();
        self.close_signal.set();
    }
}
