//! Fans a delayed stream out to reader connections. Each reader
//! gets the header once, then the delayed body as it becomes stable; the
//! sender itself ends once every reader has gone and the delayed stream has
//! nothing left to deliver.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::delayed::DelayedStream;
use crate::error::ReplayError;
use crate::latch::Latch;
use crate::metrics::{ConnCategory, ConnResult, ConnectionTrack, ReplayMetrics};

pub struct Sender {
    delayed: DelayedStream,
    metrics: Rc<dyn ReplayMetrics>,
    closed: Cell<bool>,
    conn_count: Cell<u32>,
    /// Broadcast to every in-flight `handle_reader` call on `close()`. Each
    /// reader's write loop races this against its own connection, so closing
    /// never needs a second mutable borrow into a connection that's already
    /// parked in an in-flight write.
    close_signal: Latch,
    ended: Latch,
}

impl Sender {
    pub fn new(delayed: DelayedStream, metrics: Rc<dyn ReplayMetrics>) -> Rc<Self> {
        let this = Rc::new(Self {
            delayed,
            metrics,
            closed: Cell::new(false),
            conn_count: Cell::new(0),
            close_signal: Latch::new(),
            ended: Latch::new(),
        });
        let watcher = this.clone();
        tokio::task::spawn_local(async move {
            watcher.delayed.wait_ended().await;
            watcher.maybe_end();
        });
        this
    }

    fn maybe_end(&self) {
        if self.conn_count.get() == 0 && self.delayed.is_ended() {
            self.ended.set();
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_set()
    }

    pub async fn wait_ended(&self) {
        self.ended.wait().await;
    }

    /// Serves one reader connection: header, then the delayed body as it
    /// becomes stable, until the reader disconnects, errors, or the sender
    /// is closed out from under it.
    pub async fn handle_reader(self: &Rc<Self>, mut conn: Box<dyn Connection>) -> Result<(), ReplayError> {
        if self.closed.get() || self.delayed.is_ended() {
            self.metrics.connection_served(ConnResult::CannotAccept);
            return Err(ReplayError::CannotAcceptConnection);
        }

        let _track = ConnectionTrack::new(self.metrics.as_ref(), ConnCategory::Reader);
        self.conn_count.set(self.conn_count.get() + 1);

        let result = self.run_reader(&mut conn).await;

        self.conn_count.set(self.conn_count.get() - 1);
        self.maybe_end();

        match &result {
            Ok(()) => self.metrics.connection_served(ConnResult::Ok),
            Err(ReplayError::MalformedData(_)) => {
                self.metrics.connection_served(ConnResult::MalformedData)
            }
            Err(_) => self.metrics.connection_served(ConnResult::ConnectionError),
        }
        result
    }

    /// Races the reader's header-then-body loop against `close_signal`. On a
    /// forced close, the in-flight write is dropped (cancelling it) and the
    /// connection is closed here, where we're its sole owner again — no
    /// second mutable borrow into a connection that's mid-write is ever
    /// needed.
    async fn run_reader(&self, conn: &mut Box<dyn Connection>) -> Result<(), ReplayError> {
        tokio::select! {
            result = self.run_reader_inner(conn) => result,
            () = self.close_signal.wait() => {
                conn.close();
                Err(ReplayError::Connection("reader closed by sender shutdown".into()))
            }
        }
    }

    async fn run_reader_inner(&self, conn: &mut Box<dyn Connection>) -> Result<(), ReplayError> {
        let header = self.delayed.wait_for_header().await.ok_or_else(|| {
            ReplayError::MalformedData("replay ended without ever receiving a header".into())
        })?;
        conn.write(&header).await?;

        let mut position = 0usize;
        loop {
            let chunk = self.delayed.wait_for_data(position).await;
            if chunk.is_empty() {
                debug!("delayed stream exhausted, closing reader");
                return Ok(());
            }
            conn.write(&chunk).await?;
            position += chunk.len();
        }
    }

    /// Stops accepting new readers and signals every attached one to close
    /// its connection and stop. Does not wait for `ended`.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        warn!("sender closing");
        self.close_signal.set();
    }
}
