//! The inbound connection contract. The TCP listener, connection
//! acceptor, and handshake parsing are external collaborators; they hand the
//! core a pre-parsed [`ConnectionHeader`] plus a [`Connection`] the core can
//! read from, write to, and close.
//!
//! Modeled as a trait object rather than a concrete socket type so the core
//! stays decoupled from how bytes actually arrive.

use async_trait::async_trait;

use crate::error::ReplayError;

/// Which side of the relay a connection belongs to. `Unknown` carries
/// whatever the dispatcher read from the handshake's type byte when it
/// didn't match `WRITER` or `READER`, so `Replay::handle_connection` can
/// reject it with `MalformedData` without touching the merger or sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Writer,
    Reader,
    Unknown(u8),
}

/// Pre-parsed connection metadata, produced by the dispatcher's handshake
/// step before the connection is ever handed to a `Replay`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionHeader {
    pub kind: ConnectionKind,
    pub uid: u64,
}

/// An inbound byte stream, owned by the dispatcher but loaned to the core for
/// the duration of one `handle_connection` call.
#[async_trait(?Send)]
pub trait Connection {
    /// Reads up to `n` bytes. Returns an empty vec on EOF.
    async fn read(&mut self, n: usize) -> Result<Vec<u8>, ReplayError>;

    /// Writes `data` in full.
    async fn write(&mut self, data: &[u8]) -> Result<(), ReplayError>;

    /// Closes the connection. Does not synchronously abort an in-flight
    /// `read`/`write` on this same connection — callers observe the effect
    /// at their next suspension point.
    fn close(&mut self);
}
