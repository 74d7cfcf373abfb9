//! Error taxonomy for the replay engine.

use thiserror::Error;

/// Errors surfaced by the core back to the dispatcher or logged internally.
///
/// Propagation: these are caught at the `handle_connection` boundary in
/// `Sender`/`Merger`/`Replay`. The offending connection is closed and the
/// error is recorded in metrics; it is not re-raised past the `Replay`.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Parse failure, unexpected EOF during header, or unknown connection
    /// type. Fatal to the offending connection only.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// Attempt to attach a writer to an already-ended canonical stream, or a
    /// reader to an already-ended `Sender`.
    #[error("stream has already ended")]
    StreamEnded,

    /// The `Sender` is closed and will not accept further reader connections.
    #[error("cannot accept connection: sender is closed")]
    CannotAcceptConnection,

    /// Bookkeeping (persistence) failed. Logged; does not block `Replay`
    /// from reaching `ended`.
    #[error("bookkeeping failed: {0}")]
    Bookkeeping(String),

    /// The underlying connection's socket failed. Per-connection fatal.
    #[error("connection error: {0}")]
    Connection(String),
}
