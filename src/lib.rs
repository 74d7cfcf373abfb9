//! Per-match engine for a live replay relay: merges concurrent writer
//! connections into one canonical byte stream, parses its binary header, and
//! fans a time-delayed view of that stream out to readers.
//!
//! Sockets, connection acceptance, and replay persistence are external
//! collaborators reached through the [`Connection`], [`Bookkeeper`] and
//! [`ReplayMetrics`] traits; this crate owns only the per-match state machine
//! (sockets, acceptance and persistence stay outside this crate).

mod bookkeeper;
mod config;
mod connection;
mod delayed;
mod error;
mod header;
mod latch;
mod lifetime;
mod merger;
mod metrics;
mod replay;
mod sender;
mod stream;

pub use bookkeeper::{Bookkeeper, NullBookkeeper};
pub use config::Config;
pub use connection::{Connection, ConnectionHeader, ConnectionKind};
pub use error::ReplayError;
pub use header::{LuaScalar, LuaValue, ReplayHeader};
pub use metrics::{ConnCategory, ConnResult, ConnectionTrack, NoopMetrics, ReplayMetrics};
pub use replay::Replay;
