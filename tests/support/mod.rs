//! Shared connection test doubles for the integration suite.

use async_trait::async_trait;
use replay_relay_core::{Connection, ReplayError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A connection fed from a fixed sequence of chunks. Each `read` pops the
/// next chunk regardless of the requested length, matching how the header
/// reader's chunked consumption is exercised elsewhere in this crate.
pub struct FeedConnection {
    chunks: VecDeque<Vec<u8>>,
    closed: Rc<RefCell<bool>>,
}

impl FeedConnection {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            closed: Rc::new(RefCell::new(false)),
        }
    }
}

#[async_trait(?Send)]
impl Connection for FeedConnection {
    async fn read(&mut self, _n: usize) -> Result<Vec<u8>, ReplayError> {
        if *self.closed.borrow() {
            return Ok(Vec::new());
        }
        Ok(self.chunks.pop_front().unwrap_or_default())
    }
    async fn write(&mut self, _data: &[u8]) -> Result<(), ReplayError> {
        Ok(())
    }
    fn close(&mut self) {
        *self.closed.borrow_mut() = true;
    }
}

/// A connection that never produces body data on its own — a writer that's
/// just sitting there connected, useful for grace-period tests.
pub struct IdleConnection {
    header: VecDeque<Vec<u8>>,
}

impl IdleConnection {
    pub fn new(header: Vec<u8>) -> Self {
        let mut chunks = VecDeque::new();
        chunks.push_back(header);
        Self { header: chunks }
    }
}

#[async_trait(?Send)]
impl Connection for IdleConnection {
    async fn read(&mut self, _n: usize) -> Result<Vec<u8>, ReplayError> {
        if let Some(chunk) = self.header.pop_front() {
            return Ok(chunk);
        }
        // Parked forever: the caller is expected to drop/close this
        // connection rather than wait on this read resolving.
        std::future::pending().await
    }
    async fn write(&mut self, _data: &[u8]) -> Result<(), ReplayError> {
        Ok(())
    }
    fn close(&mut self) {}
}

/// A connection that records every byte written to it.
pub struct RecordingConnection {
    pub written: RefCell<Vec<u8>>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            written: RefCell::new(Vec::new()),
        }
    }
}

#[async_trait(?Send)]
impl Connection for RecordingConnection {
    async fn read(&mut self, _n: usize) -> Result<Vec<u8>, ReplayError> {
        Ok(Vec::new())
    }
    async fn write(&mut self, data: &[u8]) -> Result<(), ReplayError> {
        self.written.borrow_mut().extend_from_slice(data);
        Ok(())
    }
    fn close(&mut self) {}
}

/// A connection that writes into a shared buffer, so the caller can keep
/// inspecting what's been received while the connection itself has been
/// moved into a spawned task.
pub struct SharedRecordingConnection(pub Rc<RefCell<Vec<u8>>>);

#[async_trait(?Send)]
impl Connection for SharedRecordingConnection {
    async fn read(&mut self, _n: usize) -> Result<Vec<u8>, ReplayError> {
        Ok(Vec::new())
    }
    async fn write(&mut self, data: &[u8]) -> Result<(), ReplayError> {
        self.0.borrow_mut().extend_from_slice(data);
        Ok(())
    }
    fn close(&mut self) {}
}

/// A minimal, valid replay header with no players, mods, or armies, so test
/// bodies can focus on merge/delay/lifetime behavior instead of parsing.
pub fn minimal_header_bytes() -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(b"v1.0\0");
    b.extend_from_slice(&[0, 0, 0]);
    b.extend_from_slice(b"replay-v2\r\nCoolMap\0");
    b.extend_from_slice(&[0, 0, 0, 0]);
    b.extend_from_slice(&0u32.to_le_bytes());
    b.push(2); // mods = Nil
    b.extend_from_slice(&0u32.to_le_bytes()); // scenario size
    b.push(0); // player_count
    b.push(0); // cheats_enabled
    b.push(0); // army_count
    b.extend_from_slice(&1u32.to_le_bytes()); // random_seed
    b
}
