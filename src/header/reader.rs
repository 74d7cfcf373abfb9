//! Pull-style buffered reader over a [`Connection`], used by the header
//! parser. `read_exactly`/`read_until` simply `.await` until enough bytes
//! have arrived, resuming exactly where they left off — Rust's `async fn`
//! is already the resumable state machine this needs, so there's no
//! separate `Need(n) | Done | Error` step function to hand-maintain.
//!
//! Bounded by `maxlen`: once the position a read would require exceeds the
//! cap, parsing fails rather than buffering further.

use crate::connection::Connection;
use crate::error::ReplayError;

const CHUNK_SIZE: usize = 4096;

pub struct GeneratorData<'a> {
    conn: &'a mut dyn Connection,
    data: Vec<u8>,
    pub position: usize,
    maxlen: usize,
}

impl<'a> GeneratorData<'a> {
    pub fn new(conn: &'a mut dyn Connection, maxlen: usize) -> Self {
        Self {
            conn,
            data: Vec::new(),
            position: 0,
            maxlen,
        }
    }

    /// Bytes consumed so far (the header's final length once parsing is done).
    pub fn consumed(&self) -> &[u8] {
        &self.data[..self.position]
    }

    /// Any bytes read past the header boundary, to be pushed into the
    /// canonical stream by the merger.
    pub fn leftover(&self) -> &[u8] {
        &self.data[self.position..]
    }

    async fn fill_to(&mut self, needed: usize) -> Result<(), ReplayError> {
        while self.data.len() < needed {
            if self.data.len() >= self.maxlen {
                return Err(ReplayError::MalformedData(
                    "replay header exceeded maximum length".into(),
                ));
            }
            let chunk = self.conn.read(CHUNK_SIZE).await?;
            if chunk.is_empty() {
                return Err(ReplayError::MalformedData(
                    "replay header ended prematurely".into(),
                ));
            }
            self.data.extend_from_slice(&chunk);
        }
        Ok(())
    }

    pub async fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>, ReplayError> {
        if self.position.saturating_add(n) > self.maxlen {
            return Err(ReplayError::MalformedData(
                "replay header exceeded maximum length".into(),
            ));
        }
        self.fill_to(self.position + n).await?;
        let out = self.data[self.position..self.position + n].to_vec();
        self.position += n;
        Ok(out)
    }

    /// Reads bytes up to and including the first occurrence of `delim`.
    pub async fn read_until(&mut self, delim: u8) -> Result<Vec<u8>, ReplayError> {
        loop {
            if let Some(idx) = self.data[self.position..].iter().position(|&b| b == delim) {
                let end = self.position + idx + 1;
                let out = self.data[self.position..end].to_vec();
                self.position = end;
                return Ok(out);
            }
            if self.data.len() >= self.maxlen {
                return Err(ReplayError::MalformedData(
                    "replay header exceeded maximum length".into(),
                ));
            }
            let chunk = self.conn.read(CHUNK_SIZE).await?;
            if chunk.is_empty() {
                return Err(ReplayError::MalformedData(
                    "replay header ended prematurely".into(),
                ));
            }
            self.data.extend_from_slice(&chunk);
        }
    }
}
