//! Receive buffer with consume-from-front semantics.
//!
//! Bytes accumulate at the tail; the parser consumes complete envelopes from
//! the head. Consumed space is reclaimed lazily by [`EslBuffer::compact`] so
//! steady-state parsing does not shift memory on every message.

use crate::constants::{BUF_CHUNK, MAX_BUFFER_SIZE};
use crate::error::{EslError, EslResult};

pub(crate) struct EslBuffer {
    data: Vec<u8>,
    start: usize,
}

impl EslBuffer {
    pub(crate) fn new() -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK),
            start: 0,
        }
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Unconsumed bytes currently buffered.
    pub(crate) fn len(&self) -> usize {
        self.data.len() - self.start
    }

    fn unread(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// Total-size guard. Exceeding it means the peer is sending garbage or
    /// the parser lost framing; the connection must be torn down.
    pub(crate) fn check_size_limits(&self) -> EslResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol_error(format!(
                "receive buffer exceeded {} bytes",
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Consume and return the bytes before the first occurrence of
    /// `pattern`, discarding the pattern itself. `None` if the pattern is
    /// not present yet.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let unread = self.unread();
        let pos = unread
            .windows(pattern.len())
            .position(|window| window == pattern)?;
        let out = unread[..pos].to_vec();
        self.start += pos + pattern.len();
        Some(out)
    }

    /// Consume and return exactly `count` bytes, or `None` if fewer are
    /// buffered.
    pub(crate) fn extract_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.len() < count {
            return None;
        }
        let out = self.unread()[..count].to_vec();
        self.start += count;
        Some(out)
    }

    /// Reclaim consumed head space once it grows past one allocation chunk.
    pub(crate) fn compact(&mut self) {
        if self.start >= BUF_CHUNK {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }
}
