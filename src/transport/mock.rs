//! Scripted in-memory link for tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::transport::traits::Link;
use crate::{Error, Result};

/// Mock link for unit tests. Scripted replies are queued per outgoing frame:
/// each `write` makes the next reply readable; a reply scripted as an empty
/// vector leaves nothing to read, which the protocol layers observe as a
/// block-wait timeout. A drained read queue serves `0x00` ("card not ready"),
/// exactly what an idle SPI bus clocks back.
///
/// State sits behind a shared handle so tests can keep a clone and inspect
/// the traffic after the link has been moved into an engine.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

/// Recorded traffic and scripted behavior of a [`MockLink`].
#[derive(Debug, Default)]
pub struct MockState {
    /// Every frame written to the link, in order.
    pub sent: Vec<Vec<u8>>,
    /// Replies made readable one per write.
    pub replies: VecDeque<Vec<u8>>,
    /// Bytes currently readable.
    pub rx: VecDeque<u8>,
    /// Number of upcoming read calls that should fail with an i/o error.
    pub read_errors: usize,
    /// Number of upcoming write calls that should fail with an i/o error.
    pub write_errors: usize,
    /// Clock values passed to `set_clock_khz`.
    pub clocks: Vec<u32>,
}

impl MockLink {
    /// Fresh link with no scripted traffic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply to become readable after the next unanswered write.
    pub fn script_reply(&self, reply: Vec<u8>) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    /// Queue a write that gets no reply at all (a block-wait timeout).
    pub fn script_no_reply(&self) {
        self.script_reply(Vec::new());
    }

    /// Make bytes readable immediately, without waiting for a write.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state.lock().unwrap().rx.extend(bytes.iter().copied());
    }

    /// Fail the next `n` reads with an i/o error.
    pub fn fail_reads(&self, n: usize) {
        self.state.lock().unwrap().read_errors = n;
    }

    /// Fail the next `n` writes with an i/o error.
    pub fn fail_writes(&self, n: usize) {
        self.state.lock().unwrap().write_errors = n;
    }

    /// Snapshot of every frame written so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Clock frequencies the protocol layer asked for.
    pub fn clocks(&self) -> Vec<u32> {
        self.state.lock().unwrap().clocks.clone()
    }
}

impl Link for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.read_errors > 0 {
            state.read_errors -= 1;
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "mock read failure",
            )));
        }
        for slot in buf.iter_mut() {
            *slot = state.rx.pop_front().unwrap_or(0x00);
        }
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.write_errors > 0 {
            state.write_errors -= 1;
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "mock write failure",
            )));
        }
        state.sent.push(buf.to_vec());
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(buf.len())
    }

    fn set_clock_khz(&mut self, khz: u32) -> Result<()> {
        self.state.lock().unwrap().clocks.push(khz);
        Ok(())
    }
}
